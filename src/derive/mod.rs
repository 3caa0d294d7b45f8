//! The derivation engine: materializes every type that follows mechanically
//! from the user's declarations. Runs once, after the user phase completes.

use crate::error::{SchemaError, SchemaErrors, SchemaWarning};
use crate::schema::builder::SchemaDefinition;
use crate::schema::definitions::{FieldDef, TypeDef};
use crate::schema::registry::SchemaRegistry;

mod aggregations;
mod customizations;
mod filters;
mod query_root;
mod relationships;
mod relay;
mod sort_orders;
pub(crate) mod sourced_from;
pub(crate) mod sub_aggregations;
mod validation;

pub fn run(
    api: &mut SchemaDefinition,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<(), SchemaErrors> {
    let SchemaDefinition {
        ref mut registry,
        ref names,
        ref namer,
        ref config,
        ..
    } = *api;

    validation::validate(registry, names, warnings)?;
    relationships::close(registry, warnings)?;
    sourced_from::close(registry)?;
    sort_orders::derive(registry, namer)?;
    filters::derive(registry, names, namer)?;
    sub_aggregations::derive(registry, names, namer)?;
    aggregations::derive(registry, names, namer)?;
    relay::derive(registry, names, namer)?;
    query_root::derive(registry, names, namer)?;
    customizations::apply(registry, config)?;

    warnings.extend(namer.unused_override_warnings());
    Ok(())
}

/// The datastore mapping type a field is stored under, considering the
/// field-level override, the type's own mapping, and the type kind.
pub(crate) fn mapping_type(registry: &SchemaRegistry, field: &FieldDef) -> String {
    if let Some(mapping) = &field.mapping {
        return mapping.mapping_type.clone();
    }
    type_mapping_type(registry, field.ty.fully_unwrapped())
}

pub(crate) fn type_mapping_type(registry: &SchemaRegistry, type_name: &str) -> String {
    match registry.type_named(type_name) {
        Some(TypeDef::Scalar(scalar)) => scalar.mapping.mapping_type.clone(),
        Some(TypeDef::Enum(_)) => "keyword".to_owned(),
        Some(TypeDef::Object(object)) => object
            .mapping
            .as_ref()
            .map(|m| m.mapping_type.clone())
            .unwrap_or_else(|| "object".to_owned()),
        _ => "object".to_owned(),
    }
}

/// True when values of the type are stored under a single indivisible index
/// field: scalars, enums, and leaf-mapped objects like geo points.
pub(crate) fn is_leaf_type(registry: &SchemaRegistry, type_name: &str) -> bool {
    match registry.type_named(type_name) {
        Some(TypeDef::Scalar(_)) | Some(TypeDef::Enum(_)) => true,
        Some(TypeDef::Object(object)) => object.mapping.is_some(),
        _ => false,
    }
}

const RANGE_MAPPING_TYPES: &[&str] = &[
    "byte", "date", "double", "float", "half_float", "integer", "long", "scaled_float", "short",
];

pub(crate) fn supports_range_filtering(mapping_type: &str) -> bool {
    RANGE_MAPPING_TYPES.contains(&mapping_type)
}

/// Whether the field shows up in GraphQL at all.
pub(crate) fn graphql_visible(field: &FieldDef) -> bool {
    !field.indexing_only
}

pub(crate) fn is_filterable(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    field.filterable.unwrap_or_else(|| {
        field.indexed() && graphql_visible(field) && field.args.is_empty()
    })
    // Cursor values are opaque; nothing meaningful can be filtered on them.
        && field.ty.fully_unwrapped() != "Cursor"
        && registry.contains_type(field.ty.fully_unwrapped())
}

pub(crate) fn is_groupable(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    field.groupable.unwrap_or_else(|| {
        field.indexed()
            && graphql_visible(field)
            && !field.ty.is_list()
            && mapping_type(registry, field) != "text"
            && (is_leaf_type(registry, field.ty.fully_unwrapped())
                || is_plain_object(registry, field))
    })
}

pub(crate) fn is_aggregatable(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    field.aggregatable.unwrap_or_else(|| {
        field.indexed()
            && graphql_visible(field)
            && mapping_type(registry, field) != "text"
            && (is_leaf_type(registry, field.ty.fully_unwrapped())
                || is_plain_object(registry, field))
    })
}

pub(crate) fn is_sortable(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    field.sortable.unwrap_or_else(|| {
        field.indexed()
            && graphql_visible(field)
            && !field.ty.is_list()
            && is_leaf_type(registry, field.ty.fully_unwrapped())
            && mapping_type(registry, field) != "text"
            // Leaf-mapped objects (geo points) have no natural sort order.
            && !matches!(registry.type_named(field.ty.fully_unwrapped()), Some(TypeDef::Object(_)))
    })
}

/// A non-list embedded object field without a leaf or `nested` mapping:
/// its subfields flatten into the parent document.
fn is_plain_object(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    !field.ty.is_list()
        && !is_leaf_type(registry, field.ty.fully_unwrapped())
        && matches!(
            registry.type_named(field.ty.fully_unwrapped()),
            Some(TypeDef::Object(_))
        )
        && mapping_type(registry, field) == "object"
}

pub(crate) fn batch(errors: Vec<SchemaError>) -> Result<(), SchemaErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaErrors::new(errors))
    }
}
