use crate::derive::{is_aggregatable, is_groupable, is_leaf_type};
use crate::error::SchemaErrors;
use crate::schema::definitions::{FieldDef, ObjectTypeDef, TypeDef};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use crate::schema::type_ref::TypeRef;
use indexmap::IndexMap;

/// Derives the aggregation family: per-scalar aggregated-values types,
/// `TGroupedBy` / `TAggregatedValues` for every composite type that needs
/// them, and `TAggregation` for every indexed type.
pub(crate) fn derive(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) -> Result<(), SchemaErrors> {
    let mut generated = Vec::new();

    generated.extend(scalar_aggregated_values_types(names, namer));

    let composite: Vec<String> = registry
        .types()
        .values()
        .filter_map(|type_def| match type_def {
            TypeDef::Object(object)
                if object.derived_from.is_none()
                    && !object.graphql_only
                    && object.mapping.is_none() =>
            {
                Some(object.name.clone())
            }
            TypeDef::Interface(interface) => Some(interface.name.clone()),
            _ => None,
        })
        .collect();

    for type_name in &composite {
        let fields = owned_fields(registry, type_name);
        if has_groupable(registry, type_name) {
            generated.push(grouped_by_type(registry, namer, type_name, &fields));
        }
        if has_aggregatable(registry, type_name) {
            generated.push(aggregated_values_type(registry, namer, type_name, &fields));
        }
    }

    // Unions of indexed types aggregate over the fields their members share.
    let unions: Vec<(String, IndexMap<String, FieldDef>)> = registry
        .types()
        .values()
        .filter_map(|type_def| type_def.as_union())
        .filter(|u| {
            !u.members.is_empty() && u.members.iter().all(|m| registry.is_indexed(m))
        })
        .map(|u| (u.name.clone(), shared_member_fields(registry, u)))
        .collect();
    for (union_name, fields) in &unions {
        if fields.values().any(|f| is_groupable(registry, f)) {
            generated.push(grouped_by_type(registry, namer, union_name, fields));
        }
        if fields.values().any(|f| is_aggregatable(registry, f)) {
            generated.push(aggregated_values_type(registry, namer, union_name, fields));
        }
    }

    // Register grouped-by/aggregated-values first so that the aggregation
    // types below can check their presence by name.
    for type_def in generated.drain(..) {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }

    let mut aggregations = Vec::new();
    let indexed: Vec<String> = composite
        .iter()
        .filter(|name| registry.is_indexed(name))
        .cloned()
        .collect();
    for type_name in indexed.iter().chain(unions.iter().map(|(name, _)| name)) {
        aggregations.push(aggregation_type(registry, names, namer, type_name));
    }
    for type_def in aggregations {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }
    Ok(())
}

fn owned_fields(registry: &SchemaRegistry, type_name: &str) -> IndexMap<String, FieldDef> {
    registry
        .type_named(type_name)
        .and_then(TypeDef::fields)
        .cloned()
        .unwrap_or_default()
}

fn shared_member_fields(
    registry: &SchemaRegistry,
    union_def: &crate::schema::definitions::UnionTypeDef,
) -> IndexMap<String, FieldDef> {
    let mut members = union_def.members.iter();
    let Some(first) = members.next() else {
        return IndexMap::new();
    };
    let mut shared = owned_fields(registry, first);
    for member in members {
        let member_fields = owned_fields(registry, member);
        shared.retain(|name, field| {
            member_fields
                .get(name)
                .is_some_and(|other| other.ty == field.ty)
        });
    }
    shared
}

pub(crate) fn has_groupable(registry: &SchemaRegistry, type_name: &str) -> bool {
    registry
        .type_named(type_name)
        .and_then(TypeDef::fields)
        .is_some_and(|fields| {
            fields.values().any(|field| {
                is_groupable(registry, field)
                    && (is_leaf_type(registry, field.ty.fully_unwrapped())
                        || has_groupable(registry, field.ty.fully_unwrapped()))
            })
        })
}

pub(crate) fn has_aggregatable(registry: &SchemaRegistry, type_name: &str) -> bool {
    registry
        .type_named(type_name)
        .and_then(TypeDef::fields)
        .is_some_and(|fields| {
            fields.values().any(|field| {
                is_aggregatable(registry, field)
                    && (is_leaf_type(registry, field.ty.fully_unwrapped())
                        || has_aggregatable(registry, field.ty.fully_unwrapped()))
            })
        })
}

fn grouped_by_type(
    registry: &SchemaRegistry,
    namer: &Namer,
    base: &str,
    fields: &IndexMap<String, FieldDef>,
) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::GroupedBy, base);
    let mut type_def = ObjectTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Type used to specify the `{base}` fields to group by for aggregations."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::GroupedBy, base.to_owned())),
        ..Default::default()
    };

    for field in fields.values() {
        if !is_groupable(registry, field) {
            continue;
        }
        let unwrapped = field.ty.fully_unwrapped();
        let grouped_type = match unwrapped {
            "Date" => Some("DateGroupedBy".to_owned()),
            "DateTime" => Some("DateTimeGroupedBy".to_owned()),
            _ if is_leaf_type(registry, unwrapped) => Some(unwrapped.to_owned()),
            _ if has_groupable(registry, unwrapped) => {
                Some(namer.derived(DerivedTypeKind::GroupedBy, unwrapped))
            }
            _ => None,
        };
        let Some(grouped_type) = grouped_type else {
            continue;
        };
        let mut grouped_field = FieldDef::new(field.name.clone(), TypeRef::named(grouped_type));
        grouped_field.graphql_only = true;
        grouped_field.name_in_index = field.name_in_index.clone();
        grouped_field.documentation = Some(match unwrapped {
            "Date" | "DateTime" => format!(
                "Offers the different grouping options for the `{}` value within this group.",
                field.name
            ),
            _ => format!("The `{}` field value for this group.", field.name),
        });
        grouped_field.tags = field.tags.clone();
        type_def.fields.insert(grouped_field.name.clone(), grouped_field);
    }
    TypeDef::Object(type_def)
}

fn aggregated_values_type(
    registry: &SchemaRegistry,
    namer: &Namer,
    base: &str,
    fields: &IndexMap<String, FieldDef>,
) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::AggregatedValues, base);
    let mut type_def = ObjectTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Type used to perform aggregation computations on `{base}` fields."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::AggregatedValues, base.to_owned())),
        ..Default::default()
    };
    for field in fields.values() {
        let Some(values_type) = aggregated_values_type_for_field(registry, namer, field) else {
            continue;
        };
        let mut values_field = FieldDef::new(field.name.clone(), TypeRef::named(values_type));
        values_field.graphql_only = true;
        values_field.name_in_index = field.name_in_index.clone();
        values_field.documentation = Some(format!(
            "Computed aggregate values for the `{}` field.",
            field.name
        ));
        values_field.tags = field.tags.clone();
        type_def.fields.insert(values_field.name.clone(), values_field);
    }
    TypeDef::Object(type_def)
}

/// The aggregated-values selector type for a field, or `None` when the field
/// offers no aggregations.
pub(crate) fn aggregated_values_type_for_field(
    registry: &SchemaRegistry,
    namer: &Namer,
    field: &FieldDef,
) -> Option<String> {
    if !is_aggregatable(registry, field) {
        return None;
    }
    let unwrapped = field.ty.fully_unwrapped();
    match registry.type_named(unwrapped)? {
        TypeDef::Scalar(scalar) => Some(match (scalar.name.as_str(), scalar.mapping.mapping_type.as_str()) {
            ("Int" | "JsonSafeLong" | "LongString" | "Float", _) => {
                namer.derived(DerivedTypeKind::AggregatedValues, unwrapped)
            }
            ("Date" | "DateTime" | "LocalTime", _) => {
                namer.derived(DerivedTypeKind::AggregatedValues, unwrapped)
            }
            _ => namer.derived(DerivedTypeKind::AggregatedValues, "NonNumeric"),
        }),
        TypeDef::Enum(_) => Some(namer.derived(DerivedTypeKind::AggregatedValues, "NonNumeric")),
        TypeDef::Object(object) if object.mapping.is_some() => {
            Some(namer.derived(DerivedTypeKind::AggregatedValues, "NonNumeric"))
        }
        TypeDef::Object(_) if has_aggregatable(registry, unwrapped) => {
            Some(namer.derived(DerivedTypeKind::AggregatedValues, unwrapped))
        }
        _ => None,
    }
}

fn aggregation_type(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    base: &str,
) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::Aggregation, base);
    let mut type_def = ObjectTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Return type representing a bucket of `{base}` documents for an aggregations \
             query."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::Aggregation, base.to_owned())),
        ..Default::default()
    };

    let grouped_by_name = namer.derived(DerivedTypeKind::GroupedBy, base);
    if registry.contains_type(&grouped_by_name) {
        let mut field = FieldDef::new(names.of("grouped_by"), TypeRef::named(grouped_by_name));
        field.graphql_only = true;
        field.documentation = Some(format!(
            "Used to specify the `{base}` fields to group by. The returned values \
             identify each aggregation bucket."
        ));
        type_def.fields.insert(field.name.clone(), field);
    }

    let mut count = FieldDef::new(
        names.of("count"),
        TypeRef::parse("JsonSafeLong!").expect("well-formed"),
    );
    count.graphql_only = true;
    count.documentation = Some(format!(
        "The count of `{base}` documents in an aggregation bucket."
    ));
    type_def.fields.insert(count.name.clone(), count);

    let aggregated_values_name = namer.derived(DerivedTypeKind::AggregatedValues, base);
    if registry.contains_type(&aggregated_values_name) {
        let mut field = FieldDef::new(
            names.of("aggregated_values"),
            TypeRef::named(aggregated_values_name),
        );
        field.graphql_only = true;
        field.documentation = Some(format!(
            "Provides computed aggregated values over all `{base}` documents in an \
             aggregation bucket."
        ));
        type_def.fields.insert(field.name.clone(), field);
    }

    let sub_aggregations_name = namer.derived(DerivedTypeKind::AggregationSubAggregations, base);
    if registry.contains_type(&sub_aggregations_name) {
        let mut field = FieldDef::new(
            names.of("sub_aggregations"),
            TypeRef::named(sub_aggregations_name),
        );
        field.graphql_only = true;
        field.documentation = Some(format!(
            "Used to perform sub-aggregations of `{name}` data."
        ));
        type_def.fields.insert(field.name.clone(), field);
    }

    TypeDef::Object(type_def)
}

fn scalar_aggregated_values_types(names: &SchemaElementNames, namer: &Namer) -> Vec<TypeDef> {
    let mut result = Vec::new();

    for (base, exact_sum_type) in [
        ("Int", "JsonSafeLong!"),
        ("JsonSafeLong", "JsonSafeLong"),
        ("LongString", "JsonSafeLong"),
        ("Float", "Float!"),
    ] {
        let mut type_def = aggregated_values_shell(namer, base);
        let exact_sum_doc = if exact_sum_type.ends_with('!') {
            format!(
                "The exact sum of the field values within this grouping, if it can be \
                 represented as a `{}`.",
                exact_sum_type.trim_end_matches('!')
            )
        } else {
            "The exact sum of the field values within this grouping, or `null` when the \
             sum is outside the `JsonSafeLong` range and cannot be represented exactly."
                .to_owned()
        };
        for (canonical, ty, doc) in [
            (
                "approximate_sum",
                "Float!",
                "The (approximate) sum of the field values within this grouping. The sum \
                 of a large number of values is computed with floating point arithmetic \
                 and can lose precision."
                    .to_owned(),
            ),
            ("exact_sum", exact_sum_type, exact_sum_doc),
            (
                "exact_min",
                base,
                "The minimum of the field values within this grouping, or `null` when the \
                 grouping contains no documents with a value for the field."
                    .to_owned(),
            ),
            (
                "exact_max",
                base,
                "The maximum of the field values within this grouping, or `null` when the \
                 grouping contains no documents with a value for the field."
                    .to_owned(),
            ),
            (
                "approximate_avg",
                "Float",
                "The average (mean) of the field values within this grouping. The \
                 computation is approximate for the same reasons `approximate_sum` is."
                    .to_owned(),
            ),
            (
                "approximate_distinct_value_count",
                "JsonSafeLong!",
                APPROXIMATE_DISTINCT_DOC.to_owned(),
            ),
        ] {
            add_aggregated_field(&mut type_def, names, canonical, ty, doc);
        }
        result.push(TypeDef::Object(type_def));
    }

    for base in ["Date", "DateTime", "LocalTime"] {
        let mut type_def = aggregated_values_shell(namer, base);
        for (canonical, ty, doc) in [
            (
                "exact_min",
                base,
                "The earliest value of the field within this grouping, or `null` when the \
                 grouping contains no documents with a value for the field."
                    .to_owned(),
            ),
            (
                "exact_max",
                base,
                "The latest value of the field within this grouping, or `null` when the \
                 grouping contains no documents with a value for the field."
                    .to_owned(),
            ),
            (
                "approximate_distinct_value_count",
                "JsonSafeLong!",
                APPROXIMATE_DISTINCT_DOC.to_owned(),
            ),
        ] {
            add_aggregated_field(&mut type_def, names, canonical, ty, doc);
        }
        result.push(TypeDef::Object(type_def));
    }

    let mut non_numeric = aggregated_values_shell(namer, "NonNumeric");
    non_numeric.documentation = Some(
        "Type used to perform aggregation computations on fields whose values do not \
         support arithmetic."
            .to_owned(),
    );
    add_aggregated_field(
        &mut non_numeric,
        names,
        "approximate_distinct_value_count",
        "JsonSafeLong!",
        APPROXIMATE_DISTINCT_DOC.to_owned(),
    );
    result.push(TypeDef::Object(non_numeric));

    result
}

const APPROXIMATE_DISTINCT_DOC: &str =
    "An approximation of the number of unique values for this field within this \
     grouping. The approximation is usually accurate to within a few percent; exact \
     counts over high-cardinality fields are too costly to compute.";

fn aggregated_values_shell(namer: &Namer, base: &str) -> ObjectTypeDef {
    let name = namer.derived(DerivedTypeKind::AggregatedValues, base);
    ObjectTypeDef {
        name,
        documentation: Some(format!(
            "Type used to perform aggregation computations on `{base}` fields."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::AggregatedValues, base.to_owned())),
        ..Default::default()
    }
}

fn add_aggregated_field(
    type_def: &mut ObjectTypeDef,
    names: &SchemaElementNames,
    canonical: &str,
    ty: &str,
    doc: String,
) {
    let mut field = FieldDef::new(
        names.of(canonical),
        TypeRef::parse(ty).expect("generated aggregated value types are well-formed"),
    );
    field.graphql_only = true;
    field.documentation = Some(doc);
    type_def.fields.insert(field.name.clone(), field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::built_ins;

    fn derived_registry(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), crate::error::SchemaError>,
    ) -> SchemaRegistry {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config.clone()).unwrap();
        f(&mut api).unwrap();
        let names = SchemaElementNames::new(&config.schema_element_names).unwrap();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        derive(&mut api.registry, &names, &namer).unwrap();
        api.registry
    }

    fn widget_schema(api: &mut SchemaDefinition) -> Result<(), crate::error::SchemaError> {
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("cost", "Int")?;
            t.field("created_at", "DateTime!")?;
            t.field("description", "String")?.mapping("text", &[]);
            t.index("widgets")?;
            Ok(())
        })
    }

    #[test]
    fn aggregation_type_has_count_grouped_by_and_aggregated_values() {
        let registry = derived_registry(widget_schema);
        let aggregation = registry
            .type_named("WidgetAggregation")
            .unwrap()
            .as_object()
            .unwrap();
        let fields: Vec<&str> = aggregation.fields.keys().map(String::as_str).collect();
        assert_eq!(fields, ["grouped_by", "count", "aggregated_values"]);
        assert_eq!(
            aggregation.fields["count"].ty.to_string(),
            "JsonSafeLong!"
        );
    }

    #[test]
    fn grouped_by_excludes_text_and_id_is_groupable() {
        let registry = derived_registry(widget_schema);
        let grouped_by = registry
            .type_named("WidgetGroupedBy")
            .unwrap()
            .as_object()
            .unwrap();
        assert!(grouped_by.fields.contains_key("id"));
        assert!(grouped_by.fields.contains_key("cost"));
        assert!(!grouped_by.fields.contains_key("description"));
        assert_eq!(
            grouped_by.fields["created_at"].ty.to_string(),
            "DateTimeGroupedBy"
        );
    }

    #[test]
    fn aggregated_values_map_scalars_to_their_selector_types() {
        let registry = derived_registry(widget_schema);
        let aggregated = registry
            .type_named("WidgetAggregatedValues")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(
            aggregated.fields["cost"].ty.to_string(),
            "IntAggregatedValues"
        );
        assert_eq!(
            aggregated.fields["id"].ty.to_string(),
            "NonNumericAggregatedValues"
        );
        assert_eq!(
            aggregated.fields["created_at"].ty.to_string(),
            "DateTimeAggregatedValues"
        );

        let int_values = registry
            .type_named("IntAggregatedValues")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(
            int_values.fields["exact_sum"].ty.to_string(),
            "JsonSafeLong!"
        );
        assert_eq!(int_values.fields["exact_min"].ty.to_string(), "Int");
    }

    #[test]
    fn empty_types_generate_no_grouped_by() {
        let registry = derived_registry(|api| {
            api.object_type("Note", |t| {
                t.field("body", "String")?.mapping("text", &[]);
                t.index("notes")?;
                Ok(())
            })
        });
        assert!(registry.type_named("NoteGroupedBy").is_none());
        let aggregation = registry
            .type_named("NoteAggregation")
            .unwrap()
            .as_object()
            .unwrap();
        assert!(!aggregation.fields.contains_key("grouped_by"));
    }
}
