use crate::derive::{graphql_visible, is_sortable};
use crate::error::SchemaErrors;
use crate::schema::definitions::{
    DirectiveApplication, EnumTypeDef, EnumValueDef, FieldDef, SortClause, SortDirection, TypeDef,
};
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use serde_json::json;
use std::collections::BTreeSet;

/// Derives a `TSortOrderInput` enum for every indexed type: one
/// `<path>_ASC` / `<path>_DESC` pair per sortable leaf path.
pub(crate) fn derive(registry: &mut SchemaRegistry, namer: &Namer) -> Result<(), SchemaErrors> {
    let indexed: Vec<String> = registry
        .types()
        .values()
        .filter(|t| registry.is_indexed(t.name()) && t.derived_from().is_none())
        .map(|t| t.name().to_owned())
        .collect();

    let mut derived = Vec::new();
    for type_name in indexed {
        let enum_name = namer.derived(DerivedTypeKind::SortOrderInput, &type_name);
        let mut enum_def = EnumTypeDef {
            name: enum_name.clone(),
            documentation: Some(format!(
                "Enumerates the ways `{type_name}` documents can be sorted."
            )),
            derived_from: Some((DerivedTypeKind::SortOrderInput, type_name.clone())),
            ..Default::default()
        };

        let mut paths = Vec::new();
        collect_sortable_paths(registry, &type_name, &mut Vec::new(), &mut paths);

        for path in paths {
            for direction in [SortDirection::Asc, SortDirection::Desc] {
                let base_name = format!(
                    "{}_{}",
                    path.graphql_segments.join("_"),
                    direction.enum_suffix()
                );
                let emitted = namer.enum_value(&enum_name, &base_name);
                let adverb = match direction {
                    SortDirection::Asc => "ascending",
                    SortDirection::Desc => "descending",
                };
                let mut value = EnumValueDef::new(emitted.clone());
                value.original_name = base_name;
                value.documentation = Some(format!(
                    "Sorts {adverb} by the `{}` field.",
                    path.graphql_segments.join(".")
                ));
                // A sort value carries a tag only when every segment of its
                // path carries that same tag.
                for tag in &path.common_tags {
                    value
                        .directives
                        .push(DirectiveApplication::new("tag").with_argument("name", json!(tag)));
                }
                value.sort_clause = Some(SortClause {
                    field_path: path.index_segments.join("."),
                    direction,
                });
                enum_def.values.insert(emitted, value);
            }
        }

        if !enum_def.values.is_empty() {
            derived.push(TypeDef::Enum(enum_def));
        }
    }

    for type_def in derived {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }
    Ok(())
}

struct SortablePath {
    graphql_segments: Vec<String>,
    index_segments: Vec<String>,
    common_tags: BTreeSet<String>,
}

fn collect_sortable_paths(
    registry: &SchemaRegistry,
    type_name: &str,
    prefix: &mut Vec<(String, String, BTreeSet<String>)>,
    out: &mut Vec<SortablePath>,
) {
    let Some(fields) = registry.type_named(type_name).and_then(TypeDef::fields) else {
        return;
    };
    for field in fields.values() {
        if !graphql_visible(field) || field.relationship.is_some() {
            continue;
        }
        if is_sortable(registry, field) {
            let mut segments = prefix.clone();
            segments.push((field.name.clone(), field.name_in_index.clone(), field.tags.clone()));
            out.push(to_path(segments));
        } else if embedded_object(registry, field) {
            prefix.push((field.name.clone(), field.name_in_index.clone(), field.tags.clone()));
            collect_sortable_paths(registry, field.ty.fully_unwrapped(), prefix, out);
            prefix.pop();
        }
    }
}

/// Non-list embedded objects are traversed; lists and nested documents
/// cannot supply a document-level sort key.
fn embedded_object(registry: &SchemaRegistry, field: &FieldDef) -> bool {
    !field.ty.is_list()
        && field.indexed()
        && matches!(
            registry.type_named(field.ty.fully_unwrapped()),
            Some(TypeDef::Object(object)) if object.mapping.is_none()
        )
        && field
            .mapping
            .as_ref()
            .map(|m| m.mapping_type != "nested")
            .unwrap_or(true)
}

fn to_path(segments: Vec<(String, String, BTreeSet<String>)>) -> SortablePath {
    let mut common_tags: Option<BTreeSet<String>> = None;
    for (_, _, tags) in &segments {
        common_tags = Some(match common_tags {
            None => tags.clone(),
            Some(existing) => existing.intersection(tags).cloned().collect(),
        });
    }
    SortablePath {
        graphql_segments: segments.iter().map(|(name, _, _)| name.clone()).collect(),
        index_segments: segments.iter().map(|(_, idx, _)| idx.clone()).collect(),
        common_tags: common_tags.unwrap_or_default(),
    }
}
