use crate::config::SchemaConfig;
use crate::emit::scripts::static_script_ids_by_scoped_name;
use crate::error::SchemaErrors;
use crate::schema::definitions::{SortClause, SortDirection, TypeDef};
use crate::schema::namer::DerivedTypeKind;
use crate::schema::registry::{SchemaRegistry, UpdateTarget};
use indexmap::IndexSet;
use serde_json::{json, Map, Value as Json};

/// Emits the runtime metadata bundle consumed by the query and indexing
/// processes. Entries for types that did not survive SDL normalization are
/// pruned.
pub(crate) fn emit(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
    sdl_type_names: &IndexSet<String>,
) -> Result<Json, SchemaErrors> {
    let mut object_types = Map::new();
    let mut scalar_types = Map::new();
    let mut enum_types = Map::new();
    let mut index_definitions = Map::new();

    for type_def in registry.types().values() {
        let in_sdl = sdl_type_names.contains(type_def.name());
        match type_def {
            TypeDef::Object(_) | TypeDef::Interface(_) => {
                if !in_sdl {
                    continue;
                }
                if let Some(entry) = object_type_entry(registry, type_def) {
                    object_types.insert(type_def.name().to_owned(), entry);
                }
            }
            TypeDef::Scalar(scalar) => {
                if !in_sdl && !crate::schema::built_ins::STANDARD_GRAPHQL_SCALARS
                    .contains(&scalar.name.as_str())
                {
                    continue;
                }
                scalar_types.insert(
                    scalar.name.clone(),
                    json!({
                        "mapping_type": scalar.mapping.mapping_type,
                        "json_schema_type": scalar_json_schema_type(&scalar.json_schema),
                    }),
                );
            }
            TypeDef::Enum(enum_def) => {
                if !in_sdl {
                    continue;
                }
                let mut values = Map::new();
                for value in enum_def.values.values() {
                    let mut entry = Map::new();
                    if let Some(SortClause {
                        field_path,
                        direction,
                    }) = &value.sort_clause
                    {
                        entry.insert("sort_field".to_owned(), json!(field_path));
                        entry.insert(
                            "direction".to_owned(),
                            json!(match direction {
                                SortDirection::Asc => "asc",
                                SortDirection::Desc => "desc",
                            }),
                        );
                    }
                    if value.original_name != value.name {
                        entry.insert(
                            "alternate_original_name".to_owned(),
                            json!(value.original_name),
                        );
                    }
                    values.insert(value.name.clone(), Json::Object(entry));
                }
                enum_types.insert(
                    enum_def.name.clone(),
                    json!({"values_by_name": values}),
                );
            }
            TypeDef::Union(_) | TypeDef::Input(_) => {}
        }

        let index = match type_def {
            TypeDef::Object(object) => object.index.as_ref(),
            TypeDef::Interface(interface) => interface.index.as_ref(),
            _ => None,
        };
        if let Some(index) = index {
            let mut entry = Map::new();
            if let Some(route_with) = &index.route_with {
                entry.insert("route_with".to_owned(), json!(route_with));
            }
            if let Some(rollover) = &index.rollover {
                entry.insert(
                    "rollover".to_owned(),
                    json!({
                        "frequency": rollover.granularity.to_string(),
                        "timestamp_field_path": rollover.timestamp_field_path,
                    }),
                );
            }
            entry.insert(
                "default_sort_fields".to_owned(),
                Json::Array(
                    default_sort_with_tiebreaker(&index.default_sort)
                        .into_iter()
                        .map(|clause| {
                            json!({
                                "field": clause.field_path,
                                "direction": clause.direction.to_string(),
                            })
                        })
                        .collect(),
                ),
            );
            index_definitions.insert(index.name.clone(), Json::Object(entry));
        }
    }

    let extension_modules: Vec<Json> = registry
        .graphql_extension_modules
        .iter()
        .map(|module| {
            json!({
                "require_path": module.require_path,
                "name": module.name,
                "config": module.config,
            })
        })
        .collect();

    Ok(json!({
        "object_types_by_name": object_types,
        "scalar_types_by_name": scalar_types,
        "enum_types_by_name": enum_types,
        "index_definitions_by_name": index_definitions,
        "schema_element_names": {
            "form": config.schema_element_names.form.to_string(),
            "overrides": config.schema_element_names.overrides,
        },
        "graphql_extension_modules": extension_modules,
        "static_script_ids_by_scoped_name": static_script_ids_by_scoped_name(),
    }))
}

/// The `type` of a scalar's JSON schema descriptor. Descriptors composed as
/// an `anyOf` union (e.g. `LongString`, which accepts integer-or-string)
/// report the list of member types.
fn scalar_json_schema_type(json_schema: &Json) -> Json {
    if let Some(ty) = json_schema.get("type") {
        return ty.clone();
    }
    json_schema
        .get("anyOf")
        .and_then(Json::as_array)
        .map(|variants| {
            Json::Array(
                variants
                    .iter()
                    .filter_map(|variant| variant.get("type").cloned())
                    .collect(),
            )
        })
        .unwrap_or(Json::Null)
}

fn object_type_entry(registry: &SchemaRegistry, type_def: &TypeDef) -> Option<Json> {
    let mut entry = Map::new();

    let mut graphql_fields = Map::new();
    if let Some(fields) = type_def.fields() {
        for field in fields.values() {
            if field.indexing_only {
                continue;
            }
            let mut field_entry = Map::new();
            if field.name_in_index != field.name {
                field_entry.insert("name_in_index".to_owned(), json!(field.name_in_index));
            }
            if let Some(script) = &field.runtime_script {
                field_entry.insert("runtime_script".to_owned(), json!(script));
            }
            if !field_entry.is_empty() {
                graphql_fields.insert(field.name.clone(), Json::Object(field_entry));
            }
        }
    }
    if !graphql_fields.is_empty() {
        entry.insert(
            "graphql_fields_by_name".to_owned(),
            Json::Object(graphql_fields),
        );
    }

    if let Some(targets) = registry.update_targets_by_source_type.get(type_def.name()) {
        entry.insert(
            "update_targets".to_owned(),
            Json::Array(targets.iter().map(update_target_json).collect()),
        );
    }

    let index = match type_def {
        TypeDef::Object(object) => object.index.as_ref(),
        TypeDef::Interface(interface) => interface.index.as_ref(),
        _ => None,
    };
    if let Some(index) = index {
        entry.insert(
            "index_definition_names".to_owned(),
            json!([index.name]),
        );
    }

    if let Some(category) = elasticgraph_category(registry, type_def) {
        entry.insert("elasticgraph_category".to_owned(), json!(category));
    }

    if let Some(path) = registry.sub_aggregation_paths_by_type.get(type_def.name()) {
        entry.insert("sub_aggregation_path".to_owned(), json!(path));
    }

    if entry.is_empty() {
        None
    } else {
        Some(Json::Object(entry))
    }
}

fn elasticgraph_category(registry: &SchemaRegistry, type_def: &TypeDef) -> Option<&'static str> {
    if matches!(type_def.name(), "DateGroupedBy" | "DateTimeGroupedBy") {
        return Some("date_grouped_by");
    }
    let (kind, base) = type_def.derived_from()?;
    match kind {
        DerivedTypeKind::Edge => Some("relay_edge"),
        DerivedTypeKind::Connection | DerivedTypeKind::SubAggregationConnection => {
            Some("relay_connection")
        }
        DerivedTypeKind::AggregatedValues => {
            let scalar_base = base == "NonNumeric"
                || matches!(registry.type_named(base), Some(TypeDef::Scalar(_)));
            scalar_base.then_some("scalar_aggregated_values")
        }
        _ => None,
    }
}

fn update_target_json(target: &UpdateTarget) -> Json {
    let mut data_params = Map::new();
    for (destination, param) in &target.data_params {
        data_params.insert(
            destination.clone(),
            json!({
                "source_path": param.source_path,
                "cardinality": param.cardinality.to_string(),
            }),
        );
    }
    let mut entry = Map::new();
    entry.insert("type".to_owned(), json!(target.destination_type));
    if let Some(relationship) = &target.relationship {
        entry.insert("relationship".to_owned(), json!(relationship));
    }
    entry.insert("script_id".to_owned(), json!(target.script_id));
    entry.insert("id_source".to_owned(), json!(target.id_source));
    if let Some(routing) = &target.routing_value_source {
        entry.insert("routing_value_source".to_owned(), json!(routing));
    }
    if let Some(rollover) = &target.rollover_timestamp_value_source {
        entry.insert("rollover_timestamp_value_source".to_owned(), json!(rollover));
    }
    entry.insert("data_params".to_owned(), Json::Object(data_params));
    Json::Object(entry)
}

/// Cursors must be unique per row; when the declared default sort does not
/// include `id`, an ascending `id` clause is appended as tiebreaker.
fn default_sort_with_tiebreaker(default_sort: &[SortClause]) -> Vec<SortClause> {
    let mut clauses = default_sort.to_vec();
    if !clauses.iter().any(|clause| clause.field_path == "id") {
        clauses.push(SortClause {
            field_path: "id".to_owned(),
            direction: SortDirection::Asc,
        });
    }
    clauses
}
