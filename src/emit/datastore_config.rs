use crate::config::SchemaConfig;
use crate::derive::mapping_type;
use crate::emit::scripts::{derived_indexed_type_script, DatastoreScript, STATIC_SCRIPTS};
use crate::error::SchemaErrors;
use crate::schema::definitions::{FieldDef, IndexDef, TypeDef};
use crate::schema::registry::SchemaRegistry;
use serde_json::{json, Map, Value as Json};

/// Emits the datastore configuration: one entry per index (or index
/// template, when the index rolls over) plus every referenced script.
pub(crate) fn emit(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
) -> Result<Json, SchemaErrors> {
    let mut indices = Map::new();
    let mut index_templates = Map::new();

    let mut indexed: Vec<(&str, &IndexDef)> = registry
        .types()
        .values()
        .filter_map(|type_def| {
            let index = match type_def {
                TypeDef::Object(object) => object.index.as_ref(),
                TypeDef::Interface(interface) => interface.index.as_ref(),
                _ => None,
            };
            index.map(|index| (type_def.name(), index))
        })
        .collect();
    indexed.sort_by_key(|(_, index)| index.name.clone());

    for (type_name, index) in indexed {
        let mappings = index_mappings(registry, config, type_name, index);
        let settings = index_settings(index);

        if let Some(rollover) = &index.rollover {
            let custom_ranges: Vec<Json> = rollover
                .custom_ranges
                .iter()
                .map(|range| {
                    let mut entry = Map::new();
                    entry.insert(
                        "index_name_suffix".to_owned(),
                        json!(range.index_name_suffix),
                    );
                    if let Some(gte) = &range.gte {
                        entry.insert("gte".to_owned(), json!(gte));
                    }
                    if let Some(lt) = &range.lt {
                        entry.insert("lt".to_owned(), json!(lt));
                    }
                    Json::Object(entry)
                })
                .collect();
            index_templates.insert(
                index.name.clone(),
                json!({
                    "index_patterns": [format!("{}_rollover__*", index.name)],
                    "template": {
                        "settings": settings,
                        "mappings": mappings,
                    },
                    "custom_timestamp_ranges": custom_ranges,
                }),
            );
        } else {
            indices.insert(
                index.name.clone(),
                json!({"settings": settings, "mappings": mappings}),
            );
        }
    }

    let mut scripts: Vec<DatastoreScript> = STATIC_SCRIPTS.clone();
    for type_def in registry.types().values() {
        let Some(object) = type_def.as_object() else {
            continue;
        };
        for rule in &object.derived_indexed_types {
            scripts.push(derived_indexed_type_script(&object.name, rule));
        }
    }
    scripts.sort_by_key(DatastoreScript::id);
    let mut scripts_map = Map::new();
    for script in scripts {
        scripts_map.insert(
            script.id(),
            json!({
                "context": script.context,
                "language": script.language,
                "source": script.source,
            }),
        );
    }

    Ok(json!({
        "index_templates": index_templates,
        "indices": indices,
        "scripts": scripts_map,
    }))
}

fn index_settings(index: &IndexDef) -> Json {
    let mut settings = Map::new();
    settings.insert("index.mapping.coerce".to_owned(), json!(false));
    settings.insert("index.mapping.ignore_malformed".to_owned(), json!(false));
    settings.insert("index.number_of_replicas".to_owned(), json!(1));
    settings.insert("index.number_of_shards".to_owned(), json!(1));
    for (key, value) in &index.settings {
        let key = if key.starts_with("index.") {
            key.clone()
        } else {
            format!("index.{key}")
        };
        settings.insert(key, value.clone());
    }
    Json::Object(settings)
}

fn index_mappings(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
    type_name: &str,
    index: &IndexDef,
) -> Json {
    let mut mappings = Map::new();
    mappings.insert("dynamic".to_owned(), json!("strict"));
    if config.index_document_sizes {
        mappings.insert("_size".to_owned(), json!({"enabled": true}));
    }
    if index.route_with.is_some() {
        mappings.insert("_routing".to_owned(), json!({"required": true}));
    }

    let mut properties = object_properties(registry, type_name);
    // Bookkeeping fields the indexer maintains on every document.
    properties.insert("__sources".to_owned(), json!({"type": "keyword"}));
    properties.insert(
        "__versions".to_owned(),
        json!({"type": "object", "dynamic": "false"}),
    );
    mappings.insert("properties".to_owned(), Json::Object(properties));

    for (key, value) in &index.mappings {
        mappings.insert(key.clone(), value.clone());
    }
    Json::Object(mappings)
}

/// The mapping `properties` for one document level. Lists at this level
/// (dotted through embedded objects) get integer length entries under
/// `__counts`; `nested` subtrees start a fresh document level of their own.
/// An indexed interface stores every implementer's documents, so its mapping
/// merges the implementer field trees on top of its own.
fn object_properties(registry: &SchemaRegistry, type_name: &str) -> Map<String, Json> {
    let mut properties = Map::new();
    let mut count_paths = Vec::new();
    append_properties(registry, type_name, &mut properties, &mut count_paths, &[], false);
    if let Some(TypeDef::Interface(interface)) = registry.type_named(type_name) {
        let implementers: Vec<String> = registry
            .types()
            .values()
            .filter_map(|candidate| candidate.as_object())
            .filter(|object| object.implements.contains(&interface.name))
            .map(|object| object.name.clone())
            .collect();
        for implementer in implementers {
            append_properties(registry, &implementer, &mut properties, &mut count_paths, &[], false);
        }
    }
    if !count_paths.is_empty() {
        let mut counts = Map::new();
        for path in count_paths {
            counts.insert(path, json!({"type": "integer"}));
        }
        properties.insert(
            "__counts".to_owned(),
            json!({"properties": counts}),
        );
    }
    properties
}

fn append_properties(
    registry: &SchemaRegistry,
    type_name: &str,
    properties: &mut Map<String, Json>,
    count_paths: &mut Vec<String>,
    prefix: &[String],
    within_list: bool,
) {
    let Some(fields) = registry.type_named(type_name).and_then(TypeDef::fields) else {
        return;
    };
    for field in fields.values() {
        if !field.indexed() {
            continue;
        }
        let mut path = prefix.to_vec();
        path.push(field.name_in_index.clone());
        // Under a flattened object list, every field stores a list of
        // values, so each path gets a length entry.
        if field.ty.is_list() || within_list {
            count_paths.push(path.join("."));
        }

        let entry = field_mapping(registry, field, count_paths, &path, within_list);
        properties.insert(field.name_in_index.clone(), entry);
    }
}

fn field_mapping(
    registry: &SchemaRegistry,
    field: &FieldDef,
    count_paths: &mut Vec<String>,
    path: &[String],
    within_list: bool,
) -> Json {
    let mapping = mapping_type(registry, field);
    let unwrapped = field.ty.fully_unwrapped();

    match registry.type_named(unwrapped) {
        Some(TypeDef::Object(object)) if object.mapping.is_none() => {
            if mapping == "nested" {
                let nested = object_properties(registry, unwrapped);
                let mut entry = Map::new();
                entry.insert("type".to_owned(), json!("nested"));
                entry.insert("properties".to_owned(), Json::Object(nested));
                merge_field_options(field, &mut entry);
                Json::Object(entry)
            } else {
                let mut sub_properties = Map::new();
                append_properties(
                    registry,
                    unwrapped,
                    &mut sub_properties,
                    count_paths,
                    path,
                    within_list || field.ty.is_list(),
                );
                let mut entry = Map::new();
                entry.insert("properties".to_owned(), Json::Object(sub_properties));
                Json::Object(entry)
            }
        }
        _ => {
            let mut entry = Map::new();
            entry.insert("type".to_owned(), json!(mapping));
            if field.mapping.is_none() {
                if let Some(TypeDef::Scalar(scalar)) = registry.type_named(unwrapped) {
                    for (key, value) in &scalar.mapping.options {
                        entry.insert(key.clone(), value.clone());
                    }
                }
            }
            merge_field_options(field, &mut entry);
            Json::Object(entry)
        }
    }
}

fn merge_field_options(field: &FieldDef, entry: &mut Map<String, Json>) {
    if let Some(mapping) = &field.mapping {
        for (key, value) in &mapping.options {
            entry.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::definitions::RolloverGranularity;

    fn emitted(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), crate::error::SchemaError>,
    ) -> Json {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config).unwrap();
        api.json_schema_version(1).unwrap();
        f(&mut api).unwrap();
        let names = api.names.clone();
        let namer = crate::schema::namer::Namer::new(&api.config);
        crate::schema::built_ins::register_built_ins(&mut api.registry, &names, &namer, &[])
            .unwrap();
        api.registry.complete_user_definition();
        let mut warnings = Vec::new();
        crate::derive::run(&mut api, &mut warnings).unwrap();
        emit(&api.registry, &api.config).unwrap()
    }

    #[test]
    fn concrete_indices_map_their_field_trees() {
        let config = emitted(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("cost", "Int")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        let widget = &config["indices"]["widgets"];
        assert_eq!(
            widget["mappings"]["properties"]["id"],
            json!({"type": "keyword"})
        );
        assert_eq!(
            widget["mappings"]["properties"]["cost"],
            json!({"type": "integer"})
        );
        assert_eq!(widget["settings"]["index.number_of_shards"], json!(1));
        assert_eq!(widget["mappings"]["dynamic"], json!("strict"));
    }

    #[test]
    fn rollover_indices_become_templates_with_patterns() {
        let config = emitted(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("created_at", "DateTime!")?;
                t.field("workspace_id", "ID")?;
                t.index("widgets")?
                    .rollover(RolloverGranularity::Monthly, "created_at")
                    .custom_timestamp_range("before_2019", None, Some("2019-01-01T00:00:00Z"))?
                    .route_with("workspace_id");
                Ok(())
            })
        });
        assert!(config["indices"].get("widgets").is_none());
        let template = &config["index_templates"]["widgets"];
        assert_eq!(template["index_patterns"], json!(["widgets_rollover__*"]));
        assert_eq!(
            template["template"]["mappings"]["_routing"],
            json!({"required": true})
        );
        assert_eq!(
            template["template"]["mappings"]["properties"]["created_at"],
            json!({"type": "date", "format": "strict_date_time"})
        );
        assert_eq!(
            template["custom_timestamp_ranges"],
            json!([{"index_name_suffix": "before_2019", "lt": "2019-01-01T00:00:00Z"}])
        );
    }

    #[test]
    fn nested_lists_and_counts_are_mapped() {
        let config = emitted(|api| {
            api.object_type("Player", |t| {
                t.field("name", "String")?;
                Ok(())
            })?;
            api.object_type("Season", |t| {
                t.field("year", "Int")?;
                t.field("players", "[Player!]!")?.mapping("nested", &[]);
                Ok(())
            })?;
            api.object_type("Team", |t| {
                t.field("id", "ID!")?;
                t.field("seasons", "[Season!]!")?.mapping("nested", &[]);
                t.field("tags", "[String!]")?;
                t.index("teams")?;
                Ok(())
            })
        });
        let properties = &config["indices"]["teams"]["mappings"]["properties"];
        assert_eq!(properties["seasons"]["type"], json!("nested"));
        assert_eq!(
            properties["seasons"]["properties"]["players"]["type"],
            json!("nested")
        );
        // The root __counts covers root-level lists; nested documents have
        // their own.
        assert_eq!(
            properties["__counts"]["properties"]["seasons"],
            json!({"type": "integer"})
        );
        assert_eq!(
            properties["__counts"]["properties"]["tags"],
            json!({"type": "integer"})
        );
        assert_eq!(
            properties["seasons"]["properties"]["__counts"]["properties"]["players"],
            json!({"type": "integer"})
        );
    }

    #[test]
    fn scripts_are_keyed_by_content_addressed_id() {
        let config = emitted(|api| {
            api.object_type("WidgetCurrency", |t| {
                t.field("id", "ID!")?;
                t.field("widget_ids", "[ID!]!")?;
                t.index("widget_currencies")?;
                Ok(())
            })?;
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("currency", "ID!")?;
                t.index("widgets")?;
                t.derived_indexed_type("WidgetCurrency", "currency", |d| {
                    d.append_only_set("widget_ids", "id");
                    Ok(())
                })?;
                Ok(())
            })
        });
        let scripts = config["scripts"].as_object().unwrap();
        assert!(scripts.keys().any(|k| k.starts_with("update_index_data_")));
        assert!(scripts.keys().any(|k| k.starts_with("filter_by_time_of_day_")));
        let derived_key = scripts
            .keys()
            .find(|k| k.starts_with("update_WidgetCurrency_from_Widget_"))
            .unwrap();
        assert_eq!(scripts[derived_key]["context"], json!("update"));
        assert_eq!(scripts[derived_key]["language"], json!("painless"));
    }

    #[test]
    fn flattened_object_lists_count_their_leaf_paths() {
        let config = emitted(|api| {
            api.object_type("Part", |t| {
                t.field("name", "String")?;
                Ok(())
            })?;
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("parts", "[Part!]")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        let properties = &config["indices"]["widgets"]["mappings"]["properties"];
        assert!(properties["parts"].get("type").is_none());
        assert_eq!(
            properties["parts"]["properties"]["name"],
            json!({"type": "keyword"})
        );
        assert_eq!(
            properties["__counts"]["properties"]["parts"],
            json!({"type": "integer"})
        );
        assert_eq!(
            properties["__counts"]["properties"]["parts.name"],
            json!({"type": "integer"})
        );
    }
}
