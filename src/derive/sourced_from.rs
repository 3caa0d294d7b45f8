use crate::derive::batch;
use crate::emit::scripts;
use crate::error::{SchemaError, SchemaErrors};
use crate::schema::definitions::{Cardinality, ForeignKeyDirection};
use crate::schema::registry::{SchemaRegistry, UpdateTarget, UpdateTargetParam};
use indexmap::IndexMap;
use multimap::MultiMap;

/// The `sourced_from` closure: resolves every `(destination type,
/// relationship)` group to an update target on the source type, so the
/// indexer can fold source events into destination documents. All problems
/// found in the pass are reported together.
pub(crate) fn close(registry: &mut SchemaRegistry) -> Result<(), SchemaErrors> {
    let mut errors = Vec::new();
    let mut targets: IndexMap<String, Vec<UpdateTarget>> = IndexMap::new();

    // Every indexed type updates its own documents when its events arrive.
    for type_name in registry.indexable_concrete_type_names() {
        let target = self_update_target(registry, &type_name);
        targets.entry(type_name).or_default().push(target);
    }

    derive_sourced_from_targets(registry, &mut targets, &mut errors);
    derive_indexed_type_targets(registry, &mut targets);

    batch(errors)?;
    registry.update_targets_by_source_type = targets;
    Ok(())
}

fn self_update_target(registry: &SchemaRegistry, type_name: &str) -> UpdateTarget {
    let type_def = registry
        .type_named(type_name)
        .expect("indexable type names come from the registry");
    let index = type_def
        .as_object()
        .and_then(|o| o.index.as_ref())
        .or_else(|| type_def.as_interface().and_then(|i| i.index.as_ref()));

    let mut data_params = IndexMap::new();
    if let Some(fields) = type_def.fields() {
        for field in fields.values() {
            if field.accepts_event_value() {
                data_params.insert(
                    field.name_in_index.clone(),
                    UpdateTargetParam {
                        source_path: field.name.clone(),
                        cardinality: Cardinality::One,
                    },
                );
            }
        }
    }

    UpdateTarget {
        destination_type: type_name.to_owned(),
        relationship: None,
        script_id: scripts::index_data_update_script_id(),
        id_source: "id".to_owned(),
        routing_value_source: index.and_then(|i| i.route_with.clone()),
        rollover_timestamp_value_source: index
            .and_then(|i| i.rollover.as_ref())
            .map(|r| r.timestamp_field_path.clone()),
        data_params,
    }
}

fn derive_sourced_from_targets(
    registry: &SchemaRegistry,
    targets: &mut IndexMap<String, Vec<UpdateTarget>>,
    errors: &mut Vec<SchemaError>,
) {
    // (destination type, relationship name) -> sourced field names
    let mut groups: MultiMap<(String, String), String> = MultiMap::new();
    for type_def in registry.types().values() {
        let Some(fields) = type_def.fields() else {
            continue;
        };
        for field in fields.values() {
            if let Some(sourced) = &field.sourced_from {
                groups.insert(
                    (type_def.name().to_owned(), sourced.relationship.clone()),
                    field.name.clone(),
                );
            }
        }
    }

    for ((destination_type, relationship_name), sourced_field_names) in groups.iter_all() {
        let destination = registry
            .type_named(destination_type)
            .expect("group keys come from the registry");
        let destination_fields = destination.fields().expect("only field-bearing types source");

        let Some(relationship) = destination_fields
            .get(relationship_name)
            .and_then(|f| f.relationship.as_ref())
        else {
            for field in sourced_field_names {
                errors.push(SchemaError::UnresolvableRelationship {
                    type_name: destination_type.clone(),
                    field: field.clone(),
                    relationship: relationship_name.clone(),
                });
            }
            continue;
        };

        let source_type = relationship.related_type.clone();
        if !registry.is_indexed(&source_type) {
            for field in sourced_field_names {
                errors.push(SchemaError::SourcedFromUnindexedType {
                    type_name: destination_type.clone(),
                    field: field.clone(),
                    relationship: relationship_name.clone(),
                    related_type: source_type.clone(),
                });
            }
            continue;
        }
        if relationship.cardinality == Cardinality::Many {
            errors.push(SchemaError::Definition {
                message: format!(
                    "`{destination_type}` sources fields from `{relationship_name}`, which \
                     is a `relates_to_many` relationship; `sourced_from` requires \
                     `relates_to_one`"
                ),
            });
            continue;
        }
        if relationship.direction == ForeignKeyDirection::Out {
            errors.push(SchemaError::Definition {
                message: format!(
                    "`{destination_type}` sources fields from `{relationship_name}`, whose \
                     foreign key `{}` lives on `{destination_type}` itself; the indexer can \
                     only locate destination documents when the foreign key lives on the \
                     source type (`dir: in`)",
                    relationship.foreign_key
                ),
            });
            continue;
        }
        // dir: in, so the foreign key is a field of the source type.
        if registry
            .resolve_field_path(&source_type, &relationship.foreign_key)
            .is_none()
        {
            errors.push(SchemaError::Definition {
                message: format!(
                    "relationship `{destination_type}.{relationship_name}` joins through \
                     `{}.{}`, which does not resolve to a field",
                    source_type, relationship.foreign_key
                ),
            });
            continue;
        }

        let mut data_params = IndexMap::new();
        for field_name in sourced_field_names {
            let field = &destination_fields[field_name.as_str()];
            let sourced = field
                .sourced_from
                .as_ref()
                .expect("grouped fields all carry sourced_from");
            if registry
                .resolve_field_path(&source_type, &sourced.field_path)
                .is_none()
            {
                errors.push(SchemaError::UnresolvableSourcedFromPath {
                    type_name: destination_type.clone(),
                    field: field_name.clone(),
                    relationship: relationship_name.clone(),
                    path: sourced.field_path.clone(),
                    related_type: source_type.clone(),
                });
                continue;
            }
            data_params.insert(
                field.name_in_index.clone(),
                UpdateTargetParam {
                    source_path: sourced.field_path.clone(),
                    cardinality: Cardinality::One,
                },
            );
        }

        let destination_index = destination.as_object().and_then(|o| o.index.as_ref());
        let routing_value_source = match destination_index.and_then(|i| i.route_with.as_ref()) {
            None => None,
            Some(route_with) => {
                // The routing value must be derivable from the source event;
                // that requires the routing field to be sourced through this
                // same relationship.
                let sourced_routing = destination_fields
                    .get(route_with.as_str())
                    .and_then(|f| f.sourced_from.as_ref())
                    .filter(|s| &s.relationship == relationship_name)
                    .map(|s| s.field_path.clone());
                if sourced_routing.is_none() {
                    errors.push(SchemaError::Definition {
                        message: format!(
                            "`{destination_type}` uses custom shard routing on \
                             `{route_with}`, so events of `{source_type}` cannot be routed \
                             to its documents; source `{route_with}` from \
                             `{relationship_name}` as well to fix this"
                        ),
                    });
                    continue;
                }
                sourced_routing
            }
        };

        targets
            .entry(source_type.clone())
            .or_default()
            .push(UpdateTarget {
                destination_type: destination_type.clone(),
                relationship: Some(relationship_name.clone()),
                script_id: scripts::index_data_update_script_id(),
                id_source: relationship.foreign_key.clone(),
                routing_value_source,
                rollover_timestamp_value_source: None,
                data_params,
            });
    }
}

fn derive_indexed_type_targets(
    registry: &SchemaRegistry,
    targets: &mut IndexMap<String, Vec<UpdateTarget>>,
) {
    for type_def in registry.types().values() {
        let Some(object) = type_def.as_object() else {
            continue;
        };
        for rule in &object.derived_indexed_types {
            let script = scripts::derived_indexed_type_script(&object.name, rule);
            let mut data_params = IndexMap::new();
            for function in &rule.fields {
                data_params.insert(
                    function.source().to_owned(),
                    UpdateTargetParam {
                        source_path: function.source().to_owned(),
                        cardinality: Cardinality::One,
                    },
                );
            }
            targets
                .entry(object.name.clone())
                .or_default()
                .push(UpdateTarget {
                    destination_type: rule.destination_type.clone(),
                    relationship: None,
                    script_id: script.id(),
                    id_source: rule.id_source.clone(),
                    routing_value_source: rule.routing_value_source.clone(),
                    rollover_timestamp_value_source: rule
                        .rollover_timestamp_value_source
                        .clone(),
                    data_params,
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::derive::relationships;
    use crate::schema::builder::SchemaDefinition;

    fn widget_component_schema() -> SchemaDefinition {
        let mut api = SchemaDefinition::new(SchemaConfig::default()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("name", "String!")?;
            t.index("widgets")?;
            Ok(())
        })
        .unwrap();
        api.object_type("Component", |t| {
            t.field("id", "ID!")?;
            t.relates_to_one(
                "widget",
                "Widget",
                "component_ids",
                crate::schema::definitions::ForeignKeyDirection::In,
            )?;
            t.field("widget_name", "String")?.sourced_from("widget", "name");
            t.index("components")?;
            Ok(())
        })
        .unwrap();
        api
    }

    #[test]
    fn emits_an_update_target_on_the_source_type() {
        let mut api = widget_component_schema();
        api.registry.complete_user_definition();
        let mut warnings = Vec::new();
        relationships::close(&mut api.registry, &mut warnings).unwrap();
        close(&mut api.registry).unwrap();

        let widget_targets = &api.registry.update_targets_by_source_type["Widget"];
        let sourced = widget_targets
            .iter()
            .find(|t| t.relationship.is_some())
            .unwrap();
        assert_eq!(sourced.destination_type, "Component");
        assert_eq!(sourced.relationship.as_deref(), Some("widget"));
        assert_eq!(sourced.id_source, "component_ids");
        assert_eq!(sourced.data_params["widget_name"].source_path, "name");

        let self_target = widget_targets
            .iter()
            .find(|t| t.relationship.is_none())
            .unwrap();
        assert_eq!(self_target.destination_type, "Widget");
        assert!(self_target.data_params.contains_key("name"));
    }

    #[test]
    fn unresolvable_sourced_from_problems_are_batched() {
        let mut api = SchemaDefinition::new(SchemaConfig::default()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            Ok(())
        })
        .unwrap();
        api.object_type("Component", |t| {
            t.field("id", "ID!")?;
            t.relates_to_one(
                "widget",
                "Widget",
                "component_ids",
                crate::schema::definitions::ForeignKeyDirection::In,
            )?;
            t.field("widget_name", "String")?.sourced_from("widget", "nam");
            t.field("widget_size", "Int")?.sourced_from("widgt", "size");
            t.index("components")?;
            Ok(())
        })
        .unwrap();
        api.registry.complete_user_definition();
        let mut warnings = Vec::new();
        relationships::close(&mut api.registry, &mut warnings).unwrap();

        let errors = close(&mut api.registry).unwrap_err();
        let messages: Vec<String> = errors.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(messages.len(), 2, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("`nam`")));
        assert!(messages.iter().any(|m| m.contains("`widgt`")));
    }
}
