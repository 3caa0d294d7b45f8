//! Version evolution: reconciles previously dumped versioned JSON schemas
//! with the current model so that events published against any historical
//! version remain ingestible.

use crate::config::SchemaConfig;
use crate::error::{SchemaError, SchemaErrors, SchemaWarning};
use crate::schema::definitions::TypeDef;
use crate::schema::registry::{SchemaRegistry, EVENT_ENVELOPE_TYPE_NAME};
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value as Json};

/// How a historical name resolved against the current schema.
enum Resolution {
    Current(String),
    Deleted,
    Unresolved,
}

/// A deprecated element usage key: distinguishes type-level markers from
/// field-level markers on a given type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DeprecationKey {
    DeletedType(String),
    TypeRenamedFrom(String, String),
    DeletedField(String, String),
    FieldRenamedFrom(String, String, String),
}

/// Merges the current model's metadata into every prior versioned schema.
/// Every field of every prior version must resolve through renames and
/// deletion markers; all failures in the pass are reported together.
pub(crate) fn merge_prior_versions(
    registry: &SchemaRegistry,
    prior_versions: &[Json],
    warnings: &mut Vec<SchemaWarning>,
) -> Result<Vec<Json>, SchemaErrors> {
    let mut errors = Vec::new();
    let mut merged_versions = Vec::new();
    let mut used: IndexSet<DeprecationKey> = IndexSet::new();
    // (historical type, historical field) -> name_in_index it resolved to,
    // for cross-version conflict detection.
    let mut resolutions: IndexMap<(String, String), String> = IndexMap::new();

    for prior in prior_versions {
        let version = prior
            .get("json_schema_version")
            .and_then(Json::as_u64)
            .unwrap_or(0) as u32;
        let mut merged = prior.clone();
        let Some(defs) = merged.get_mut("$defs").and_then(Json::as_object_mut) else {
            merged_versions.push(merged);
            continue;
        };

        for (historical_type, definition) in defs.iter_mut() {
            if historical_type == EVENT_ENVELOPE_TYPE_NAME {
                continue;
            }
            let resolution = resolve_type(registry, historical_type, &mut used);
            let current_type = match resolution {
                Resolution::Current(name) => name,
                Resolution::Deleted => continue,
                Resolution::Unresolved => {
                    for field in historical_field_names(definition) {
                        errors.push(SchemaError::UnresolvableHistoricalField {
                            version,
                            type_name: historical_type.clone(),
                            field,
                        });
                    }
                    continue;
                }
            };

            let Some(properties) = definition
                .get_mut("properties")
                .and_then(Json::as_object_mut)
            else {
                continue;
            };
            for (historical_field, property) in properties.iter_mut() {
                if historical_field == "__typename" {
                    continue;
                }
                match resolve_field(registry, &current_type, historical_field, &mut used) {
                    Resolution::Current(current_field) => {
                        let Some(field_def) = registry
                            .type_named(&current_type)
                            .and_then(TypeDef::fields)
                            .and_then(|fields| fields.get(&current_field))
                        else {
                            continue;
                        };
                        let key = (historical_type.clone(), historical_field.clone());
                        if let Some(previous) = resolutions.get(&key) {
                            if previous != &field_def.name_in_index {
                                errors.push(SchemaError::HistoricalDefinitionConflict {
                                    type_name: historical_type.clone(),
                                    field: historical_field.clone(),
                                    detail: format!(
                                        "one version maps it to `{previous}` while another \
                                         maps it to `{}`",
                                        field_def.name_in_index
                                    ),
                                });
                            }
                        } else {
                            resolutions.insert(key, field_def.name_in_index.clone());
                        }
                        if let Some(property) = property.as_object_mut() {
                            property.insert(
                                "ElasticGraph".to_owned(),
                                json!({
                                    "type": field_def.ty.to_string(),
                                    "nameInIndex": field_def.name_in_index,
                                }),
                            );
                        }
                    }
                    Resolution::Deleted => {}
                    Resolution::Unresolved => {
                        errors.push(SchemaError::UnresolvableHistoricalField {
                            version,
                            type_name: historical_type.clone(),
                            field: historical_field.clone(),
                        });
                    }
                }
            }
        }

        check_mandatory_index_fields(registry, version, &merged, &mut errors);
        merged_versions.push(merged);
    }

    if errors.is_empty() {
        warn_on_unused_deprecations(registry, &used, warnings);
        Ok(merged_versions)
    } else {
        Err(SchemaErrors::new(errors))
    }
}

fn historical_field_names(definition: &Json) -> Vec<String> {
    definition
        .get("properties")
        .and_then(Json::as_object)
        .map(|properties| {
            properties
                .keys()
                .filter(|name| *name != "__typename")
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_type(
    registry: &SchemaRegistry,
    historical_name: &str,
    used: &mut IndexSet<DeprecationKey>,
) -> Resolution {
    if let Some(type_def) = registry.type_named(historical_name) {
        if type_def.derived_from().is_none() {
            return Resolution::Current(historical_name.to_owned());
        }
    }
    for type_def in registry.types().values() {
        let renamed_from = match type_def {
            TypeDef::Object(object) => &object.renamed_from,
            TypeDef::Interface(interface) => &interface.renamed_from,
            _ => continue,
        };
        if renamed_from.contains_key(historical_name) {
            used.insert(DeprecationKey::TypeRenamedFrom(
                type_def.name().to_owned(),
                historical_name.to_owned(),
            ));
            return Resolution::Current(type_def.name().to_owned());
        }
    }
    if registry.deleted_types.contains_key(historical_name) {
        used.insert(DeprecationKey::DeletedType(historical_name.to_owned()));
        return Resolution::Deleted;
    }
    Resolution::Unresolved
}

fn resolve_field(
    registry: &SchemaRegistry,
    current_type: &str,
    historical_field: &str,
    used: &mut IndexSet<DeprecationKey>,
) -> Resolution {
    let Some(type_def) = registry.type_named(current_type) else {
        return Resolution::Unresolved;
    };
    let Some(fields) = type_def.fields() else {
        return Resolution::Unresolved;
    };
    if let Some(field) = fields.get(historical_field) {
        if field.accepts_event_value() {
            return Resolution::Current(historical_field.to_owned());
        }
    }
    for field in fields.values() {
        if field.renamed_from.contains_key(historical_field) {
            used.insert(DeprecationKey::FieldRenamedFrom(
                current_type.to_owned(),
                field.name.clone(),
                historical_field.to_owned(),
            ));
            return Resolution::Current(field.name.clone());
        }
    }
    let deleted_fields = match type_def {
        TypeDef::Object(object) => &object.deleted_fields,
        TypeDef::Interface(interface) => &interface.deleted_fields,
        _ => return Resolution::Unresolved,
    };
    if deleted_fields.contains_key(historical_field) {
        used.insert(DeprecationKey::DeletedField(
            current_type.to_owned(),
            historical_field.to_owned(),
        ));
        return Resolution::Deleted;
    }
    Resolution::Unresolved
}

/// Rollover timestamps and routing keys must stay resolvable in every
/// historical version that carries the type, or old events cannot be routed.
fn check_mandatory_index_fields(
    registry: &SchemaRegistry,
    version: u32,
    merged: &Json,
    errors: &mut Vec<SchemaError>,
) {
    let Some(defs) = merged.get("$defs").and_then(Json::as_object) else {
        return;
    };
    for type_def in registry.types().values() {
        let index = match type_def {
            TypeDef::Object(object) => object.index.as_ref(),
            TypeDef::Interface(interface) => interface.index.as_ref(),
            _ => None,
        };
        let Some(index) = index else { continue };
        let Some(definition) = defs.get(type_def.name()) else {
            continue;
        };
        let Some(properties) = definition.get("properties").and_then(Json::as_object) else {
            continue;
        };

        let mut mandatory: Vec<(String, &str)> = Vec::new();
        if let Some(rollover) = &index.rollover {
            if !rollover.timestamp_field_path.contains('.') {
                mandatory.push((rollover.timestamp_field_path.clone(), "rollover timestamp"));
            }
        }
        if let Some(route_with) = &index.route_with {
            if !route_with.contains('.') {
                mandatory.push((route_with.clone(), "shard routing key"));
            }
        }

        for (field, purpose) in mandatory {
            let present = properties.contains_key(&field)
                || properties.values().any(|property| {
                    property
                        .get("ElasticGraph")
                        .and_then(|m| m.get("nameInIndex"))
                        .and_then(Json::as_str)
                        .is_some_and(|name_in_index| {
                            resolves_to_field(registry, type_def.name(), name_in_index, &field)
                        })
                });
            if !present {
                errors.push(SchemaError::MissingMandatoryHistoricalField {
                    version,
                    type_name: type_def.name().to_owned(),
                    field,
                    index: index.name.clone(),
                    purpose: purpose.to_owned(),
                });
            }
        }
    }
}

fn resolves_to_field(
    registry: &SchemaRegistry,
    type_name: &str,
    name_in_index: &str,
    field: &str,
) -> bool {
    registry
        .type_named(type_name)
        .and_then(TypeDef::fields)
        .and_then(|fields| fields.get(field))
        .is_some_and(|field_def| field_def.name_in_index == name_in_index)
}

fn warn_on_unused_deprecations(
    registry: &SchemaRegistry,
    used: &IndexSet<DeprecationKey>,
    warnings: &mut Vec<SchemaWarning>,
) {
    for (name, element) in &registry.deleted_types {
        if !used.contains(&DeprecationKey::DeletedType(name.clone())) {
            warnings.push(SchemaWarning::UnusedDeprecatedElement {
                name: element.name.clone(),
                defined_at: element.defined_at,
                defined_via: element.defined_via.clone(),
            });
        }
    }
    for type_def in registry.types().values() {
        let (renamed_from, deleted_fields, fields) = match type_def {
            TypeDef::Object(object) => {
                (&object.renamed_from, &object.deleted_fields, &object.fields)
            }
            TypeDef::Interface(interface) => (
                &interface.renamed_from,
                &interface.deleted_fields,
                &interface.fields,
            ),
            _ => continue,
        };
        for (old_name, element) in renamed_from {
            let key =
                DeprecationKey::TypeRenamedFrom(type_def.name().to_owned(), old_name.clone());
            if !used.contains(&key) {
                warnings.push(SchemaWarning::UnusedDeprecatedElement {
                    name: element.name.clone(),
                    defined_at: element.defined_at,
                    defined_via: element.defined_via.clone(),
                });
            }
        }
        for (old_name, element) in deleted_fields {
            let key =
                DeprecationKey::DeletedField(type_def.name().to_owned(), old_name.clone());
            if !used.contains(&key) {
                warnings.push(SchemaWarning::UnusedDeprecatedElement {
                    name: element.name.clone(),
                    defined_at: element.defined_at,
                    defined_via: element.defined_via.clone(),
                });
            }
        }
        for field in fields.values() {
            for (old_name, element) in &field.renamed_from {
                let key = DeprecationKey::FieldRenamedFrom(
                    type_def.name().to_owned(),
                    field.name.clone(),
                    old_name.clone(),
                );
                if !used.contains(&key) {
                    warnings.push(SchemaWarning::UnusedDeprecatedElement {
                        name: element.name.clone(),
                        defined_at: element.defined_at,
                        defined_via: element.defined_via.clone(),
                    });
                }
            }
        }
    }
}

/// The version bump guard: a changed public JSON schema payload requires a
/// strictly increased `json_schema_version`.
pub(crate) fn check_version_bump(
    config: &SchemaConfig,
    registry: &SchemaRegistry,
    current_public: &Json,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<(), SchemaErrors> {
    let Some(prior) = &config.prior_public_json_schema else {
        return Ok(());
    };
    let prior_version = prior
        .get("json_schema_version")
        .and_then(Json::as_u64)
        .unwrap_or(0) as u32;
    let current_version = registry
        .json_schema_version
        .map(|(version, _)| version)
        .unwrap_or(0);

    if normalized(prior) == normalized(current_public) {
        return Ok(());
    }
    if current_version > prior_version {
        return Ok(());
    }

    let recommended = prior_version + 1;
    if config.enforce_json_schema_version {
        Err(SchemaError::JsonSchemaVersionNotIncremented {
            current: current_version,
            recommended,
            location: registry.json_schema_version.map(|(_, location)| location),
        }
        .into())
    } else {
        warnings.push(SchemaWarning::JsonSchemaVersionNotIncremented {
            current: current_version,
            recommended,
        });
        Ok(())
    }
}

/// The payload with version markers removed, so that a bump alone does not
/// read as a change.
fn normalized(document: &Json) -> Json {
    let mut normalized = document.clone();
    if let Some(map) = normalized.as_object_mut() {
        map.remove("json_schema_version");
    }
    if let Some(envelope_properties) = normalized
        .pointer_mut(&format!("/$defs/{EVENT_ENVELOPE_TYPE_NAME}/properties"))
        .and_then(Json::as_object_mut)
    {
        envelope_properties.remove("json_schema_version");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;

    fn prepared_api(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), SchemaError>,
    ) -> SchemaDefinition {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config).unwrap();
        f(&mut api).unwrap();
        let names = api.names.clone();
        let namer = crate::schema::namer::Namer::new(&api.config);
        crate::schema::built_ins::register_built_ins(&mut api.registry, &names, &namer, &[])
            .unwrap();
        api.registry.complete_user_definition();
        api
    }

    fn prior_v1_with_field(field: &str) -> Json {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "json_schema_version": 1,
            "$defs": {
                "ElasticGraphEventEnvelope": {"type": "object"},
                "Widget": {
                    "type": "object",
                    "properties": {
                        "__typename": {"type": "string", "const": "Widget"},
                        "id": {"$ref": "#/$defs/ID",
                               "ElasticGraph": {"type": "ID!", "nameInIndex": "id"}},
                        field: {"$ref": "#/$defs/String",
                                "ElasticGraph": {"type": "String", "nameInIndex": field}},
                    },
                    "required": ["__typename", "id", field],
                },
            },
        })
    }

    #[test]
    fn renamed_fields_resolve_and_metadata_is_rewritten() {
        let api = prepared_api(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("new_name", "String")?.renamed_from("old_name");
                t.index("widgets")?;
                Ok(())
            })
        });
        let mut warnings = Vec::new();
        let merged = merge_prior_versions(
            &api.registry,
            &[prior_v1_with_field("old_name")],
            &mut warnings,
        )
        .unwrap();
        let metadata = &merged[0]["$defs"]["Widget"]["properties"]["old_name"]["ElasticGraph"];
        assert_eq!(metadata["nameInIndex"], json!("new_name"));
        assert_eq!(metadata["type"], json!("String"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn unresolvable_fields_error_with_remedies() {
        let api = prepared_api(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        let mut warnings = Vec::new();
        let errors = merge_prior_versions(
            &api.registry,
            &[prior_v1_with_field("old_name")],
            &mut warnings,
        )
        .unwrap_err();
        let message = errors.errors()[0].to_string();
        assert!(message.contains("`Widget.old_name`"));
        assert!(message.contains("renamed_from"));
        assert!(message.contains("deleted_field"));
        assert!(message.contains("deleted_type"));
    }

    #[test]
    fn deletion_markers_resolve_and_unused_ones_warn() {
        let api = prepared_api(|api| {
            api.deleted_type("Gadget");
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.deleted_field("old_name");
                t.deleted_field("never_existed");
                t.index("widgets")?;
                Ok(())
            })
        });
        let mut warnings = Vec::new();
        merge_prior_versions(
            &api.registry,
            &[prior_v1_with_field("old_name")],
            &mut warnings,
        )
        .unwrap();
        // `old_name` matched; `Gadget` and `never_existed` did not.
        let unused: Vec<&str> = warnings
            .iter()
            .filter_map(|w| match w {
                SchemaWarning::UnusedDeprecatedElement { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(unused, ["Gadget", "never_existed"]);
    }

    #[test]
    fn version_bump_guard_errors_or_warns() {
        let mut api = prepared_api(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        api.registry.json_schema_version =
            Some((1, crate::error::SourceLocation { file: "schema.rs", line: 10 }));

        let mut prior = json!({"json_schema_version": 1, "$defs": {"Widget": {}}});
        let current = json!({"json_schema_version": 1, "$defs": {"Widget": {"type": "object"}}});

        let mut config = SchemaConfig::default();
        config.prior_public_json_schema = Some(prior.clone());
        let mut warnings = Vec::new();
        let error = check_version_bump(&config, &api.registry, &current, &mut warnings)
            .unwrap_err();
        let message = error.errors()[0].to_string();
        assert!(message.contains("was not incremented"));
        assert!(message.contains("schema.rs:10"));
        assert!(message.contains("Update it to 2"));

        config.enforce_json_schema_version = false;
        check_version_bump(&config, &api.registry, &current, &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);

        // An unchanged payload never trips the guard.
        prior["$defs"]["Widget"] = json!({"type": "object"});
        config.prior_public_json_schema = Some(prior);
        config.enforce_json_schema_version = true;
        let mut warnings = Vec::new();
        check_version_bump(&config, &api.registry, &current, &mut warnings).unwrap();
        assert!(warnings.is_empty());
    }
}
