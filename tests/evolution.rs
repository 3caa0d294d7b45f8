use elasticgraph_schema::{define_schema, SchemaConfig, SchemaError, SchemaWarning};
use serde_json::json;

fn v1_artifacts() -> elasticgraph_schema::SchemaArtifacts {
    define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("old_name", "String")?;
            t.index("widgets")?;
            Ok(())
        })
    })
    .unwrap()
}

fn v2_config(v1: &elasticgraph_schema::SchemaArtifacts) -> SchemaConfig {
    let mut config = SchemaConfig::default();
    config.prior_versioned_json_schemas =
        vec![v1.current_versioned_json_schema().clone()];
    config.prior_public_json_schema = Some(v1.public_json_schema.clone());
    config
}

#[test]
fn renamed_fields_keep_historical_versions_ingestible() {
    let v1 = v1_artifacts();
    let v2 = define_schema(v2_config(&v1), |schema| {
        schema.json_schema_version(2)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("new_name", "String")?.renamed_from("old_name");
            t.index("widgets")?;
            Ok(())
        })
    })
    .unwrap();

    assert_eq!(v2.versioned_json_schemas.len(), 2);

    // The merged v1 schema still accepts `old_name` events, translated to
    // the current index field.
    let merged_v1 = &v2.versioned_json_schemas[0];
    assert_eq!(merged_v1["json_schema_version"], json!(1));
    assert_eq!(
        merged_v1["$defs"]["Widget"]["properties"]["old_name"]["ElasticGraph"],
        json!({"type": "String", "nameInIndex": "new_name"})
    );

    // The current version carries only the new field.
    let current = v2.current_versioned_json_schema();
    assert_eq!(current["json_schema_version"], json!(2));
    assert!(current["$defs"]["Widget"]["properties"]
        .get("new_name")
        .is_some());
    assert!(current["$defs"]["Widget"]["properties"]
        .get("old_name")
        .is_none());
}

#[test]
fn unrecorded_removals_fail_with_the_three_remedies() {
    let v1 = v1_artifacts();
    let result = define_schema(v2_config(&v1), |schema| {
        schema.json_schema_version(2)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            Ok(())
        })
    });
    let errors = result.unwrap_err();
    let message = errors.errors()[0].to_string();
    assert!(message.contains("`Widget.old_name`"), "{message}");
    assert!(message.contains("field.renamed_from"), "{message}");
    assert!(message.contains("type.deleted_field"), "{message}");
    assert!(message.contains("schema.deleted_type"), "{message}");
}

#[test]
fn deleted_field_markers_resolve_historical_versions() {
    let v1 = v1_artifacts();
    let v2 = define_schema(v2_config(&v1), |schema| {
        schema.json_schema_version(2)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.deleted_field("old_name");
            t.index("widgets")?;
            Ok(())
        })
    })
    .unwrap();
    assert_eq!(v2.versioned_json_schemas.len(), 2);
    assert!(v2.warnings.is_empty(), "{:?}", v2.warnings);
}

#[test]
fn changed_payload_without_version_bump_aborts() {
    let v1 = v1_artifacts();
    let result = define_schema(v2_config(&v1), |schema| {
        // Still version 1, but the payload changes.
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("old_name", "String")?;
            t.field("extra", "Int")?;
            t.index("widgets")?;
            Ok(())
        })
    });
    let errors = result.unwrap_err();
    match &errors.errors()[0] {
        SchemaError::JsonSchemaVersionNotIncremented {
            current,
            recommended,
            location,
        } => {
            assert_eq!(*current, 1);
            assert_eq!(*recommended, 2);
            assert!(location.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn the_version_guard_can_be_relaxed_to_a_warning() {
    let v1 = v1_artifacts();
    let mut config = v2_config(&v1);
    config.enforce_json_schema_version = false;
    let artifacts = define_schema(config, |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("old_name", "String")?;
            t.field("extra", "Int")?;
            t.index("widgets")?;
            Ok(())
        })
    })
    .unwrap();
    assert!(artifacts.warnings.iter().any(|warning| matches!(
        warning,
        SchemaWarning::JsonSchemaVersionNotIncremented { recommended: 2, .. }
    )));
}

#[test]
fn an_unchanged_payload_does_not_require_a_bump() {
    let v1 = v1_artifacts();
    let again = define_schema(v2_config(&v1), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("old_name", "String")?;
            t.index("widgets")?;
            Ok(())
        })
    })
    .unwrap();
    assert!(again.warnings.is_empty(), "{:?}", again.warnings);
}
