use elasticgraph_schema::{
    define_schema, ForeignKeyDirection, SchemaArtifacts, SchemaConfig, SchemaError,
};
use serde_json::json;

fn widget_component_schema() -> SchemaArtifacts {
    define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("name", "String!")?;
            t.index("widgets")?;
            Ok(())
        })?;
        schema.object_type("Component", |t| {
            t.field("id", "ID!")?;
            t.relates_to_one("widget", "Widget", "component_ids", ForeignKeyDirection::In)?;
            t.field("widget_name", "String")?
                .sourced_from("widget", "name");
            t.index("components")?;
            Ok(())
        })
    })
    .expect("the widget/component schema compiles")
}

#[test]
fn sourced_fields_are_omitted_from_the_destination_event_schema() {
    let artifacts = widget_component_schema();
    for document in [
        &artifacts.public_json_schema,
        artifacts.current_versioned_json_schema(),
    ] {
        let component = &document["$defs"]["Component"]["properties"];
        assert!(component.get("widget_name").is_none());
        assert!(component.get("id").is_some());
    }
    // The field is still queryable.
    assert!(artifacts.graphql_schema.contains("widget_name: String"));
}

#[test]
fn the_source_type_carries_an_update_target_for_the_destination() {
    let artifacts = widget_component_schema();
    let widget_targets = artifacts.runtime_metadata["object_types_by_name"]["Widget"]
        ["update_targets"]
        .as_array()
        .unwrap()
        .clone();

    let sourced = widget_targets
        .iter()
        .find(|target| target["type"] == json!("Component"))
        .expect("Widget should carry an update target for Component");
    assert_eq!(sourced["relationship"], json!("widget"));
    assert_eq!(sourced["id_source"], json!("component_ids"));
    assert_eq!(
        sourced["data_params"]["widget_name"],
        json!({"source_path": "name", "cardinality": "one"})
    );

    let self_target = widget_targets
        .iter()
        .find(|target| target["type"] == json!("Widget"))
        .expect("every indexed type updates itself");
    assert_eq!(self_target["id_source"], json!("id"));
    assert!(self_target["script_id"]
        .as_str()
        .unwrap()
        .starts_with("update_index_data_"));
}

#[test]
fn the_inbound_foreign_key_is_synthesized_on_the_source_type() {
    let artifacts = widget_component_schema();
    let widget_properties =
        &artifacts.current_versioned_json_schema()["$defs"]["Widget"]["properties"];
    // component_ids is indexing-only: present on events, absent from GraphQL.
    assert!(widget_properties.get("component_ids").is_some());
    assert!(!artifacts.graphql_schema.contains("component_ids"));
}

#[test]
fn unresolvable_sourced_from_problems_are_reported_together() {
    let result = define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            Ok(())
        })?;
        schema.object_type("Component", |t| {
            t.field("id", "ID!")?;
            t.relates_to_one("widget", "Widget", "component_ids", ForeignKeyDirection::In)?;
            t.field("widget_name", "String")?
                .sourced_from("widget", "name");
            t.field("widget_size", "Int")?
                .sourced_from("widgt", "size");
            t.index("components")?;
            Ok(())
        })
    });
    let errors = result.unwrap_err();
    assert_eq!(errors.errors().len(), 2, "{errors}");
    assert!(errors
        .errors()
        .iter()
        .any(|e| matches!(e, SchemaError::UnresolvableSourcedFromPath { .. })));
    assert!(errors
        .errors()
        .iter()
        .any(|e| matches!(e, SchemaError::UnresolvableRelationship { .. })));
}

#[test]
fn derived_indexed_types_get_generated_update_scripts() {
    let artifacts = define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("WidgetCurrency", |t| {
            t.field("id", "ID!")?;
            t.field("widget_ids", "[ID!]!")?;
            t.index("widget_currencies")?;
            Ok(())
        })?;
        schema.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.field("currency", "ID!")?;
            t.index("widgets")?;
            t.derived_indexed_type("WidgetCurrency", "currency", |d| {
                d.append_only_set("widget_ids", "id");
                Ok(())
            })?;
            Ok(())
        })
    })
    .unwrap();

    let widget_targets = artifacts.runtime_metadata["object_types_by_name"]["Widget"]
        ["update_targets"]
        .as_array()
        .unwrap()
        .clone();
    let derived = widget_targets
        .iter()
        .find(|target| target["type"] == json!("WidgetCurrency"))
        .unwrap();
    let script_id = derived["script_id"].as_str().unwrap();
    assert!(script_id.starts_with("update_WidgetCurrency_from_Widget_"));

    // The generated script is part of the datastore configuration.
    let script = &artifacts.datastore_config["scripts"][script_id];
    assert_eq!(script["context"], json!("update"));
    assert!(script["source"]
        .as_str()
        .unwrap()
        .contains("appendOnlySet_idempotentlyInsertValues"));
}
