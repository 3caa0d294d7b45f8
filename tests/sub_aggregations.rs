use elasticgraph_schema::{define_schema, SchemaArtifacts, SchemaConfig};
use serde_json::json;

fn team_schema() -> SchemaArtifacts {
    define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Player", |t| {
            t.field("name", "String")?;
            t.field("points", "Int")?;
            Ok(())
        })?;
        schema.object_type("Season", |t| {
            t.field("year", "Int")?;
            t.field("players", "[Player!]!")?.mapping("nested", &[]);
            Ok(())
        })?;
        schema.object_type("Team", |t| {
            t.field("id", "ID!")?;
            t.field("name", "String")?;
            t.field("seasons", "[Season!]!")?.mapping("nested", &[]);
            t.index("teams")?;
            Ok(())
        })
    })
    .expect("the team schema compiles")
}

#[test]
fn nested_lists_derive_the_sub_aggregation_chain() {
    let artifacts = team_schema();
    let sdl = &artifacts.graphql_schema;

    assert!(sdl.contains("type TeamSeasonSubAggregation"), "{sdl}");
    assert!(sdl.contains("type TeamSeasonPlayerSubAggregation"), "{sdl}");
    assert!(sdl.contains("type TeamAggregationSubAggregations"), "{sdl}");
    // The `seasons` container field takes a filter and a bucket size and
    // resolves to the sub-aggregation connection. The serializer may wrap
    // documented arguments across lines, so assert the pieces.
    assert!(sdl.contains("filter: SeasonFilterInput"), "{sdl}");
    assert!(sdl.contains("): TeamSeasonSubAggregationConnection"), "{sdl}");
    assert!(sdl.contains("filter: PlayerFilterInput"), "{sdl}");
    assert!(
        sdl.contains("): TeamSeasonPlayerSubAggregationConnection"),
        "{sdl}"
    );
}

#[test]
fn sub_aggregations_offer_grouping_and_aggregated_values() {
    let artifacts = team_schema();
    let sdl = &artifacts.graphql_schema;

    assert!(sdl.contains("grouped_by: SeasonGroupedBy"), "{sdl}");
    assert!(sdl.contains("aggregated_values: SeasonAggregatedValues"), "{sdl}");
    assert!(sdl.contains("count_detail: AggregationCountDetail!"), "{sdl}");
    assert!(
        sdl.contains("sub_aggregations: TeamSeasonSubAggregationSubAggregations"),
        "{sdl}"
    );
}

#[test]
fn sub_aggregation_paths_are_recorded_for_the_runtime() {
    let artifacts = team_schema();
    let object_types = &artifacts.runtime_metadata["object_types_by_name"];
    assert_eq!(
        object_types["TeamSeasonSubAggregation"]["sub_aggregation_path"],
        json!(["seasons"])
    );
    assert_eq!(
        object_types["TeamSeasonPlayerSubAggregation"]["sub_aggregation_path"],
        json!(["seasons", "players"])
    );
}

#[test]
fn nested_mappings_flow_into_the_datastore_config() {
    let artifacts = team_schema();
    let properties =
        &artifacts.datastore_config["indices"]["teams"]["mappings"]["properties"];
    assert_eq!(properties["seasons"]["type"], json!("nested"));
    assert_eq!(
        properties["seasons"]["properties"]["players"]["type"],
        json!("nested")
    );
}

#[test]
fn unions_do_not_derive_sub_aggregations() {
    let artifacts = define_schema(SchemaConfig::default(), |schema| {
        schema.json_schema_version(1)?;
        schema.object_type("Comment", |t| {
            t.field("body", "String")?;
            Ok(())
        })?;
        schema.object_type("Post", |t| {
            t.field("id", "ID!")?;
            t.field("comments", "[Comment!]")?.mapping("nested", &[]);
            t.index("posts")?;
            Ok(())
        })?;
        schema.object_type("Page", |t| {
            t.field("id", "ID!")?;
            t.index("pages")?;
            Ok(())
        })?;
        schema.union_type("Content", |u| {
            u.subtypes(&["Post", "Page"]);
            Ok(())
        })
    })
    .unwrap();
    let sdl = &artifacts.graphql_schema;
    assert!(!sdl.contains("ContentSubAggregation"), "{sdl}");
    assert!(!sdl.contains("ContentAggregationSubAggregations"), "{sdl}");
}
