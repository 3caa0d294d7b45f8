use crate::derive::aggregations::{has_aggregatable, has_groupable};
use crate::derive::graphql_visible;
use crate::error::SchemaErrors;
use crate::schema::definitions::{FieldDef, ObjectTypeDef, TypeDef};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use crate::schema::type_ref::TypeRef;
use indexmap::IndexSet;

/// Derives the sub-aggregation family: for every `nested`-mapped list
/// reachable inside an indexed type (including through non-nested object
/// layers), a uniquely named `<OwnerPath><ElementType>SubAggregation` type,
/// its connection, and the container types that expose them.
pub(crate) fn derive(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) -> Result<(), SchemaErrors> {
    let indexed: Vec<String> = registry
        .types()
        .values()
        .filter(|t| {
            registry.is_indexed(t.name())
                && t.derived_from().is_none()
                && !matches!(t, TypeDef::Union(_))
        })
        .map(|t| t.name().to_owned())
        .collect();

    let mut generated = Vec::new();
    let mut generated_bases: IndexSet<String> = IndexSet::new();
    let mut paths = Vec::new();

    for type_name in &indexed {
        let occurrences = nested_list_occurrences(registry, type_name);
        if occurrences.is_empty() {
            continue;
        }
        let container_name =
            namer.derived(DerivedTypeKind::AggregationSubAggregations, type_name);
        let aggregation_name = namer.derived(DerivedTypeKind::Aggregation, type_name);
        let mut container = ObjectTypeDef {
            name: container_name.clone(),
            documentation: Some(format!(
                "Provides the sub-aggregations of `{aggregation_name}`."
            )),
            graphql_only: true,
            derived_from: Some((
                DerivedTypeKind::AggregationSubAggregations,
                type_name.clone(),
            )),
            ..Default::default()
        };
        for occurrence in &occurrences {
            let field = container_field(
                registry,
                names,
                namer,
                type_name,
                occurrence,
                &mut generated,
                &mut generated_bases,
                &mut paths,
            );
            container.fields.insert(field.name.clone(), field);
        }
        generated.push(TypeDef::Object(container));
    }

    for type_def in generated {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }
    for (type_name, path) in paths {
        registry.sub_aggregation_paths_by_type.insert(type_name, path);
    }
    Ok(())
}

/// A `nested`-mapped list field reachable from a type without crossing
/// another nested list.
struct NestedOccurrence {
    /// GraphQL field names from the starting type to the list field.
    field_path: Vec<String>,
    /// `name_in_index` segments of the same path.
    index_path: Vec<String>,
    /// The type declaring the list field (for customization lookup).
    declaring_type: String,
    field_name: String,
    element_type: String,
}

fn nested_list_occurrences(registry: &SchemaRegistry, type_name: &str) -> Vec<NestedOccurrence> {
    let mut occurrences = Vec::new();
    collect_occurrences(registry, type_name, &mut Vec::new(), &mut occurrences);
    occurrences
}

fn collect_occurrences(
    registry: &SchemaRegistry,
    type_name: &str,
    prefix: &mut Vec<(String, String)>,
    out: &mut Vec<NestedOccurrence>,
) {
    let Some(fields) = registry.type_named(type_name).and_then(TypeDef::fields) else {
        return;
    };
    for field in fields.values() {
        if !graphql_visible(field) || !field.indexed() {
            continue;
        }
        let unwrapped = field.ty.fully_unwrapped();
        let Some(TypeDef::Object(element)) = registry.type_named(unwrapped) else {
            continue;
        };
        if element.mapping.is_some() {
            continue;
        }
        let mapping = crate::derive::mapping_type(registry, field);
        if field.ty.is_list() && mapping == "nested" {
            let mut field_path: Vec<String> =
                prefix.iter().map(|(name, _)| name.clone()).collect();
            field_path.push(field.name.clone());
            let mut index_path: Vec<String> =
                prefix.iter().map(|(_, idx)| idx.clone()).collect();
            index_path.push(field.name_in_index.clone());
            out.push(NestedOccurrence {
                field_path,
                index_path,
                declaring_type: type_name.to_owned(),
                field_name: field.name.clone(),
                element_type: unwrapped.to_owned(),
            });
        } else if !field.ty.is_list() && mapping == "object" {
            prefix.push((field.name.clone(), field.name_in_index.clone()));
            collect_occurrences(registry, unwrapped, prefix, out);
            prefix.pop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn container_field(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    owner_base: &str,
    occurrence: &NestedOccurrence,
    generated: &mut Vec<TypeDef>,
    generated_bases: &mut IndexSet<String>,
    paths: &mut Vec<(String, Vec<String>)>,
) -> FieldDef {
    let sub_base = format!("{owner_base}{}", occurrence.element_type);
    let connection_name = generate_node(
        registry,
        names,
        namer,
        &sub_base,
        &occurrence.element_type,
        &occurrence.index_path,
        generated,
        generated_bases,
        paths,
    );

    let mut field = FieldDef::new(
        occurrence.field_path.join("_"),
        TypeRef::named(connection_name),
    );
    field.graphql_only = true;
    field.name_in_index = occurrence.index_path.join(".");
    field.documentation = Some(format!(
        "Used to perform a sub-aggregation of `{}`.",
        occurrence.field_path.join(".")
    ));
    field.args = vec![
        crate::schema::definitions::InputFieldDef::new(
            names.of("filter"),
            &namer.derived(DerivedTypeKind::FilterInput, &occurrence.element_type),
        )
        .doc("Used to filter the sub-aggregated documents before building buckets."),
        crate::schema::definitions::InputFieldDef::new(names.of("first"), "Int")
            .doc("Determines how many sub-aggregation buckets should be returned."),
    ];
    for customization in &registry.sub_aggregations_field_customizations {
        if customization.type_name == occurrence.declaring_type
            && customization.field_name == occurrence.field_name
        {
            (customization.customize)(&mut field);
        }
    }
    field
}

/// Generates the `<base>SubAggregation` type and its connection (and,
/// recursively, the nested container) and returns the connection type name.
#[allow(clippy::too_many_arguments)]
fn generate_node(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
    base: &str,
    element_type: &str,
    index_path: &[String],
    generated: &mut Vec<TypeDef>,
    generated_bases: &mut IndexSet<String>,
    paths: &mut Vec<(String, Vec<String>)>,
) -> String {
    let sub_aggregation_name = namer.derived(DerivedTypeKind::SubAggregation, base);
    let connection_name = namer.derived(DerivedTypeKind::SubAggregationConnection, base);
    if !generated_bases.insert(base.to_owned()) {
        return connection_name;
    }
    paths.push((sub_aggregation_name.clone(), index_path.to_vec()));

    let mut sub_aggregation = ObjectTypeDef {
        name: sub_aggregation_name.clone(),
        documentation: Some(format!(
            "Return type representing a bucket of `{element_type}` values within a \
             sub-aggregation."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::SubAggregation, base.to_owned())),
        ..Default::default()
    };

    let mut count_detail = FieldDef::new(
        names.of("count_detail"),
        TypeRef::parse("AggregationCountDetail!").expect("well-formed"),
    );
    count_detail.graphql_only = true;
    count_detail.documentation = Some(
        "Details of the count of values in this sub-aggregation bucket. Sub-aggregation \
         counts can be approximate."
            .to_owned(),
    );
    sub_aggregation
        .fields
        .insert(count_detail.name.clone(), count_detail);

    if has_groupable(registry, element_type) {
        let mut grouped_by = FieldDef::new(
            names.of("grouped_by"),
            TypeRef::named(namer.derived(DerivedTypeKind::GroupedBy, element_type)),
        );
        grouped_by.graphql_only = true;
        grouped_by.documentation = Some(format!(
            "Used to specify the `{element_type}` fields to group by. The returned values \
             identify each sub-aggregation bucket."
        ));
        sub_aggregation
            .fields
            .insert(grouped_by.name.clone(), grouped_by);
    }
    if has_aggregatable(registry, element_type) {
        let mut aggregated_values = FieldDef::new(
            names.of("aggregated_values"),
            TypeRef::named(namer.derived(DerivedTypeKind::AggregatedValues, element_type)),
        );
        aggregated_values.graphql_only = true;
        aggregated_values.documentation = Some(format!(
            "Provides computed aggregated values over all `{element_type}` values in a \
             sub-aggregation bucket."
        ));
        sub_aggregation
            .fields
            .insert(aggregated_values.name.clone(), aggregated_values);
    }

    let children = nested_list_occurrences(registry, element_type);
    if !children.is_empty() {
        let nested_container_name =
            namer.derived(DerivedTypeKind::SubAggregationSubAggregations, base);
        let mut nested_container = ObjectTypeDef {
            name: nested_container_name.clone(),
            documentation: Some(format!(
                "Provides the sub-aggregations of `{sub_aggregation_name}`."
            )),
            graphql_only: true,
            derived_from: Some((
                DerivedTypeKind::SubAggregationSubAggregations,
                base.to_owned(),
            )),
            ..Default::default()
        };
        for child in &children {
            let mut child_index_path = index_path.to_vec();
            child_index_path.extend(child.index_path.iter().cloned());
            let child_occurrence = NestedOccurrence {
                field_path: child.field_path.clone(),
                index_path: child_index_path,
                declaring_type: child.declaring_type.clone(),
                field_name: child.field_name.clone(),
                element_type: child.element_type.clone(),
            };
            let field = container_field(
                registry,
                names,
                namer,
                base,
                &child_occurrence,
                generated,
                generated_bases,
                paths,
            );
            nested_container.fields.insert(field.name.clone(), field);
        }
        generated.push(TypeDef::Object(nested_container));

        let mut sub_aggregations_field = FieldDef::new(
            names.of("sub_aggregations"),
            TypeRef::named(nested_container_name),
        );
        sub_aggregations_field.graphql_only = true;
        sub_aggregations_field.documentation = Some(format!(
            "Used to perform sub-aggregations of `{sub_aggregation_name}` data."
        ));
        sub_aggregation
            .fields
            .insert(sub_aggregations_field.name.clone(), sub_aggregations_field);
    }

    generated.push(TypeDef::Object(sub_aggregation));

    let mut connection = ObjectTypeDef {
        name: connection_name.clone(),
        documentation: Some(format!(
            "Represents a collection of `{sub_aggregation_name}` buckets."
        )),
        graphql_only: true,
        derived_from: Some((
            DerivedTypeKind::SubAggregationConnection,
            base.to_owned(),
        )),
        ..Default::default()
    };
    let mut nodes = FieldDef::new(
        names.of("nodes"),
        TypeRef::parse(&format!("[{sub_aggregation_name}!]!")).expect("well-formed"),
    );
    nodes.graphql_only = true;
    nodes.documentation = Some("The list of sub-aggregation buckets.".to_owned());
    connection.fields.insert(nodes.name.clone(), nodes);
    let mut page_info = FieldDef::new(
        names.of("page_info"),
        TypeRef::parse("PageInfo!").expect("well-formed"),
    );
    page_info.graphql_only = true;
    page_info.documentation =
        Some("Provides pagination-related information for the buckets.".to_owned());
    connection.fields.insert(page_info.name.clone(), page_info);
    generated.push(TypeDef::Object(connection));

    connection_name
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

    fn team_schema(api: &mut SchemaDefinition) -> Result<(), crate::error::SchemaError> {
        api.object_type("Player", |t| {
            t.field("name", "String")?;
            t.field("points", "Int")?;
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
            t.index("teams")?;
            Ok(())
        })
    }

    #[test]
    fn derives_sub_aggregation_chain_for_nested_lists() {
        let registry = derived_registry(team_schema);

        let container = registry
            .type_named("TeamAggregationSubAggregations")
            .unwrap()
            .as_object()
            .unwrap();
        let seasons = &container.fields["seasons"];
        assert_eq!(seasons.ty.to_string(), "TeamSeasonSubAggregationConnection");
        assert_eq!(seasons.args[0].name, "filter");
        assert_eq!(seasons.args[0].ty.to_string(), "SeasonFilterInput");
        assert_eq!(seasons.args[1].name, "first");

        let season_sub = registry
            .type_named("TeamSeasonSubAggregation")
            .unwrap()
            .as_object()
            .unwrap();
        assert!(season_sub.fields.contains_key("count_detail"));
        assert!(season_sub.fields.contains_key("grouped_by"));
        assert!(season_sub.fields.contains_key("aggregated_values"));
        assert_eq!(
            season_sub.fields["sub_aggregations"].ty.to_string(),
            "TeamSeasonSubAggregationSubAggregations"
        );

        let nested_container = registry
            .type_named("TeamSeasonSubAggregationSubAggregations")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(
            nested_container.fields["players"].ty.to_string(),
            "TeamSeasonPlayerSubAggregationConnection"
        );
        assert!(registry.type_named("TeamSeasonPlayerSubAggregation").is_some());
    }

    #[test]
    fn records_index_paths_for_runtime_metadata() {
        let registry = derived_registry(team_schema);
        assert_eq!(
            registry.sub_aggregation_paths_by_type["TeamSeasonSubAggregation"],
            vec!["seasons".to_owned()]
        );
        assert_eq!(
            registry.sub_aggregation_paths_by_type["TeamSeasonPlayerSubAggregation"],
            vec!["seasons".to_owned(), "players".to_owned()]
        );
    }

    #[test]
    fn types_without_nested_lists_get_no_container() {
        let registry = derived_registry(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("tags", "[String!]")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        assert!(registry
            .type_named("WidgetAggregationSubAggregations")
            .is_none());
    }

    #[test]
    fn traverses_non_nested_object_layers() {
        let registry = derived_registry(|api| {
            api.object_type("Award", |t| {
                t.field("name", "String")?;
                Ok(())
            })?;
            api.object_type("TeamDetails", |t| {
                t.field("awards", "[Award!]")?.mapping("nested", &[]);
                Ok(())
            })?;
            api.object_type("Team", |t| {
                t.field("id", "ID!")?;
                t.field("details", "TeamDetails")?;
                t.index("teams")?;
                Ok(())
            })
        });
        let container = registry
            .type_named("TeamAggregationSubAggregations")
            .unwrap()
            .as_object()
            .unwrap();
        let field = &container.fields["details_awards"];
        assert_eq!(field.ty.to_string(), "TeamAwardSubAggregationConnection");
        assert_eq!(field.name_in_index, "details.awards");
    }
}
