use crate::derive::relay::pagination_args;
use crate::error::SchemaErrors;
use crate::schema::definitions::{FieldDef, InputFieldDef, ObjectTypeDef, TypeDef};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use crate::schema::type_ref::TypeRef;
use heck::ToSnakeCase;

/// Builds the `Query` root: one collection field (named after the index) and
/// one aggregations field per indexed type. The emitted SDL is a complete,
/// executable schema definition.
pub(crate) fn derive(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) -> Result<(), SchemaErrors> {
    let indexed: Vec<(String, String)> = registry
        .types()
        .values()
        .filter_map(|type_def| {
            let index = match type_def {
                TypeDef::Object(object) if object.derived_from.is_none() => {
                    object.index.as_ref()
                }
                TypeDef::Interface(interface) => interface.index.as_ref(),
                _ => None,
            };
            index.map(|index| (type_def.name().to_owned(), index.name.clone()))
        })
        .collect();

    if indexed.is_empty() {
        return Ok(());
    }

    let mut query = ObjectTypeDef {
        name: "Query".to_owned(),
        documentation: Some("The query entry point for the entire schema.".to_owned()),
        graphql_only: true,
        ..Default::default()
    };

    for (type_name, index_name) in indexed {
        let connection = namer.derived(DerivedTypeKind::Connection, &type_name);
        let mut collection = FieldDef::new(
            index_name.clone(),
            TypeRef::parse(&format!("{connection}!")).expect("well-formed"),
        );
        collection.graphql_only = true;
        collection.documentation = Some(format!(
            "Fetches `{type_name}`s based on the provided arguments."
        ));
        collection.args = vec![InputFieldDef::new(
            names.of("filter"),
            &namer.derived(DerivedTypeKind::FilterInput, &type_name),
        )
        .doc(format!(
            "Used to filter the returned `{type_name}`s based on the provided criteria."
        ))];
        // Types with no sortable leaf have no sort order enum to offer.
        let sort_order = namer.derived(DerivedTypeKind::SortOrderInput, &type_name);
        if registry.contains_type(&sort_order) {
            collection.args.push(
                InputFieldDef::new(names.of("order_by"), &format!("[{sort_order}!]")).doc(
                    format!("Used to specify how the returned `{type_name}`s should be sorted."),
                ),
            );
        }
        collection.args.extend(pagination_args(names));
        query.fields.insert(collection.name.clone(), collection);

        let aggregation_connection = namer.derived(
            DerivedTypeKind::Connection,
            &namer.derived(DerivedTypeKind::Aggregation, &type_name),
        );
        let mut aggregations = FieldDef::new(
            names.cased(&format!("{}_aggregations", type_name.to_snake_case())),
            TypeRef::parse(&format!("{aggregation_connection}!")).expect("well-formed"),
        );
        aggregations.graphql_only = true;
        aggregations.documentation = Some(match registry
            .type_named(&type_name)
            .and_then(|t| t.documentation())
        {
            Some(type_docs) => {
                format!("Aggregations over the `{index_name}` data:\n\n> {type_docs}")
            }
            None => format!("Aggregations over the `{index_name}` data."),
        });
        aggregations.args = vec![InputFieldDef::new(
            names.of("filter"),
            &namer.derived(DerivedTypeKind::FilterInput, &type_name),
        )
        .doc(format!(
            "Used to filter the `{type_name}` documents that get aggregated over based \
             on the provided criteria."
        ))];
        aggregations.args.extend(pagination_args(names));
        query.fields.insert(aggregations.name.clone(), aggregations);
    }

    registry
        .register_type(TypeDef::Object(query))
        .map_err(SchemaErrors::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::built_ins;

    #[test]
    fn query_exposes_collection_and_aggregations_fields_per_index() {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config.clone()).unwrap();
        api.object_type("Widget", |t| {
            t.field("id", "ID!")?;
            t.index("widgets")?;
            Ok(())
        })
        .unwrap();
        let names =
            crate::schema::element_names::SchemaElementNames::new(&config.schema_element_names)
                .unwrap();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        derive(&mut api.registry, &names, &namer).unwrap();

        let query = api.registry.type_named("Query").unwrap().as_object().unwrap();
        assert_eq!(
            query.fields["widgets"].ty.to_string(),
            "WidgetConnection!"
        );
        assert_eq!(
            query.fields["widget_aggregations"].ty.to_string(),
            "WidgetAggregationConnection!"
        );
        let arg_names: Vec<&str> = query.fields["widgets"]
            .args
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(
            arg_names,
            ["filter", "order_by", "first", "after", "last", "before"]
        );
    }

    #[test]
    fn empty_schemas_have_no_query_type() {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config.clone()).unwrap();
        let names =
            crate::schema::element_names::SchemaElementNames::new(&config.schema_element_names)
                .unwrap();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        derive(&mut api.registry, &names, &namer).unwrap();
        assert!(api.registry.type_named("Query").is_none());
    }
}
