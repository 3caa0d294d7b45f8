use crate::error::SchemaErrors;
use crate::schema::definitions::{Cardinality, FieldDef, InputFieldDef, ObjectTypeDef, TypeDef};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::{DerivedTypeKind, Namer};
use crate::schema::registry::SchemaRegistry;
use crate::schema::type_ref::TypeRef;

/// Derives Relay pagination types: `TEdge` and `TConnection` for every
/// paginated type (documents and their aggregations), and rewrites
/// `relates_to_many` fields into connection fields.
pub(crate) fn derive(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) -> Result<(), SchemaErrors> {
    let document_types: Vec<String> = registry
        .types()
        .values()
        .filter(|t| registry.is_indexed(t.name()) && t.derived_from().is_none())
        .map(|t| t.name().to_owned())
        .collect();
    let aggregation_types: Vec<String> = registry
        .types()
        .values()
        .filter(|t| {
            matches!(
                t.derived_from(),
                Some((DerivedTypeKind::Aggregation, _))
            )
        })
        .map(|t| t.name().to_owned())
        .collect();

    let mut generated = Vec::new();
    for type_name in &document_types {
        generated.push(edge_type(names, namer, type_name));
        generated.push(connection_type(names, namer, type_name, true));
    }
    for type_name in &aggregation_types {
        generated.push(edge_type(names, namer, type_name));
        generated.push(connection_type(names, namer, type_name, false));
    }
    for type_def in generated {
        registry.register_type(type_def).map_err(SchemaErrors::from)?;
    }

    rewrite_relationship_fields(registry, names, namer);
    Ok(())
}

fn edge_type(names: &SchemaElementNames, namer: &Namer, base: &str) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::Edge, base);
    let mut type_def = ObjectTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Represents a specific `{base}` in the context of a `{}`, providing access \
             to both the `{base}` and a pagination `Cursor`. This implements the `Edge` \
             specification from the Relay GraphQL Cursor Connections Specification.",
            namer.derived(DerivedTypeKind::Connection, base)
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::Edge, base.to_owned())),
        ..Default::default()
    };

    let mut node = FieldDef::new(names.of("node"), TypeRef::named(base));
    node.graphql_only = true;
    node.documentation = Some(format!("The `{base}` of this edge."));
    type_def.fields.insert(node.name.clone(), node);

    let mut cursor = FieldDef::new(names.of("cursor"), TypeRef::named("Cursor"));
    cursor.graphql_only = true;
    cursor.documentation = Some(
        "The `Cursor` of this edge, usable as `before` or `after` arguments to continue \
         paginating from this point. Cursors are unique per edge: when the requested \
         sort does not uniquely order documents, a tiebreaker on `id` is included."
            .to_owned(),
    );
    type_def.fields.insert(cursor.name.clone(), cursor);

    TypeDef::Object(type_def)
}

fn connection_type(
    names: &SchemaElementNames,
    namer: &Namer,
    base: &str,
    with_total_edge_count: bool,
) -> TypeDef {
    let name = namer.derived(DerivedTypeKind::Connection, base);
    let edge_name = namer.derived(DerivedTypeKind::Edge, base);
    let mut type_def = ObjectTypeDef {
        name: name.clone(),
        documentation: Some(format!(
            "Represents a paginated collection of `{base}` results. This implements the \
             `Connection` specification from the Relay GraphQL Cursor Connections \
             Specification."
        )),
        graphql_only: true,
        derived_from: Some((DerivedTypeKind::Connection, base.to_owned())),
        ..Default::default()
    };

    let mut edges = FieldDef::new(
        names.of("edges"),
        TypeRef::parse(&format!("[{edge_name}!]!")).expect("well-formed"),
    );
    edges.graphql_only = true;
    edges.documentation = Some(format!("Wraps a specific `{base}` to pair it with its pagination cursor."));
    type_def.fields.insert(edges.name.clone(), edges);

    let mut nodes = FieldDef::new(
        names.of("nodes"),
        TypeRef::parse(&format!("[{base}!]!")).expect("well-formed"),
    );
    nodes.graphql_only = true;
    nodes.documentation = Some(format!(
        "The list of `{base}` results, without pagination cursors."
    ));
    type_def.fields.insert(nodes.name.clone(), nodes);

    let mut page_info = FieldDef::new(
        names.of("page_info"),
        TypeRef::parse("PageInfo!").expect("well-formed"),
    );
    page_info.graphql_only = true;
    page_info.documentation =
        Some("Provides pagination-related information.".to_owned());
    type_def.fields.insert(page_info.name.clone(), page_info);

    if with_total_edge_count {
        let mut total = FieldDef::new(
            names.of("total_edge_count"),
            TypeRef::parse("JsonSafeLong!").expect("well-formed"),
        );
        total.graphql_only = true;
        total.documentation =
            Some("The total number of edges available in this connection to paginate over.".to_owned());
        type_def.fields.insert(total.name.clone(), total);
    }

    TypeDef::Object(type_def)
}

/// `relates_to_many` fields become connection fields with filtering, sorting
/// and pagination arguments; `relates_to_one` fields keep their type.
fn rewrite_relationship_fields(
    registry: &mut SchemaRegistry,
    names: &SchemaElementNames,
    namer: &Namer,
) {
    let composite: Vec<String> = registry
        .types()
        .values()
        .filter(|t| t.fields().is_some())
        .map(|t| t.name().to_owned())
        .collect();

    for type_name in composite {
        // Collect rewrites first; `filter_type_for_field` needs `&registry`.
        let mut rewrites: Vec<(String, TypeRef, Vec<InputFieldDef>)> = Vec::new();
        if let Some(fields) = registry.type_named(&type_name).and_then(TypeDef::fields) {
            for field in fields.values() {
                let Some(relationship) = &field.relationship else {
                    continue;
                };
                if relationship.cardinality != Cardinality::Many
                    || !registry.is_indexed(&relationship.related_type)
                {
                    continue;
                }
                let related = &relationship.related_type;
                let connection = namer.derived(DerivedTypeKind::Connection, related);
                let mut args = vec![InputFieldDef::new(
                    names.of("filter"),
                    &namer.derived(DerivedTypeKind::FilterInput, related),
                )
                .doc(format!("Used to filter the returned `{related}` documents."))];
                let sort_order = namer.derived(DerivedTypeKind::SortOrderInput, related);
                if registry.contains_type(&sort_order) {
                    args.push(
                        InputFieldDef::new(names.of("order_by"), &format!("[{sort_order}!]"))
                            .doc(format!(
                                "Used to specify how the returned `{related}` documents \
                                 should be sorted."
                            )),
                    );
                }
                args.extend(pagination_args(names));
                rewrites.push((field.name.clone(), TypeRef::named(connection), args));
            }
        }
        for (field_name, ty, args) in rewrites {
            if let Some(field) = registry
                .type_named_mut(&type_name)
                .and_then(TypeDef::fields_mut)
                .and_then(|fields| fields.get_mut(&field_name))
            {
                field.ty = ty;
                field.args = args;
            }
        }
    }
}

pub(crate) fn pagination_args(names: &SchemaElementNames) -> Vec<InputFieldDef> {
    vec![
        InputFieldDef::new(names.of("first"), "Int")
            .doc("Used in conjunction with the `after` argument to forward-paginate through results."),
        InputFieldDef::new(names.of("after"), "Cursor").doc(
            "Used to forward-paginate through results. When provided, the next page after \
             the provided cursor will be returned.",
        ),
        InputFieldDef::new(names.of("last"), "Int")
            .doc("Used in conjunction with the `before` argument to backward-paginate through results."),
        InputFieldDef::new(names.of("before"), "Cursor").doc(
            "Used to backward-paginate through results. When provided, the previous page \
             before the provided cursor will be returned.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;
    use crate::schema::built_ins;
    use crate::schema::definitions::ForeignKeyDirection;

    fn derived_registry(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), crate::error::SchemaError>,
    ) -> SchemaRegistry {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config.clone()).unwrap();
        f(&mut api).unwrap();
        let names =
            crate::schema::element_names::SchemaElementNames::new(&config.schema_element_names)
                .unwrap();
        let namer = Namer::new(&config);
        built_ins::register_built_ins(&mut api.registry, &names, &namer, &[]).unwrap();
        api.registry.complete_user_definition();
        crate::derive::sort_orders::derive(&mut api.registry, &namer).unwrap();
        crate::derive::filters::derive(&mut api.registry, &names, &namer).unwrap();
        crate::derive::aggregations::derive(&mut api.registry, &names, &namer).unwrap();
        derive(&mut api.registry, &names, &namer).unwrap();
        api.registry
    }

    #[test]
    fn generates_edges_and_connections_for_documents_and_aggregations() {
        let registry = derived_registry(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        let edge = registry.type_named("WidgetEdge").unwrap().as_object().unwrap();
        assert_eq!(edge.fields["node"].ty.to_string(), "Widget");
        assert_eq!(edge.fields["cursor"].ty.to_string(), "Cursor");

        let connection = registry
            .type_named("WidgetConnection")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(connection.fields["edges"].ty.to_string(), "[WidgetEdge!]!");
        assert_eq!(connection.fields["nodes"].ty.to_string(), "[Widget!]!");
        assert!(connection.fields.contains_key("total_edge_count"));

        let aggregation_connection = registry
            .type_named("WidgetAggregationConnection")
            .unwrap()
            .as_object()
            .unwrap();
        assert!(!aggregation_connection.fields.contains_key("total_edge_count"));
    }

    #[test]
    fn relates_to_many_fields_become_connections_with_arguments() {
        let registry = derived_registry(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.relates_to_many("components", "Component", "widget_id", ForeignKeyDirection::In)?;
                t.index("widgets")?;
                Ok(())
            })?;
            api.object_type("Component", |t| {
                t.field("id", "ID!")?;
                t.index("components")?;
                Ok(())
            })
        });
        let widget = registry.type_named("Widget").unwrap().as_object().unwrap();
        let components = &widget.fields["components"];
        assert_eq!(components.ty.to_string(), "ComponentConnection");
        let arg_names: Vec<&str> = components.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            arg_names,
            ["filter", "order_by", "first", "after", "last", "before"]
        );
    }
}
