use crate::derive::{batch, is_leaf_type};
use crate::error::{SchemaError, SchemaErrors, SchemaWarning};
use crate::schema::definitions::{FieldDef, IndexDef, TypeDef};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::registry::SchemaRegistry;
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Structural validation of the completed user model: reference acyclicity,
/// index integrity, `name_in_index` uniqueness, field type resolvability,
/// JSON schema `type` override conflicts, and the literal `count` warning.
pub(crate) fn validate(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<(), SchemaErrors> {
    let mut errors = Vec::new();

    check_field_types_resolve(registry, &mut errors);
    check_acyclic(registry, &mut errors);
    check_indices(registry, &mut errors);
    check_name_in_index_uniqueness(registry, &mut errors);
    check_json_schema_type_overrides(registry, &mut errors);
    check_derived_indexed_types(registry, &mut errors);
    warn_on_literal_count_fields(registry, names, warnings);

    batch(errors)
}

fn composite_fields(registry: &SchemaRegistry) -> impl Iterator<Item = (&str, &FieldDef)> {
    registry.types().values().flat_map(|type_def| {
        type_def
            .fields()
            .into_iter()
            .flat_map(move |fields| fields.values().map(move |field| (type_def.name(), field)))
    })
}

fn check_field_types_resolve(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    for (type_name, field) in composite_fields(registry) {
        let referenced = field.ty.fully_unwrapped();
        if !registry.contains_type(referenced) {
            errors.push(SchemaError::UnresolvableFieldType {
                type_name: type_name.to_owned(),
                field: field.name.clone(),
                referenced: referenced.to_owned(),
            });
        }
    }
}

/// Rejects cycles in the reference graph, excluding relationship edges:
/// a document cannot embed itself.
fn check_acyclic(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: IndexMap<&str, NodeIndex> = IndexMap::new();
    for name in registry.type_names() {
        nodes.insert(name, graph.add_node(name.to_owned()));
    }
    for (type_name, field) in composite_fields(registry) {
        if field.relationship.is_some() {
            continue;
        }
        let referenced = field.ty.fully_unwrapped();
        if let (Some(&from), Some(&to)) = (nodes.get(type_name), nodes.get(referenced)) {
            graph.add_edge(from, to, ());
        }
    }

    for scc in tarjan_scc(&graph) {
        let cyclic = scc.len() > 1
            || (scc.len() == 1 && graph.contains_edge(scc[0], scc[0]));
        if cyclic {
            let mut cycle: Vec<String> = scc.iter().map(|node| graph[*node].clone()).collect();
            cycle.sort();
            let first = cycle[0].clone();
            cycle.push(first);
            errors.push(SchemaError::CircularTypeReferences { cycle });
        }
    }
}

fn check_indices(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    for type_def in registry.types().values() {
        let (name, fields, index) = match type_def {
            TypeDef::Object(object) => (&object.name, &object.fields, object.index.as_ref()),
            TypeDef::Interface(interface) => {
                (&interface.name, &interface.fields, interface.index.as_ref())
            }
            _ => continue,
        };
        let Some(index) = index else { continue };

        if let Some(rollover) = &index.rollover {
            check_index_field_path(
                registry,
                name,
                fields,
                index,
                &rollover.timestamp_field_path,
                FieldPathUse::RolloverTimestamp,
                errors,
            );
        }
        if let Some(route_with) = &index.route_with {
            check_index_field_path(
                registry,
                name,
                fields,
                index,
                route_with,
                FieldPathUse::Routing,
                errors,
            );
        }
    }
}

#[derive(Clone, Copy)]
enum FieldPathUse {
    RolloverTimestamp,
    Routing,
}

fn check_index_field_path(
    registry: &SchemaRegistry,
    type_name: &str,
    fields: &IndexMap<String, FieldDef>,
    index: &IndexDef,
    path: &str,
    field_use: FieldPathUse,
    errors: &mut Vec<SchemaError>,
) {
    let error = |problem: String| match field_use {
        FieldPathUse::RolloverTimestamp => SchemaError::InvalidRolloverField {
            type_name: type_name.to_owned(),
            index: index.name.clone(),
            path: path.to_owned(),
            problem,
        },
        FieldPathUse::Routing => SchemaError::InvalidRoutingField {
            type_name: type_name.to_owned(),
            index: index.name.clone(),
            path: path.to_owned(),
            problem,
        },
    };

    let first_segment = path.split('.').next().unwrap_or(path);
    match fields.get_index_of(first_segment) {
        None => {
            errors.push(error("does not resolve to a field".to_owned()));
            return;
        }
        Some(position) if position >= index.defined_after_field_count => {
            errors.push(error(
                "must be defined before the `index` declaration".to_owned(),
            ));
            return;
        }
        Some(_) => {}
    }

    let Some(chain) = registry.resolve_field_path(type_name, path) else {
        errors.push(error("does not resolve to a field".to_owned()));
        return;
    };
    let leaf = chain.last().expect("resolved path is never empty");

    if leaf.ty.is_list() {
        errors.push(error("must not be a list field".to_owned()));
        return;
    }
    match field_use {
        FieldPathUse::RolloverTimestamp => {
            let leaf_type = leaf.ty.fully_unwrapped();
            if leaf_type != "Date" && leaf_type != "DateTime" {
                errors.push(error(format!(
                    "must be a `Date` or `DateTime` field, but is `{}`",
                    leaf.ty
                )));
            }
        }
        FieldPathUse::Routing => {
            if !is_leaf_type(registry, leaf.ty.fully_unwrapped()) {
                errors.push(error(format!(
                    "must be a leaf field, but `{}` is an object type",
                    leaf.ty
                )));
            }
        }
    }
}

fn check_name_in_index_uniqueness(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    for type_def in registry.types().values() {
        let Some(fields) = type_def.fields() else {
            continue;
        };
        let mut by_name_in_index: IndexMap<&str, Vec<&FieldDef>> = IndexMap::new();
        for field in fields.values() {
            if field.relationship.is_none() && field.runtime_script.is_none() {
                by_name_in_index
                    .entry(field.name_in_index.as_str())
                    .or_default()
                    .push(field);
            }
        }
        for (name_in_index, colliders) in by_name_in_index {
            let indexed = colliders.iter().filter(|f| !f.graphql_only).count();
            if colliders.len() > 1 && indexed > 1 {
                errors.push(SchemaError::DuplicateNameInIndex {
                    type_name: type_def.name().to_owned(),
                    name_in_index: name_in_index.to_owned(),
                    fields: colliders.iter().map(|f| f.name.clone()).collect(),
                });
            }
        }
    }
}

fn check_json_schema_type_overrides(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    for (type_name, field) in composite_fields(registry) {
        let Some(overridden) = field.json_schema_options.get("type") else {
            continue;
        };
        if let Some(TypeDef::Scalar(scalar)) = registry.type_named(field.ty.fully_unwrapped()) {
            if scalar.built_in {
                errors.push(SchemaError::BuiltInScalarJsonSchemaTypeOverride {
                    name: format!("{type_name}.{}: {}", field.name, scalar.name),
                    attempted: overridden.to_string(),
                });
            }
        }
    }
}

fn check_derived_indexed_types(registry: &SchemaRegistry, errors: &mut Vec<SchemaError>) {
    for type_def in registry.types().values() {
        let Some(object) = type_def.as_object() else {
            continue;
        };
        for rule in &object.derived_indexed_types {
            match registry.type_named(&rule.destination_type) {
                None => errors.push(SchemaError::Definition {
                    message: format!(
                        "`{}` derives documents of `{}`, which is not a defined type",
                        object.name, rule.destination_type
                    ),
                }),
                Some(_) if !registry.is_indexed(&rule.destination_type) => {
                    errors.push(SchemaError::Definition {
                        message: format!(
                            "`{}` derives documents of `{}`, which has no index declaration",
                            object.name, rule.destination_type
                        ),
                    })
                }
                Some(_) => {}
            }
            if registry.resolve_field_path(&object.name, &rule.id_source).is_none() {
                errors.push(SchemaError::Definition {
                    message: format!(
                        "derived indexed type `{}`: id source `{}` does not resolve to a \
                         field of `{}`",
                        rule.destination_type, rule.id_source, object.name
                    ),
                });
            }
        }
    }
}

/// A user-defined field named like the injected list `count` filter operator
/// shadows that operator for list owners; advisory only.
fn warn_on_literal_count_fields(
    registry: &SchemaRegistry,
    names: &SchemaElementNames,
    warnings: &mut Vec<SchemaWarning>,
) {
    let count_name = names.of("count");
    for type_def in registry.types().values() {
        let Some(fields) = type_def.fields() else {
            continue;
        };
        if !fields.contains_key(&count_name) {
            continue;
        }
        let used_as_list_element = registry
            .field_references_to(type_def.name())
            .iter()
            .any(|(referencing_type, field_name)| {
                registry
                    .type_named(referencing_type)
                    .and_then(TypeDef::fields)
                    .and_then(|fields| fields.get(field_name))
                    .is_some_and(|field| field.ty.is_list())
            });
        if used_as_list_element {
            warnings.push(SchemaWarning::LiteralCountField {
                type_name: type_def.name().to_owned(),
                field: count_name.clone(),
            });
        }
    }
}
