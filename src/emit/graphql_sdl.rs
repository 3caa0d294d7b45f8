use crate::error::{SchemaError, SchemaErrors};
use crate::schema::built_ins::STANDARD_GRAPHQL_SCALARS;
use crate::schema::definitions::{
    json_to_graphql_literal, DirectiveApplication, FieldDef, InputFieldDef, TypeDef,
};
use crate::schema::registry::SchemaRegistry;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Schema;
use indexmap::IndexSet;
use itertools::Itertools;
use std::fmt::Write;

/// Renders the registry to canonical SDL: deterministic ordering, docs as
/// `"""` blocks, raw SDL fragments appended, then round-tripped through the
/// GraphQL parser to prune orphan types and normalize formatting.
///
/// Returns the SDL string and the set of type names that survived pruning.
pub(crate) fn emit(registry: &SchemaRegistry) -> Result<(String, IndexSet<String>), SchemaErrors> {
    let rendered = render(registry);

    let schema = Schema::parse(&rendered, "schema.graphql").map_err(|with_errors| {
        SchemaErrors::from(SchemaError::GraphQLParse {
            message: with_errors.to_string(),
        })
    })?;

    let mut schema = schema;
    let has_query = schema.types.contains_key("Query");
    if has_query {
        prune_unreachable_types(&mut schema);
        let valid = schema.validate().map_err(|with_errors| {
            SchemaErrors::from(SchemaError::GraphQLValidation {
                message: with_errors.to_string(),
            })
        })?;
        let type_names = valid
            .types
            .keys()
            .map(|name| name.to_string())
            .collect::<IndexSet<_>>();
        Ok((strip_trailing_whitespace(&valid.to_string()), type_names))
    } else {
        // Nothing is queryable; a fieldless `Query` cannot validate, so the
        // (typically empty) schema is normalized by parse alone.
        let type_names = schema
            .types
            .keys()
            .map(|name| name.to_string())
            .collect::<IndexSet<_>>();
        Ok((strip_trailing_whitespace(&schema.to_string()), type_names))
    }
}

fn render(registry: &SchemaRegistry) -> String {
    let mut out = String::new();

    if uses_tag_directive(registry) {
        out.push_str(
            "directive @tag(name: String!) repeatable on FIELD_DEFINITION | OBJECT | \
             INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | \
             INPUT_OBJECT | INPUT_FIELD_DEFINITION\n\n",
        );
    }

    let mut names: Vec<&str> = registry
        .types()
        .keys()
        .map(String::as_str)
        .filter(|name| !STANDARD_GRAPHQL_SCALARS.contains(name))
        .collect();
    names.sort_unstable();
    // `Query` leads; everything else is alphabetical.
    let ordered = names
        .iter()
        .copied()
        .filter(|name| *name == "Query")
        .chain(names.iter().copied().filter(|name| *name != "Query"));

    for name in ordered {
        let Some(type_def) = registry.type_named(name) else {
            continue;
        };
        render_type(&mut out, registry, type_def);
        out.push('\n');
    }

    for fragment in &registry.raw_sdl_fragments {
        out.push_str(fragment);
        if !fragment.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    strip_trailing_whitespace(&out)
}

fn uses_tag_directive(registry: &SchemaRegistry) -> bool {
    registry.types().values().any(|type_def| {
        type_def.directives().iter().any(|d| d.name == "tag")
            || type_def.fields().is_some_and(|fields| {
                fields
                    .values()
                    .any(|f| f.directives.iter().any(|d| d.name == "tag"))
            })
            || type_def.as_enum().is_some_and(|e| {
                e.values
                    .values()
                    .any(|v| v.directives.iter().any(|d| d.name == "tag"))
            })
    })
}

fn render_type(out: &mut String, registry: &SchemaRegistry, type_def: &TypeDef) {
    match type_def {
        TypeDef::Object(object) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "type {}", object.name).expect("writing to String cannot fail");
            if !object.implements.is_empty() {
                write!(out, " implements {}", object.implements.iter().join(" & "))
                    .expect("writing to String cannot fail");
            }
            render_directives(out, &object.directives);
            render_field_block(out, registry, object.fields.values());
        }
        TypeDef::Interface(interface) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "interface {}", interface.name).expect("writing to String cannot fail");
            render_directives(out, &interface.directives);
            render_field_block(out, registry, interface.fields.values());
        }
        TypeDef::Union(union_def) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "union {}", union_def.name).expect("writing to String cannot fail");
            render_directives(out, &union_def.directives);
            write!(out, " = {}\n", union_def.members.iter().join(" | "))
                .expect("writing to String cannot fail");
        }
        TypeDef::Enum(enum_def) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "enum {}", enum_def.name).expect("writing to String cannot fail");
            render_directives(out, &enum_def.directives);
            out.push_str(" {\n");
            for value in enum_def.values.values() {
                render_docs(out, value.documentation.as_deref(), 2);
                out.push_str("  ");
                out.push_str(&value.name);
                render_directives(out, &value.directives);
                out.push('\n');
            }
            out.push_str("}\n");
        }
        TypeDef::Scalar(scalar) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "scalar {}", scalar.name).expect("writing to String cannot fail");
            render_directives(out, &scalar.directives);
            out.push('\n');
        }
        TypeDef::Input(input) => {
            render_docs(out, type_def.documentation(), 0);
            write!(out, "input {}", input.name).expect("writing to String cannot fail");
            render_directives(out, &input.directives);
            out.push_str(" {\n");
            for field in input.fields.values() {
                render_docs(out, field.documentation.as_deref(), 2);
                out.push_str("  ");
                render_input_value(out, registry, field);
                out.push('\n');
            }
            out.push_str("}\n");
        }
    }
}

/// An empty `{}` block does not parse, so types whose fields are all
/// indexing-only are rendered without a body (and flagged by validation).
fn render_field_block<'a>(
    out: &mut String,
    registry: &SchemaRegistry,
    fields: impl Iterator<Item = &'a FieldDef> + Clone,
) {
    if fields.clone().all(|field| field.indexing_only) {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");
    for field in fields {
        render_field(out, registry, field);
    }
    out.push_str("}\n");
}

fn render_field(out: &mut String, registry: &SchemaRegistry, field: &FieldDef) {
    if field.indexing_only {
        return;
    }
    render_docs(out, field.documentation.as_deref(), 2);
    out.push_str("  ");
    out.push_str(&field.name);
    if !field.args.is_empty() {
        out.push('(');
        for (position, arg) in field.args.iter().enumerate() {
            if position > 0 {
                out.push_str(", ");
            }
            render_input_value(out, registry, arg);
        }
        out.push(')');
    }
    write!(out, ": {}", field.ty).expect("writing to String cannot fail");
    render_directives(out, &field.directives);
    out.push('\n');
}

fn render_input_value(out: &mut String, registry: &SchemaRegistry, input: &InputFieldDef) {
    write!(out, "{}: {}", input.name, input.ty).expect("writing to String cannot fail");
    if let Some(default) = &input.default_value {
        let rendered = match (default, registry.type_named(input.ty.fully_unwrapped())) {
            // Enum defaults are bare names, not quoted strings.
            (serde_json::Value::String(name), Some(TypeDef::Enum(_))) => name.clone(),
            _ => json_to_graphql_literal(default),
        };
        write!(out, " = {rendered}").expect("writing to String cannot fail");
    }
}

fn render_directives(out: &mut String, directives: &[DirectiveApplication]) {
    for directive in directives {
        out.push(' ');
        out.push_str(&directive.to_sdl());
    }
}

fn render_docs(out: &mut String, docs: Option<&str>, indent: usize) {
    let Some(docs) = docs else {
        return;
    };
    let pad = " ".repeat(indent);
    let escaped = docs.replace("\"\"\"", "\\\"\"\"");
    writeln!(out, "{pad}\"\"\"").expect("writing to String cannot fail");
    for line in escaped.lines() {
        writeln!(out, "{pad}{line}").expect("writing to String cannot fail");
    }
    writeln!(out, "{pad}\"\"\"").expect("writing to String cannot fail");
}

/// Removes every type not reachable from `Query` or from a retained
/// directive definition. Derived types are generated exhaustively, so the
/// unreferenced remainder is dropped here.
fn prune_unreachable_types(schema: &mut Schema) {
    let mut reachable: IndexSet<String> = IndexSet::new();
    let mut queue: Vec<String> = vec!["Query".to_owned()];

    for definition in schema.directive_definitions.values() {
        for argument in &definition.arguments {
            queue.push(argument.ty.inner_named_type().to_string());
        }
    }

    while let Some(name) = queue.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let Some(type_def) = schema.types.get(name.as_str()) else {
            continue;
        };
        match type_def {
            ExtendedType::Object(object) => {
                for interface in &object.implements_interfaces {
                    queue.push(interface.to_string());
                }
                for field in object.fields.values() {
                    queue.push(field.ty.inner_named_type().to_string());
                    for argument in &field.arguments {
                        queue.push(argument.ty.inner_named_type().to_string());
                    }
                }
            }
            ExtendedType::Interface(interface) => {
                for field in interface.fields.values() {
                    queue.push(field.ty.inner_named_type().to_string());
                    for argument in &field.arguments {
                        queue.push(argument.ty.inner_named_type().to_string());
                    }
                }
                // Implementations must survive when their interface does.
                for (name, candidate) in &schema.types {
                    if let ExtendedType::Object(object) = candidate {
                        if object
                            .implements_interfaces
                            .iter()
                            .any(|i| i.as_str() == interface.name.as_str())
                        {
                            queue.push(name.to_string());
                        }
                    }
                }
            }
            ExtendedType::Union(union_def) => {
                for member in &union_def.members {
                    queue.push(member.to_string());
                }
            }
            ExtendedType::InputObject(input) => {
                for field in input.fields.values() {
                    queue.push(field.ty.inner_named_type().to_string());
                }
            }
            ExtendedType::Enum(_) | ExtendedType::Scalar(_) => {}
        }
    }

    let to_remove: Vec<apollo_compiler::schema::Name> = schema
        .types
        .iter()
        .filter(|(name, type_def)| {
            !reachable.contains(name.as_str()) && !type_def.is_built_in()
        })
        .map(|(name, _)| name.clone())
        .collect();
    for name in to_remove {
        schema.types.shift_remove(&name);
    }
}

fn strip_trailing_whitespace(text: &str) -> String {
    let mut result = text.lines().map(str::trim_end).join("\n");
    if text.ends_with('\n') {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::builder::SchemaDefinition;

    fn emitted(
        f: impl FnOnce(&mut SchemaDefinition) -> Result<(), SchemaError>,
    ) -> (String, IndexSet<String>) {
        let config = SchemaConfig::default();
        let mut api = SchemaDefinition::new(config).unwrap();
        f(&mut api).unwrap();
        let names = api.names.clone();
        let namer = crate::schema::namer::Namer::new(&api.config);
        crate::schema::built_ins::register_built_ins(&mut api.registry, &names, &namer, &[])
            .unwrap();
        api.registry.complete_user_definition();
        let mut warnings = Vec::new();
        // Run the full derivation so the SDL is complete and valid.
        let mut api2 = api;
        crate::derive::run(&mut api2, &mut warnings).unwrap();
        emit(&api2.registry).unwrap()
    }

    #[test]
    fn emits_a_parseable_schema_with_query_first() {
        let (sdl, type_names) = emitted(|api| {
            api.object_type("Widget", |t| {
                t.documentation("A widget.");
                t.field("id", "ID!")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        assert!(sdl.contains("type Query"));
        assert!(sdl.contains("type Widget"));
        assert!(type_names.contains("WidgetConnection"));
        let reparsed = Schema::parse_and_validate(&sdl, "roundtrip.graphql").unwrap();
        assert_eq!(strip_trailing_whitespace(&reparsed.to_string()), sdl);
    }

    #[test]
    fn prunes_unreferenced_derived_types() {
        let (sdl, type_names) = emitted(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.index("widgets")?;
                Ok(())
            })
        });
        // Boolean has no list field anywhere, so its list filters are orphans.
        assert!(!type_names.contains("BooleanListFilterInput"));
        assert!(!sdl.contains("BooleanListFilterInput"));
    }

    #[test]
    fn strips_trailing_whitespace() {
        assert_eq!(strip_trailing_whitespace("a  \nb\t\n"), "a\nb\n");
    }

    #[test]
    fn indexing_only_fields_are_not_rendered() {
        let (sdl, _) = emitted(|api| {
            api.object_type("Widget", |t| {
                t.field("id", "ID!")?;
                t.field("secret", "String")?.indexing_only();
                t.index("widgets")?;
                Ok(())
            })
        });
        assert!(!sdl.contains("secret"));
    }
}
