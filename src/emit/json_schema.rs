use crate::config::SchemaConfig;
use crate::error::{SchemaError, SchemaErrors};
use crate::schema::definitions::{FieldDef, TypeDef};
use crate::schema::registry::{SchemaRegistry, EVENT_ENVELOPE_TYPE_NAME};
use crate::schema::type_ref::TypeRef;
use indexmap::IndexSet;
use serde_json::{json, Map, Value as Json};

pub(crate) const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Emits the versioned internal JSON schema (with per-field `ElasticGraph`
/// metadata) and the public one (metadata stripped, `$defs` pruned to the
/// closure reachable from the envelope).
pub(crate) fn emit(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
) -> Result<(Json, Json), SchemaErrors> {
    let Some((version, _)) = registry.json_schema_version else {
        return Err(SchemaError::JsonSchemaVersionUnset.into());
    };

    let forced_non_null = forced_non_null_fields(registry);
    let routing_leaves = routing_leaf_fields(registry);

    let mut defs = Map::new();
    defs.insert(
        EVENT_ENVELOPE_TYPE_NAME.to_owned(),
        envelope_definition(registry, config, version),
    );

    let mut type_names: Vec<&str> = registry
        .types()
        .values()
        .filter(|type_def| included_in_json_schema(type_def))
        .map(|type_def| type_def.name())
        .collect();
    type_names.sort_unstable();

    for type_name in type_names {
        let type_def = registry
            .type_named(type_name)
            .expect("names come from the registry");
        defs.insert(
            type_name.to_owned(),
            type_definition(registry, config, type_def, &forced_non_null, &routing_leaves),
        );
    }

    let versioned = json!({
        "$schema": JSON_SCHEMA_DRAFT,
        "json_schema_version": version,
        "$defs": defs,
    });

    let mut public = versioned.clone();
    strip_metadata(&mut public);
    prune_defs(&mut public, registry);

    Ok((versioned, public))
}

fn included_in_json_schema(type_def: &TypeDef) -> bool {
    if type_def.derived_from().is_some() {
        return false;
    }
    match type_def {
        TypeDef::Scalar(scalar) => scalar.name != "Cursor",
        TypeDef::Enum(_) | TypeDef::Union(_) | TypeDef::Interface(_) => true,
        TypeDef::Object(object) => !object.graphql_only,
        TypeDef::Input(_) => false,
    }
}

/// `(type name, field name)` pairs forced non-null because an index uses
/// them for rollover or routing.
fn forced_non_null_fields(registry: &SchemaRegistry) -> IndexSet<(String, String)> {
    let mut forced = IndexSet::new();
    for type_def in registry.types().values() {
        let index = match type_def {
            TypeDef::Object(object) => object.index.as_ref(),
            TypeDef::Interface(interface) => interface.index.as_ref(),
            _ => None,
        };
        let Some(index) = index else { continue };
        let mut paths = Vec::new();
        if let Some(rollover) = &index.rollover {
            paths.push(rollover.timestamp_field_path.clone());
        }
        if let Some(route_with) = &index.route_with {
            paths.push(route_with.clone());
        }
        for path in paths {
            for start in index_document_type_names(registry, type_def) {
                let mut current = start;
                for segment in path.split('.') {
                    forced.insert((current.clone(), segment.to_owned()));
                    if let Some(field) = registry
                        .type_named(&current)
                        .and_then(TypeDef::fields)
                        .and_then(|fields| fields.get(segment))
                    {
                        current = field.ty.fully_unwrapped().to_owned();
                    }
                }
            }
        }
    }
    forced
}

/// The types whose documents land in a type's index: the type itself and,
/// for an indexed interface, every implementer.
fn index_document_type_names(registry: &SchemaRegistry, type_def: &TypeDef) -> Vec<String> {
    let mut names = vec![type_def.name().to_owned()];
    if let TypeDef::Interface(interface) = type_def {
        names.extend(
            registry
                .types()
                .values()
                .filter_map(|candidate| candidate.as_object())
                .filter(|object| object.implements.contains(&interface.name))
                .map(|object| object.name.clone()),
        );
    }
    names
}

/// Leaf fields of shard-routing paths; string-typed ones must be non-blank.
fn routing_leaf_fields(registry: &SchemaRegistry) -> IndexSet<(String, String)> {
    let mut leaves = IndexSet::new();
    for type_def in registry.types().values() {
        let index = match type_def {
            TypeDef::Object(object) => object.index.as_ref(),
            TypeDef::Interface(interface) => interface.index.as_ref(),
            _ => None,
        };
        let Some(route_with) = index.and_then(|i| i.route_with.as_ref()) else {
            continue;
        };
        for start in index_document_type_names(registry, type_def) {
            let mut current = start;
            let segments: Vec<&str> = route_with.split('.').collect();
            for (position, segment) in segments.iter().enumerate() {
                if position + 1 == segments.len() {
                    leaves.insert((current.clone(), (*segment).to_owned()));
                } else if let Some(field) = registry
                    .type_named(&current)
                    .and_then(TypeDef::fields)
                    .and_then(|fields| fields.get(*segment))
                {
                    current = field.ty.fully_unwrapped().to_owned();
                }
            }
        }
    }
    leaves
}

fn envelope_definition(registry: &SchemaRegistry, config: &SchemaConfig, version: u32) -> Json {
    let mut properties = Map::new();
    properties.insert("op".to_owned(), json!({"type": "string", "enum": ["upsert"]}));
    properties.insert(
        "type".to_owned(),
        json!({"type": "string", "enum": registry.indexable_concrete_type_names()}),
    );
    properties.insert(
        "id".to_owned(),
        json!({"type": "string", "maxLength": config.max_keyword_string_length}),
    );
    properties.insert(
        "version".to_owned(),
        json!({"type": "integer", "minimum": 0, "maximum": i64::MAX}),
    );
    properties.insert("record".to_owned(), json!({"type": "object"}));
    properties.insert(
        "latency_timestamps".to_owned(),
        json!({
            "type": "object",
            "additionalProperties": false,
            "patternProperties": {"^\\w+_at$": {"type": "string", "format": "date-time"}},
        }),
    );
    properties.insert(
        "json_schema_version".to_owned(),
        json!({"const": version}),
    );
    properties.insert("message_id".to_owned(), json!({"type": "string"}));

    json!({
        "type": "object",
        "properties": properties,
        "required": ["op", "type", "id", "version", "record"],
    })
}

fn type_definition(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
    type_def: &TypeDef,
    forced_non_null: &IndexSet<(String, String)>,
    routing_leaves: &IndexSet<(String, String)>,
) -> Json {
    match type_def {
        TypeDef::Scalar(scalar) => scalar.json_schema.clone(),
        TypeDef::Enum(enum_def) => {
            let values: Vec<&str> = enum_def.values.keys().map(String::as_str).collect();
            json!({"type": "string", "enum": values})
        }
        TypeDef::Union(union_def) => {
            let refs: Vec<Json> = union_def
                .members
                .iter()
                .map(|member| json!({"$ref": format!("#/$defs/{member}")}))
                .collect();
            json!({"required": ["__typename"], "oneOf": refs})
        }
        TypeDef::Interface(interface) => {
            let implementers: Vec<Json> = registry
                .types()
                .values()
                .filter_map(|candidate| candidate.as_object())
                .filter(|object| object.implements.contains(&interface.name))
                .map(|object| json!({"$ref": format!("#/$defs/{}", object.name)}))
                .collect();
            json!({"required": ["__typename"], "oneOf": implementers})
        }
        TypeDef::Object(object) => {
            let mut properties = Map::new();
            let mut typename_schema = json!({
                "type": "string",
                "const": object.name,
                "default": object.name,
            });
            attach_metadata(&mut typename_schema, "String!", "__typename");
            properties.insert("__typename".to_owned(), typename_schema);

            let mut required = Vec::new();
            if registry.is_indexed(&object.name) {
                required.push(Json::String("__typename".to_owned()));
            }

            for field in object.fields.values() {
                if !field.accepts_event_value() {
                    continue;
                }
                let force = forced_non_null.contains(&(object.name.clone(), field.name.clone()));
                let non_blank =
                    routing_leaves.contains(&(object.name.clone(), field.name.clone()));
                let mut schema = field_schema(registry, config, field, force, non_blank);
                attach_metadata(&mut schema, &field.ty.to_string(), &field.name_in_index);
                properties.insert(field.name.clone(), schema);
                required.push(Json::String(field.name.clone()));
            }

            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
        TypeDef::Input(_) => json!({}),
    }
}

fn field_schema(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
    field: &FieldDef,
    force_non_null: bool,
    force_non_blank: bool,
) -> Json {
    let extras = field_constraints(registry, config, field, force_non_blank);
    type_ref_schema(&field.ty, &extras, force_non_null)
}

/// Converts a (possibly wrapped) type reference to its JSON schema,
/// attaching per-field constraints at the innermost named position.
fn type_ref_schema(ty: &TypeRef, extras: &Map<String, Json>, force_non_null: bool) -> Json {
    match ty {
        TypeRef::NonNull(inner) => non_null_schema(inner, extras),
        _ if force_non_null => non_null_schema(ty, extras),
        TypeRef::Named(_) | TypeRef::List(_) => {
            let base = non_null_schema(ty, extras);
            json!({"anyOf": [base, {"type": "null"}]})
        }
    }
}

fn non_null_schema(ty: &TypeRef, extras: &Map<String, Json>) -> Json {
    match ty {
        TypeRef::NonNull(inner) => non_null_schema(inner, extras),
        TypeRef::List(element) => {
            json!({"type": "array", "items": type_ref_schema(element, extras, false)})
        }
        TypeRef::Named(name) => {
            let reference = json!({"$ref": format!("#/$defs/{name}")});
            if extras.is_empty() {
                reference
            } else {
                json!({"allOf": [reference, extras]})
            }
        }
    }
}

fn field_constraints(
    registry: &SchemaRegistry,
    config: &SchemaConfig,
    field: &FieldDef,
    force_non_blank: bool,
) -> Map<String, Json> {
    let mut extras = Map::new();

    let mapping = crate::derive::mapping_type(registry, field);
    let string_typed = matches!(
        registry.type_named(field.ty.fully_unwrapped()),
        Some(TypeDef::Scalar(scalar))
            if scalar.json_schema.get("type") == Some(&json!("string"))
                && !scalar.json_schema.as_object().is_some_and(|s| s.contains_key("maxLength"))
                && !scalar.json_schema.as_object().is_some_and(|s| s.contains_key("format"))
                && !scalar.json_schema.as_object().is_some_and(|s| s.contains_key("pattern"))
    );
    if string_typed && !field.json_schema_options.contains_key("maxLength") {
        let limit = if mapping == "text" {
            config.max_text_string_length
        } else {
            config.max_keyword_string_length
        };
        extras.insert("maxLength".to_owned(), json!(limit));
    }
    if force_non_blank && string_typed {
        extras
            .entry("pattern".to_owned())
            .or_insert_with(|| json!("\\S+"));
    }

    for (key, value) in &field.json_schema_options {
        if key == "type" {
            continue;
        }
        extras.insert(key.clone(), value.clone());
    }
    extras
}

fn attach_metadata(schema: &mut Json, graphql_type: &str, name_in_index: &str) {
    if let Some(object) = schema.as_object_mut() {
        object.insert(
            "ElasticGraph".to_owned(),
            json!({"type": graphql_type, "nameInIndex": name_in_index}),
        );
    }
}

/// Removes the internal `ElasticGraph` metadata objects, recursively.
pub(crate) fn strip_metadata(value: &mut Json) {
    match value {
        Json::Object(map) => {
            map.remove("ElasticGraph");
            for entry in map.values_mut() {
                strip_metadata(entry);
            }
        }
        Json::Array(items) => {
            for item in items {
                strip_metadata(item);
            }
        }
        _ => {}
    }
}

/// Prunes `$defs` to the closure reachable from the envelope and the
/// indexable type definitions.
fn prune_defs(document: &mut Json, registry: &SchemaRegistry) {
    let Some(defs) = document.get("$defs").and_then(Json::as_object) else {
        return;
    };

    let mut reachable: IndexSet<String> = IndexSet::new();
    let mut queue: Vec<String> = vec![EVENT_ENVELOPE_TYPE_NAME.to_owned()];
    queue.extend(registry.indexable_concrete_type_names());

    while let Some(name) = queue.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(definition) = defs.get(&name) {
            collect_refs(definition, &mut queue);
        }
    }

    if let Some(defs) = document.get_mut("$defs").and_then(Json::as_object_mut) {
        defs.retain(|name, _| reachable.contains(name));
    }
}

fn collect_refs(value: &Json, out: &mut Vec<String>) {
    match value {
        Json::Object(map) => {
            if let Some(Json::String(reference)) = map.get("$ref") {
                if let Some(name) = reference.strip_prefix("#/$defs/") {
                    out.push(name.to_owned());
                }
            }
            for entry in map.values() {
                collect_refs(entry, out);
            }
        }
        Json::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        _ => {}
    }
}
