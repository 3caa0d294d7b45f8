use std::fmt::{Display, Formatter, Write};
use std::panic::Location;

/// A position in the user's schema definition source, captured via
/// `#[track_caller]` on the registering builder operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{}:{}", file, line)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

/// The single error kind surfaced by the schema compiler. Every variant
/// message names the offending element and, where it helps, the remedy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate definition of type `{name}`. Each type name can be defined only once.")]
    DuplicateTypeName { name: String },

    #[error("`{name}` is a reserved type name and cannot be user-defined.")]
    ReservedTypeName { name: String },

    #[error("`{name}` is not a valid GraphQL name. Names must match /^[A-Za-z_][A-Za-z0-9_]*$/.")]
    InvalidGraphQLName { name: String },

    #[error("`define_schema` cannot be called from within another `define_schema` block.")]
    NestedSchemaDefinition,

    #[error(
        "The schema contains a circular reference chain: {}. \
         Cycles are only allowed through `relates_to_one`/`relates_to_many` fields.",
        .cycle.join(" -> ")
    )]
    CircularTypeReferences { cycle: Vec<String> },

    #[error(
        "Unknown schema element name override `{name}`.{}",
        suggestion_suffix(.suggestion)
    )]
    UnknownElementNameOverride {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Duplicate definition of field `{type_name}.{field}`.")]
    DuplicateFieldName { type_name: String, field: String },

    #[error(
        "Multiple fields of `{type_name}` resolve to the same `name_in_index` of \
         `{name_in_index}`: {}. At most one of them may be indexed.",
        .fields.join(", ")
    )]
    DuplicateNameInIndex {
        type_name: String,
        name_in_index: String,
        fields: Vec<String>,
    },

    #[error("Index `{index}` on `{type_name}`: rollover timestamp field `{path}` {problem}.")]
    InvalidRolloverField {
        type_name: String,
        index: String,
        path: String,
        problem: String,
    },

    #[error("Index `{index}` on `{type_name}`: shard routing field `{path}` {problem}.")]
    InvalidRoutingField {
        type_name: String,
        index: String,
        path: String,
        problem: String,
    },

    #[error(
        "Invalid `json_schema` option `{key}` on `{type_name}.{field}`: {reason}. \
         Only standard JSON schema validation keywords are allowed."
    )]
    InvalidJsonSchemaOption {
        type_name: String,
        field: String,
        key: String,
        reason: String,
    },

    #[error(
        "`{type_name}.{field}` may not supply `ElasticGraph` metadata in its `json_schema` \
         options; that key is reserved for internally generated metadata."
    )]
    ReservedJsonSchemaMetadataKey { type_name: String, field: String },

    #[error(
        "Scalar `{name}` is a built-in type; its JSON schema `type` cannot be overridden \
         (attempted `{attempted}`)."
    )]
    BuiltInScalarJsonSchemaTypeOverride { name: String, attempted: String },

    #[error("Scalar `{name}` must define both a datastore mapping (`mapping type: ...`) and a `json_schema type: ...`.")]
    IncompleteScalarDefinition { name: String },

    #[error("`json_schema_version` has not been set. Set it to 1 when first defining your schema.")]
    JsonSchemaVersionUnset,

    #[error("`json_schema_version` must be a positive integer, got {value}.")]
    JsonSchemaVersionInvalid { value: i64 },

    #[error(
        "`json_schema_version` can only be set once (first set at {first}, set again at {second})."
    )]
    JsonSchemaVersionSetTwice {
        first: SourceLocation,
        second: SourceLocation,
    },

    #[error(
        "The JSON schema payload has changed since version {current} was dumped, but \
         `json_schema_version` was not incremented{}. Update it to {recommended}.",
        .location.map(|l| format!(" (set at {l})")).unwrap_or_default()
    )]
    JsonSchemaVersionNotIncremented {
        current: u32,
        recommended: u32,
        location: Option<SourceLocation>,
    },

    #[error(
        "`{type_name}.{field}` is `sourced_from` relationship `{relationship}`, but \
         `{type_name}` defines no such relationship. Define it with `relates_to_one`."
    )]
    UnresolvableRelationship {
        type_name: String,
        field: String,
        relationship: String,
    },

    #[error(
        "`{type_name}.{field}` is `sourced_from` `{relationship}.{path}`, but `{path}` \
         does not resolve to a field of `{related_type}`."
    )]
    UnresolvableSourcedFromPath {
        type_name: String,
        field: String,
        relationship: String,
        path: String,
        related_type: String,
    },

    #[error(
        "`{type_name}.{field}` uses relationship `{relationship}` which relates to \
         unindexed type `{related_type}`; `sourced_from` requires an indexed source type."
    )]
    SourcedFromUnindexedType {
        type_name: String,
        field: String,
        relationship: String,
        related_type: String,
    },

    #[error(
        "Relationship `{type_name}.{relationship}` declares foreign key `{foreign_key}` \
         of a kind conflicting with the field defined on `{other_type}`: {detail}."
    )]
    ForeignKeyConflict {
        type_name: String,
        relationship: String,
        foreign_key: String,
        other_type: String,
        detail: String,
    },

    #[error(
        "Derived field `{field}` on `{type_name}` collides with a user-defined field of \
         the same name."
    )]
    DerivedFieldCollision { type_name: String, field: String },

    #[error(
        "`customize_derived_types` on `{owner}` references `{name}`, which is not a \
         derived type of `{owner}`.{}",
        suggestion_suffix(.suggestion)
    )]
    UnknownDerivedType {
        owner: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error(
        "`customize_derived_type_fields` on `{owner}` references `{type_name}.{field}`, \
         which does not exist.{}",
        suggestion_suffix(.suggestion)
    )]
    UnknownDerivedTypeField {
        owner: String,
        type_name: String,
        field: String,
        suggestion: Option<String>,
    },

    #[error(
        "Sub-aggregations are not supported on union type `{union_type}`: the element \
         shape is ambiguous across members. Aggregate each member type instead."
    )]
    UnionSubAggregation { union_type: String },

    #[error(
        "JSON schema version {version} defines `{type_name}.{field}`, which does not exist \
         in the current schema. To resolve this, do one of the following: \
         (1) if the field was renamed, record it with `field.renamed_from(\"{field}\")`; \
         (2) if the field was deleted, record it with `type.deleted_field(\"{field}\")`; \
         (3) if the type itself was renamed or deleted, record that with \
         `type.renamed_from(\"...\")` or `schema.deleted_type(\"{type_name}\")`."
    )]
    UnresolvableHistoricalField {
        version: u32,
        type_name: String,
        field: String,
    },

    #[error(
        "JSON schema version {version} requires `{type_name}.{field}` (used as the \
         {purpose} of index `{index}`), but the current schema has no counterpart for it. \
         Mandatory index fields cannot be deleted while old events remain ingestible."
    )]
    MissingMandatoryHistoricalField {
        version: u32,
        type_name: String,
        field: String,
        index: String,
        purpose: String,
    },

    #[error(
        "Historical definitions of `{type_name}.{field}` resolve inconsistently across \
         JSON schema versions: {detail}."
    )]
    HistoricalDefinitionConflict {
        type_name: String,
        field: String,
        detail: String,
    },

    #[error("The emitted GraphQL SDL failed to parse: {message}")]
    GraphQLParse { message: String },

    #[error("The emitted GraphQL SDL failed validation: {message}")]
    GraphQLValidation { message: String },

    #[error(
        "Field `{type_name}.{field}` references type `{referenced}`, which is not defined."
    )]
    UnresolvableFieldType {
        type_name: String,
        field: String,
        referenced: String,
    },

    #[error("Invalid schema definition: {message}")]
    Definition { message: String },

    #[error("Internal schema compiler error: {message}. This is a bug in elasticgraph-schema.")]
    Internal { message: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(suggestion) => format!(" Did you mean `{suggestion}`?"),
        None => String::new(),
    }
}

/// A non-empty batch of `SchemaError`s. Passes that can discover multiple
/// independent problems (the `sourced_from` closure, the version merge)
/// report all of them at once.
#[derive(Debug, thiserror::Error)]
pub struct SchemaErrors {
    errors: Vec<SchemaError>,
}

impl SchemaErrors {
    pub fn new(errors: Vec<SchemaError>) -> Self {
        assert!(
            !errors.is_empty(),
            "cannot create an empty SchemaErrors batch"
        );
        Self { errors }
    }

    pub fn errors(&self) -> &[SchemaError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<SchemaError> {
        self.errors
    }
}

impl From<SchemaError> for SchemaErrors {
    fn from(error: SchemaError) -> Self {
        Self::new(vec![error])
    }
}

impl Display for SchemaErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "The following errors occurred:")?;
        for error in &self.errors {
            write!(f, "\n\n  - ")?;
            for c in error.to_string().chars() {
                if c == '\n' {
                    write!(f, "\n    ")?;
                } else {
                    f.write_char(c)?;
                }
            }
        }
        Ok(())
    }
}

/// Diagnostics that never abort compilation. They are emitted through
/// `tracing::warn!` as they are produced and collected on the artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    UnusedTypeNameOverride {
        name: String,
        suggestion: Option<String>,
    },
    UnusedEnumValueOverride {
        type_name: String,
        value: String,
        suggestion: Option<String>,
    },
    UnusedDeprecatedElement {
        name: String,
        defined_at: SourceLocation,
        defined_via: String,
    },
    InconsistentRelationship {
        type_name: String,
        relationship: String,
        detail: String,
    },
    LiteralCountField {
        type_name: String,
        field: String,
    },
    JsonSchemaVersionNotIncremented {
        current: u32,
        recommended: u32,
    },
}

impl Display for SchemaWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaWarning::UnusedTypeNameOverride { name, suggestion } => write!(
                f,
                "`type_name_overrides` has an override for `{name}`, which is not a type \
                 in your schema.{}",
                suggestion_suffix(suggestion)
            ),
            SchemaWarning::UnusedEnumValueOverride {
                type_name,
                value,
                suggestion,
            } => write!(
                f,
                "`enum_value_overrides_by_type` has an override for `{type_name}.{value}`, \
                 which is not an enum value in your schema.{}",
                suggestion_suffix(suggestion)
            ),
            SchemaWarning::UnusedDeprecatedElement {
                name,
                defined_at,
                defined_via,
            } => write!(
                f,
                "`{defined_via}` (at {defined_at}) refers to `{name}`, which matched no \
                 element of any dumped JSON schema version. It can be removed."
            ),
            SchemaWarning::InconsistentRelationship {
                type_name,
                relationship,
                detail,
            } => write!(
                f,
                "Relationship `{type_name}.{relationship}` is defined inconsistently with \
                 its inverse: {detail}."
            ),
            SchemaWarning::LiteralCountField { type_name, field } => write!(
                f,
                "`{type_name}.{field}` is named like the filter operator that counts list \
                 elements; filtering on the number of `{field}` values will not be possible \
                 because the user-defined field shadows it."
            ),
            SchemaWarning::JsonSchemaVersionNotIncremented {
                current,
                recommended,
            } => write!(
                f,
                "The JSON schema payload changed but `json_schema_version` stayed at \
                 {current}; version enforcement is disabled, so the artifact was dumped \
                 anyway. Consider updating the version to {recommended}."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_display_indents_multiline_messages() {
        let errors = SchemaErrors::new(vec![
            SchemaError::DuplicateTypeName {
                name: "Widget".to_owned(),
            },
            SchemaError::JsonSchemaVersionUnset,
        ]);
        let rendered = errors.to_string();
        assert!(rendered.starts_with("The following errors occurred:"));
        assert!(rendered.contains("\n\n  - Duplicate definition of type `Widget`"));
        assert!(rendered.contains("\n\n  - `json_schema_version` has not been set"));
    }

    #[test]
    fn suggestions_render_only_when_present() {
        let with = SchemaError::UnknownElementNameOverride {
            name: "equl_to_any_of".to_owned(),
            suggestion: Some("equal_to_any_of".to_owned()),
        };
        assert!(with.to_string().contains("Did you mean `equal_to_any_of`?"));

        let without = SchemaError::UnknownElementNameOverride {
            name: "bogus".to_owned(),
            suggestion: None,
        };
        assert!(!without.to_string().contains("Did you mean"));
    }
}
