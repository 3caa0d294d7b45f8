//! ElasticGraph schema compiler: derives the full set of artifacts required
//! to operate a GraphQL-over-a-search-datastore service from a single
//! declarative schema definition.
//!
//! The compiler is a pure compile step: the [`define_schema`] entry point
//! runs the user's definition closure against a [`SchemaDefinition`] builder,
//! derives every mechanical type (filter inputs, aggregations,
//! sub-aggregations, sort orders, Relay pagination), and emits:
//!
//! - the canonical GraphQL SDL,
//! - the public and versioned JSON schemas for event ingestion,
//! - the datastore index/template configuration and update scripts,
//! - the runtime metadata bundle.
//!
//! ```
//! use elasticgraph_schema::{define_schema, SchemaConfig};
//!
//! let artifacts = define_schema(SchemaConfig::default(), |schema| {
//!     schema.json_schema_version(1)?;
//!     schema.object_type("Widget", |t| {
//!         t.field("id", "ID!")?;
//!         t.index("widgets")?;
//!         Ok(())
//!     })
//! })
//! .unwrap();
//! assert!(artifacts.graphql_schema.contains("type Widget"));
//! ```

pub mod config;
mod derive;
pub mod emit;
pub mod error;
mod evolution;
pub mod extension;
pub mod schema;

pub use crate::config::{NameForm, SchemaConfig, SchemaElementNamesConfig};
pub use crate::emit::SchemaArtifacts;
pub use crate::error::{SchemaError, SchemaErrors, SchemaWarning, SourceLocation};
pub use crate::extension::SchemaDefinitionExtension;
pub use crate::schema::builder::SchemaDefinition;
pub use crate::schema::definitions::{ForeignKeyDirection, RolloverGranularity, SortDirection};

use std::cell::Cell;

thread_local! {
    static DEFINING: Cell<bool> = const { Cell::new(false) };
}

/// Scoped acquisition of the process-wide "a schema definition is active"
/// slot. Released on every exit path; nested acquisition is an error.
struct ActiveDefinitionGuard;

impl ActiveDefinitionGuard {
    fn acquire() -> Result<Self, SchemaError> {
        DEFINING.with(|defining| {
            if defining.get() {
                Err(SchemaError::NestedSchemaDefinition)
            } else {
                defining.set(true);
                Ok(Self)
            }
        })
    }
}

impl Drop for ActiveDefinitionGuard {
    fn drop(&mut self) {
        DEFINING.with(|defining| defining.set(false));
    }
}

/// Compiles a schema definition into its artifacts.
///
/// The `definition` closure registers types, indices, relationships and
/// deprecations through the [`SchemaDefinition`] it receives. After it
/// returns, built-in types register, the derivation engine materializes all
/// derived types, and the emitters produce the artifacts. All validation
/// failures are reported as a [`SchemaErrors`] batch.
pub fn define_schema(
    config: SchemaConfig,
    definition: impl FnOnce(&mut SchemaDefinition) -> Result<(), SchemaError>,
) -> Result<SchemaArtifacts, SchemaErrors> {
    let _guard = ActiveDefinitionGuard::acquire()?;

    let mut api = SchemaDefinition::new(config)?;

    let extensions = api.config.extension_modules.clone();
    for extension in &extensions {
        extension.setup(&mut api)?;
    }

    definition(&mut api)?;

    let built_in_callbacks = std::mem::take(&mut api.on_built_in_type_callbacks);
    crate::schema::built_ins::register_built_ins(
        &mut api.registry,
        &api.names,
        &api.namer,
        &built_in_callbacks,
    )?;

    if api.registry.json_schema_version.is_none() {
        return Err(SchemaError::JsonSchemaVersionUnset.into());
    }

    api.registry.complete_user_definition();

    let mut warnings = Vec::new();
    derive::run(&mut api, &mut warnings)?;

    let (graphql_schema, sdl_type_names) = emit::graphql_sdl::emit(&api.registry)?;
    let (current_versioned, public_json_schema) =
        emit::json_schema::emit(&api.registry, &api.config)?;
    let datastore_config = emit::datastore_config::emit(&api.registry, &api.config)?;
    let runtime_metadata =
        emit::runtime_metadata::emit(&api.registry, &api.config, &sdl_type_names)?;

    let mut versioned_json_schemas = evolution::merge_prior_versions(
        &api.registry,
        &api.config.prior_versioned_json_schemas,
        &mut warnings,
    )?;
    versioned_json_schemas.push(current_versioned);

    evolution::check_version_bump(&api.config, &api.registry, &public_json_schema, &mut warnings)?;

    for warning in &warnings {
        tracing::warn!(target: "elasticgraph_schema", "{warning}");
    }

    Ok(SchemaArtifacts {
        graphql_schema,
        public_json_schema,
        versioned_json_schemas,
        datastore_config,
        runtime_metadata,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_definitions_are_rejected_and_the_slot_is_released() {
        let result = define_schema(SchemaConfig::default(), |outer| {
            outer.json_schema_version(1)?;
            let nested = define_schema(SchemaConfig::default(), |_| Ok(()));
            match nested {
                Err(errors)
                    if matches!(
                        errors.errors()[0],
                        SchemaError::NestedSchemaDefinition
                    ) =>
                {
                    Ok(())
                }
                _ => Err(SchemaError::Internal {
                    message: "nested definition was not rejected".to_owned(),
                }),
            }
        });
        assert!(result.is_ok());

        // The slot is released after the outer call finishes.
        let again = define_schema(SchemaConfig::default(), |schema| {
            schema.json_schema_version(1)
        });
        assert!(again.is_ok());
    }

    #[test]
    fn missing_json_schema_version_fails() {
        let result = define_schema(SchemaConfig::default(), |_| Ok(()));
        assert!(matches!(
            result.unwrap_err().errors()[0],
            SchemaError::JsonSchemaVersionUnset
        ));
    }
}
