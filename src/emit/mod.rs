//! Emitters: read the completed registry and produce the artifacts.

pub(crate) mod datastore_config;
pub(crate) mod graphql_sdl;
pub(crate) mod json_schema;
pub(crate) mod runtime_metadata;
pub mod scripts;

use crate::error::SchemaWarning;
use serde_json::Value as Json;

/// Everything the compiler produces from one schema definition.
#[derive(Debug)]
pub struct SchemaArtifacts {
    /// The canonical GraphQL SDL.
    pub graphql_schema: String,
    /// The current public JSON schema, pruned and free of internal metadata.
    pub public_json_schema: Json,
    /// Every versioned internal JSON schema: the merged historical versions
    /// (oldest first) followed by the current one.
    pub versioned_json_schemas: Vec<Json>,
    /// Datastore index/template configuration and scripts.
    pub datastore_config: Json,
    /// The runtime metadata bundle consumed by the query and indexing
    /// processes.
    pub runtime_metadata: Json,
    /// Diagnostics that did not abort compilation.
    pub warnings: Vec<SchemaWarning>,
}

impl SchemaArtifacts {
    /// The current versioned JSON schema (the last entry).
    pub fn current_versioned_json_schema(&self) -> &Json {
        self.versioned_json_schemas
            .last()
            .expect("artifacts always include the current versioned schema")
    }
}
