use crate::error::SchemaError;
use crate::extension::SchemaDefinitionExtension;
use crate::schema::namer::DerivedTypeKind;
use indexmap::IndexMap;
use serde::Deserialize;
use std::sync::Arc;

/// Casing form applied to every generated schema element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum_macros::Display)]
pub enum NameForm {
    #[default]
    #[serde(rename = "snake_case")]
    #[strum(to_string = "snake_case")]
    SnakeCase,
    #[serde(rename = "camelCase")]
    #[strum(to_string = "camelCase")]
    CamelCase,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaElementNamesConfig {
    #[serde(default)]
    pub form: NameForm,
    /// Canonical element name -> replacement, applied after form conversion.
    #[serde(default)]
    pub overrides: IndexMap<String, String>,
}

/// Options accepted by the compiler entry point. Deserializable so that a
/// host application can load it from its own settings format.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub schema_element_names: SchemaElementNamesConfig,
    pub type_name_overrides: IndexMap<String, String>,
    pub enum_value_overrides_by_type: IndexMap<String, IndexMap<String, String>>,
    pub derived_type_name_formats: IndexMap<DerivedTypeKind, String>,
    pub index_document_sizes: bool,
    /// When `true` (the default), a changed JSON schema payload without a
    /// version bump aborts the dump. When `false` it becomes a warning.
    pub enforce_json_schema_version: bool,
    /// JSON schema `maxLength` applied to string fields stored under a
    /// `keyword` mapping.
    pub max_keyword_string_length: u32,
    /// JSON schema `maxLength` applied to string fields stored under a
    /// `text` mapping.
    pub max_text_string_length: u32,
    /// Previously dumped versioned JSON schemas, oldest first.
    pub prior_versioned_json_schemas: Vec<serde_json::Value>,
    /// The previously dumped public JSON schema, used by the version guard.
    pub prior_public_json_schema: Option<serde_json::Value>,
    /// Extensions applied before built-in type registration.
    #[serde(skip)]
    pub extension_modules: Vec<Arc<dyn SchemaDefinitionExtension>>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            schema_element_names: SchemaElementNamesConfig::default(),
            type_name_overrides: IndexMap::new(),
            enum_value_overrides_by_type: IndexMap::new(),
            derived_type_name_formats: IndexMap::new(),
            index_document_sizes: false,
            enforce_json_schema_version: true,
            max_keyword_string_length: 8191,
            max_text_string_length: 1_048_576,
            prior_versioned_json_schemas: Vec::new(),
            prior_public_json_schema: None,
            extension_modules: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SchemaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaConfig")
            .field("schema_element_names", &self.schema_element_names)
            .field("type_name_overrides", &self.type_name_overrides)
            .field(
                "enum_value_overrides_by_type",
                &self.enum_value_overrides_by_type,
            )
            .field("derived_type_name_formats", &self.derived_type_name_formats)
            .field("index_document_sizes", &self.index_document_sizes)
            .field(
                "enforce_json_schema_version",
                &self.enforce_json_schema_version,
            )
            .field("max_keyword_string_length", &self.max_keyword_string_length)
            .field("max_text_string_length", &self.max_text_string_length)
            .field(
                "extension_modules",
                &format_args!("[{} extension(s)]", self.extension_modules.len()),
            )
            .finish_non_exhaustive()
    }
}

impl SchemaConfig {
    /// Every derived type name format must contain the `{base}` placeholder;
    /// anything else would collapse all derived names onto one string.
    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        for (kind, format) in &self.derived_type_name_formats {
            if !format.contains("{base}") {
                return Err(SchemaError::Definition {
                    message: format!(
                        "`derived_type_name_formats` entry for `{kind}` (`{format}`) is \
                         missing the required `{{base}}` placeholder"
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enforce_versioning_and_use_snake_case() {
        let config = SchemaConfig::default();
        assert!(config.enforce_json_schema_version);
        assert_eq!(config.schema_element_names.form, NameForm::SnakeCase);
        assert_eq!(config.max_keyword_string_length, 8191);
    }

    #[test]
    fn deserializes_from_json() {
        let config: SchemaConfig = serde_json::from_value(serde_json::json!({
            "schema_element_names": {"form": "camelCase", "overrides": {"any_of": "anyOf"}},
            "type_name_overrides": {"WidgetSortOrderInput": "WidgetSort"},
            "index_document_sizes": true
        }))
        .unwrap();
        assert_eq!(config.schema_element_names.form, NameForm::CamelCase);
        assert!(config.index_document_sizes);
        assert_eq!(
            config
                .type_name_overrides
                .get("WidgetSortOrderInput")
                .unwrap(),
            "WidgetSort"
        );
    }

    #[test]
    fn rejects_formats_without_base_placeholder() {
        let mut config = SchemaConfig::default();
        config
            .derived_type_name_formats
            .insert(DerivedTypeKind::FilterInput, "Filter".to_owned());
        assert!(config.validate().is_err());
    }
}
