use crate::error::SchemaError;
use crate::schema::builder::SchemaDefinition;
use crate::schema::definitions::{FieldDef, TypeDef};

/// An extension point for packages that augment the schema definition API.
///
/// Extensions are registered via `SchemaConfig::extension_modules` and run in
/// registration order. They are applied before built-in type registration so
/// they can customize built-ins, and again around user registrations.
pub trait SchemaDefinitionExtension {
    /// A stable name identifying the extension in diagnostics.
    fn name(&self) -> &str;

    /// Called once, before built-in types register, with the definition API.
    /// Extensions typically register `on_built_in_types` callbacks or their
    /// own scalar types here.
    fn setup(&self, _api: &mut SchemaDefinition) -> Result<(), SchemaError> {
        Ok(())
    }

    /// Called for every type (user-defined, built-in, and derived) before
    /// artifacts are emitted.
    fn customize_type(&self, _type_def: &mut TypeDef) -> Result<(), SchemaError> {
        Ok(())
    }

    /// Called for every field of every object and interface type before
    /// artifacts are emitted.
    fn customize_field(&self, _type_name: &str, _field: &mut FieldDef) -> Result<(), SchemaError> {
        Ok(())
    }
}
