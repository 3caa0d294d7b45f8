use crate::error::{SchemaError, SourceLocation};
use crate::schema::definitions::{DeprecatedElement, FieldDef, TypeDef};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde_json::Value as Json;
use std::rc::Rc;

/// The name every ingested event is wrapped under in the JSON schema.
pub const EVENT_ENVELOPE_TYPE_NAME: &str = "ElasticGraphEventEnvelope";

lazy_static! {
    /// Names that may never be user-defined, even before built-in
    /// registration would catch them as duplicates.
    pub static ref RESERVED_TYPE_NAMES: Vec<&'static str> = vec![
        EVENT_ENVELOPE_TYPE_NAME,
        "Query",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    UserDefinition,
    Derivation,
}

/// A GraphQL extension recorded for re-loading by the query process.
#[derive(Debug, Clone)]
pub struct GraphQLExtensionModule {
    pub require_path: String,
    pub name: String,
    pub config: Json,
    pub defined_at: SourceLocation,
}

pub type TypeCustomization = Rc<dyn Fn(&mut TypeDef)>;
pub type FieldCustomization = Rc<dyn Fn(&mut FieldDef)>;

/// A `customize_derived_types` registration: apply `customize` to the named
/// derived types of `owner` once they exist.
pub struct DerivedTypeCustomization {
    pub owner: String,
    pub target_type_names: Vec<String>,
    pub customize: TypeCustomization,
}

/// A `customize_derived_type_fields` registration.
pub struct DerivedFieldCustomization {
    pub owner: String,
    pub target_type_name: String,
    pub field_names: Vec<String>,
    pub customize: FieldCustomization,
}

/// A `customize_sub_aggregations_field` registration: applied to the derived
/// sub-aggregations field generated for `(type_name, field_name)`.
pub struct SubAggregationsFieldCustomization {
    pub type_name: String,
    pub field_name: String,
    pub customize: FieldCustomization,
}

/// An update-target entry: how the indexer folds one source type's events
/// into documents of a destination type.
#[derive(Debug, Clone)]
pub struct UpdateTarget {
    pub destination_type: String,
    pub relationship: Option<String>,
    pub script_id: String,
    /// Field path on the source event supplying the destination document id.
    pub id_source: String,
    pub routing_value_source: Option<String>,
    pub rollover_timestamp_value_source: Option<String>,
    /// Destination `name_in_index` -> source field path.
    pub data_params: IndexMap<String, UpdateTargetParam>,
}

#[derive(Debug, Clone)]
pub struct UpdateTargetParam {
    pub source_path: String,
    pub cardinality: crate::schema::definitions::Cardinality,
}

/// The arena of all registered types, keyed by name, together with the
/// schema-level registrations that are not types.
pub struct SchemaRegistry {
    types: IndexMap<String, TypeDef>,
    pub raw_sdl_fragments: Vec<String>,
    pub deleted_types: IndexMap<String, DeprecatedElement>,
    pub json_schema_version: Option<(u32, SourceLocation)>,
    pub graphql_extension_modules: Vec<GraphQLExtensionModule>,
    pub derived_type_customizations: Vec<DerivedTypeCustomization>,
    pub derived_field_customizations: Vec<DerivedFieldCustomization>,
    pub sub_aggregations_field_customizations: Vec<SubAggregationsFieldCustomization>,
    pub update_targets_by_source_type: IndexMap<String, Vec<UpdateTarget>>,
    /// Sub-aggregation type name -> `name_in_index` path of the nested list
    /// it aggregates, relative to the root document.
    pub sub_aggregation_paths_by_type: IndexMap<String, Vec<String>>,
    phase: Phase,
    /// type name -> (referencing type, field name) pairs; populated when the
    /// user phase completes so that user-phase mutations stay correct.
    field_refs_by_type: Option<IndexMap<String, Vec<(String, String)>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
            raw_sdl_fragments: Vec::new(),
            deleted_types: IndexMap::new(),
            json_schema_version: None,
            graphql_extension_modules: Vec::new(),
            derived_type_customizations: Vec::new(),
            derived_field_customizations: Vec::new(),
            sub_aggregations_field_customizations: Vec::new(),
            update_targets_by_source_type: IndexMap::new(),
            sub_aggregation_paths_by_type: IndexMap::new(),
            phase: Phase::UserDefinition,
            field_refs_by_type: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Registers a type defined by the user. Reserved and duplicate names
    /// fail; the name must be a valid GraphQL name.
    pub fn register_user_type(&mut self, type_def: TypeDef) -> Result<(), SchemaError> {
        if RESERVED_TYPE_NAMES.contains(&type_def.name()) {
            return Err(SchemaError::ReservedTypeName {
                name: type_def.name().to_owned(),
            });
        }
        self.register_type(type_def)
    }

    /// Registers a built-in or derived type. Duplicate names still fail.
    pub fn register_type(&mut self, type_def: TypeDef) -> Result<(), SchemaError> {
        let name = type_def.name().to_owned();
        if !crate::schema::type_ref::is_valid_graphql_name(&name) {
            return Err(SchemaError::InvalidGraphQLName { name });
        }
        if self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateTypeName { name });
        }
        self.types.insert(name, type_def);
        Ok(())
    }

    pub fn type_named(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn type_named_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.get_mut(name)
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn types(&self) -> &IndexMap<String, TypeDef> {
        &self.types
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Whether documents of this type live in a datastore index: the type
    /// declares an index, or is an object implementing an indexed interface.
    pub fn is_indexed(&self, type_name: &str) -> bool {
        match self.types.get(type_name) {
            Some(TypeDef::Object(object)) => {
                object.index.is_some()
                    || object.implements.iter().any(|interface| {
                        matches!(
                            self.types.get(interface),
                            Some(TypeDef::Interface(i)) if i.index.is_some()
                        )
                    })
            }
            Some(TypeDef::Interface(interface)) => interface.index.is_some(),
            _ => false,
        }
    }

    /// The concrete (object, non-`graphql_only`, non-derived) indexable type
    /// names, sorted; this is the envelope's `type` enum.
    pub fn indexable_concrete_type_names(&self) -> Vec<String> {
        let mut names = self
            .types
            .values()
            .filter_map(|type_def| match type_def {
                TypeDef::Object(object)
                    if !object.graphql_only
                        && object.derived_from.is_none()
                        && self.is_indexed(&object.name) =>
                {
                    Some(object.name.clone())
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Resolves a dotted field path against a type, returning the chain of
    /// field definitions. Paths do not traverse lists except at the final
    /// segment, and never traverse relationships.
    pub fn resolve_field_path(&self, type_name: &str, path: &str) -> Option<Vec<&FieldDef>> {
        let mut current_type = type_name;
        let mut resolved = Vec::new();
        let segments: Vec<&str> = path.split('.').collect();
        for (position, segment) in segments.iter().enumerate() {
            let fields = self.types.get(current_type)?.fields()?;
            let field = fields.get(*segment)?;
            if field.relationship.is_some() {
                return None;
            }
            let last = position + 1 == segments.len();
            if !last && field.ty.is_list() {
                return None;
            }
            current_type = field.ty.fully_unwrapped();
            resolved.push(field);
            if !last {
                // Intermediate segments must be object-typed.
                match self.types.get(current_type) {
                    Some(TypeDef::Object(_)) => {}
                    _ => return None,
                }
            }
        }
        Some(resolved)
    }

    /// Flips the registry into the derivation phase and builds the memoized
    /// reference index.
    pub fn complete_user_definition(&mut self) {
        debug_assert_eq!(self.phase, Phase::UserDefinition);
        self.phase = Phase::Derivation;

        let mut refs: IndexMap<String, Vec<(String, String)>> = IndexMap::new();
        for (type_name, type_def) in &self.types {
            if let Some(fields) = type_def.fields() {
                for (field_name, field) in fields {
                    refs.entry(field.ty.fully_unwrapped().to_owned())
                        .or_default()
                        .push((type_name.clone(), field_name.clone()));
                }
            }
        }
        self.field_refs_by_type = Some(refs);
    }

    /// The `(referencing type, field)` pairs whose field type unwraps to
    /// `type_name`. Only available once the user phase has completed.
    pub fn field_references_to(&self, type_name: &str) -> &[(String, String)] {
        self.field_refs_by_type
            .as_ref()
            .expect("field references are memoized only after the user phase completes")
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definitions::{FieldDef, ObjectTypeDef};
    use crate::schema::type_ref::TypeRef;

    fn object_with_field(name: &str, field: &str, ty: &str) -> TypeDef {
        let mut object = ObjectTypeDef {
            name: name.to_owned(),
            ..Default::default()
        };
        object.fields.insert(
            field.to_owned(),
            FieldDef::new(field, TypeRef::parse(ty).unwrap()),
        );
        TypeDef::Object(object)
    }

    #[test]
    fn rejects_reserved_and_duplicate_names() {
        let mut registry = SchemaRegistry::new();
        let reserved = registry.register_user_type(object_with_field(
            EVENT_ENVELOPE_TYPE_NAME,
            "id",
            "ID",
        ));
        assert!(matches!(
            reserved,
            Err(SchemaError::ReservedTypeName { .. })
        ));

        registry
            .register_user_type(object_with_field("Widget", "id", "ID"))
            .unwrap();
        let duplicate = registry.register_user_type(object_with_field("Widget", "id", "ID"));
        assert!(matches!(
            duplicate,
            Err(SchemaError::DuplicateTypeName { .. })
        ));
    }

    #[test]
    fn resolves_dotted_field_paths() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_user_type(object_with_field("Widget", "options", "WidgetOptions"))
            .unwrap();
        registry
            .register_user_type(object_with_field("WidgetOptions", "size", "Int"))
            .unwrap();

        let chain = registry.resolve_field_path("Widget", "options.size").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].name, "size");

        assert!(registry.resolve_field_path("Widget", "options.missing").is_none());
        assert!(registry.resolve_field_path("Widget", "nope").is_none());
    }

    #[test]
    fn memoizes_field_references_after_completion() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_user_type(object_with_field("Widget", "options", "WidgetOptions"))
            .unwrap();
        registry
            .register_user_type(object_with_field("WidgetOptions", "size", "Int"))
            .unwrap();
        registry.complete_user_definition();

        let refs = registry.field_references_to("WidgetOptions");
        assert_eq!(refs, &[("Widget".to_owned(), "options".to_owned())]);
        assert!(registry.field_references_to("Unknown").is_empty());
    }
}
