use crate::config::SchemaConfig;
use crate::error::{SchemaError, SourceLocation};
use crate::schema::definitions::{
    Cardinality, CustomTimestampRange, DeprecatedElement, DerivedFieldFunction,
    DerivedIndexedType, DirectiveApplication, EnumTypeDef, EnumValueDef, FieldDef,
    ForeignKeyDirection, IndexDef, InterfaceTypeDef, MappingDef, ObjectTypeDef, Relationship,
    Rollover, RolloverGranularity, ScalarTypeDef, SortClause, SortDirection, SourcedFrom,
    TypeDef, UnionTypeDef,
};
use crate::schema::element_names::SchemaElementNames;
use crate::schema::namer::Namer;
use crate::schema::registry::{
    DerivedFieldCustomization, DerivedTypeCustomization, FieldCustomization,
    GraphQLExtensionModule, SchemaRegistry, SubAggregationsFieldCustomization,
    TypeCustomization,
};
use crate::schema::type_ref::{is_valid_graphql_name, TypeRef};
use indexmap::map::Entry;
use serde_json::Value as Json;
use std::panic::Location;
use std::rc::Rc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// JSON schema validation keywords a field's `json_schema` options may use.
/// `type` is additionally rejected later for fields of built-in scalar types.
const JSON_SCHEMA_KEYWORD_ALLOWLIST: &[&str] = &[
    "type",
    "format",
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "enum",
    "const",
    "description",
    "default",
];

pub(crate) fn validate_json_schema_options(
    type_name: &str,
    field: &str,
    options: &[(&str, Json)],
) -> Result<(), SchemaError> {
    for (key, value) in options {
        if *key == "ElasticGraph" {
            return Err(SchemaError::ReservedJsonSchemaMetadataKey {
                type_name: type_name.to_owned(),
                field: field.to_owned(),
            });
        }
        if !JSON_SCHEMA_KEYWORD_ALLOWLIST.contains(key) {
            return Err(SchemaError::InvalidJsonSchemaOption {
                type_name: type_name.to_owned(),
                field: field.to_owned(),
                key: (*key).to_owned(),
                reason: "unknown JSON schema keyword".to_owned(),
            });
        }
        let valid = match *key {
            "minLength" | "maxLength" | "minItems" | "maxItems" => {
                value.as_u64().is_some()
            }
            "minimum" | "maximum" | "exclusiveMinimum" | "exclusiveMaximum" | "multipleOf" => {
                value.is_number()
            }
            "pattern" | "format" | "description" => value.is_string(),
            "uniqueItems" => value.is_boolean(),
            "enum" => value.is_array(),
            "type" => value.is_string() || value.is_array(),
            _ => true,
        };
        if !valid {
            return Err(SchemaError::InvalidJsonSchemaOption {
                type_name: type_name.to_owned(),
                field: field.to_owned(),
                key: (*key).to_owned(),
                reason: format!("unexpected value `{value}` for this keyword"),
            });
        }
    }
    Ok(())
}

/// The user-facing entry points for assembling a schema model. An instance
/// is handed to the `define_schema` closure; every registration happens
/// through it.
pub struct SchemaDefinition {
    pub(crate) registry: SchemaRegistry,
    pub(crate) names: SchemaElementNames,
    pub(crate) namer: Namer,
    pub(crate) config: SchemaConfig,
    pub(crate) on_built_in_type_callbacks: Vec<TypeCustomization>,
}

impl SchemaDefinition {
    pub(crate) fn new(config: SchemaConfig) -> Result<Self, SchemaError> {
        config.validate()?;
        let names = SchemaElementNames::new(&config.schema_element_names)?;
        let namer = Namer::new(&config);
        Ok(Self {
            registry: SchemaRegistry::new(),
            names,
            namer,
            config,
            on_built_in_type_callbacks: Vec::new(),
        })
    }

    pub fn object_type(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut ObjectTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = ObjectTypeBuilder::new(name);
        f(&mut builder)?;
        self.register_object_builder(builder)
    }

    pub fn interface_type(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut InterfaceTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = InterfaceTypeBuilder {
            type_def: InterfaceTypeDef {
                name: name.to_owned(),
                ..Default::default()
            },
            sub_aggregation_customizations: Vec::new(),
        };
        f(&mut builder)?;
        for (field_name, customize) in builder.sub_aggregation_customizations {
            self.registry
                .sub_aggregations_field_customizations
                .push(SubAggregationsFieldCustomization {
                    type_name: name.to_owned(),
                    field_name,
                    customize,
                });
        }
        self.registry
            .register_user_type(TypeDef::Interface(builder.type_def))
    }

    pub fn union_type(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut UnionTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = UnionTypeBuilder {
            type_def: UnionTypeDef {
                name: name.to_owned(),
                ..Default::default()
            },
        };
        f(&mut builder)?;
        self.registry
            .register_user_type(TypeDef::Union(builder.type_def))
    }

    pub fn enum_type(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut EnumTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = EnumTypeBuilder {
            type_def: EnumTypeDef {
                name: name.to_owned(),
                ..Default::default()
            },
            namer: &self.namer,
        };
        f(&mut builder)?;
        let type_def = builder.type_def;
        self.registry.register_user_type(TypeDef::Enum(type_def))
    }

    pub fn scalar_type(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut ScalarTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = ScalarTypeBuilder {
            name: name.to_owned(),
            documentation: None,
            directives: Vec::new(),
            mapping: None,
            json_schema: None,
        };
        f(&mut builder)?;
        let (Some(mapping), Some(json_schema)) = (builder.mapping, builder.json_schema) else {
            return Err(SchemaError::IncompleteScalarDefinition {
                name: name.to_owned(),
            });
        };
        self.registry.register_user_type(TypeDef::Scalar(ScalarTypeDef {
            name: name.to_owned(),
            documentation: builder.documentation,
            directives: builder.directives,
            mapping,
            json_schema,
            built_in: false,
        }))
    }

    /// Appends a verbatim SDL fragment to the end of the emitted schema.
    pub fn raw_sdl(&mut self, sdl: impl Into<String>) {
        self.registry.raw_sdl_fragments.push(sdl.into());
    }

    /// Records that a type present in prior JSON schema versions no longer
    /// exists.
    #[track_caller]
    pub fn deleted_type(&mut self, name: &str) {
        let location: SourceLocation = Location::caller().into();
        self.registry.deleted_types.insert(
            name.to_owned(),
            DeprecatedElement {
                name: name.to_owned(),
                defined_at: location,
                defined_via: format!("schema.deleted_type(\"{name}\")"),
            },
        );
    }

    /// Sets the JSON schema version. Must be called exactly once.
    #[track_caller]
    pub fn json_schema_version(&mut self, version: i64) -> Result<(), SchemaError> {
        if version < 1 {
            return Err(SchemaError::JsonSchemaVersionInvalid { value: version });
        }
        let location: SourceLocation = Location::caller().into();
        match self.registry.json_schema_version {
            Some((_, first)) => Err(SchemaError::JsonSchemaVersionSetTwice {
                first,
                second: location,
            }),
            None => {
                self.registry.json_schema_version = Some((version as u32, location));
                Ok(())
            }
        }
    }

    /// Records a GraphQL extension module for re-loading at runtime.
    #[track_caller]
    pub fn register_graphql_extension(
        &mut self,
        require_path: impl Into<String>,
        name: impl Into<String>,
        config: Json,
    ) {
        let location: SourceLocation = Location::caller().into();
        self.registry
            .graphql_extension_modules
            .push(GraphQLExtensionModule {
                require_path: require_path.into(),
                name: name.into(),
                config,
                defined_at: location,
            });
    }

    /// Registers a callback applied to every built-in type at the end of
    /// registration.
    pub fn on_built_in_types(&mut self, f: impl Fn(&mut TypeDef) + 'static) {
        self.on_built_in_type_callbacks.push(Rc::new(f));
    }

    fn register_object_builder(&mut self, builder: ObjectTypeBuilder) -> Result<(), SchemaError> {
        let name = builder.type_def.name.clone();
        for customization in builder.derived_type_customizations {
            self.registry.derived_type_customizations.push(customization);
        }
        for customization in builder.derived_field_customizations {
            self.registry
                .derived_field_customizations
                .push(customization);
        }
        for (field_name, customize) in builder.sub_aggregation_customizations {
            self.registry
                .sub_aggregations_field_customizations
                .push(SubAggregationsFieldCustomization {
                    type_name: name.clone(),
                    field_name,
                    customize,
                });
        }
        self.registry
            .register_user_type(TypeDef::Object(builder.type_def))
    }
}

/// Builder handed to `object_type` callbacks.
pub struct ObjectTypeBuilder {
    type_def: ObjectTypeDef,
    derived_type_customizations: Vec<DerivedTypeCustomization>,
    derived_field_customizations: Vec<DerivedFieldCustomization>,
    sub_aggregation_customizations: Vec<(String, FieldCustomization)>,
}

impl ObjectTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            type_def: ObjectTypeDef {
                name: name.to_owned(),
                ..Default::default()
            },
            derived_type_customizations: Vec::new(),
            derived_field_customizations: Vec::new(),
            sub_aggregation_customizations: Vec::new(),
        }
    }

    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.type_def.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.type_def
            .directives
            .push(directive_application(name, arguments));
        self
    }

    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.type_def.implements.insert(interface.to_owned());
        self
    }

    /// Marks the type as GraphQL-only: visible in queries but never present
    /// on events or in the datastore.
    pub fn graphql_only(&mut self) -> &mut Self {
        self.type_def.graphql_only = true;
        self
    }

    pub fn field(&mut self, name: &str, ty: &str) -> Result<FieldBuilder<'_>, SchemaError> {
        add_field(
            &self.type_def.name,
            &mut self.type_def.fields,
            &mut self.sub_aggregation_customizations,
            name,
            ty,
        )
    }

    /// Declares a one-to-one relationship to another indexed type, joined
    /// through `foreign_key`.
    pub fn relates_to_one(
        &mut self,
        name: &str,
        ty: &str,
        foreign_key: &str,
        direction: ForeignKeyDirection,
    ) -> Result<FieldBuilder<'_>, SchemaError> {
        self.relates(name, ty, foreign_key, direction, Cardinality::One)
    }

    /// Declares a one-to-many relationship to another indexed type. The
    /// field is exposed as a Relay connection.
    pub fn relates_to_many(
        &mut self,
        name: &str,
        ty: &str,
        foreign_key: &str,
        direction: ForeignKeyDirection,
    ) -> Result<FieldBuilder<'_>, SchemaError> {
        self.relates(name, ty, foreign_key, direction, Cardinality::Many)
    }

    fn relates(
        &mut self,
        name: &str,
        ty: &str,
        foreign_key: &str,
        direction: ForeignKeyDirection,
        cardinality: Cardinality,
    ) -> Result<FieldBuilder<'_>, SchemaError> {
        let parsed = TypeRef::parse(ty).ok_or_else(|| SchemaError::Definition {
            message: format!("`{ty}` is not a valid type reference for relationship `{name}`"),
        })?;
        if parsed.is_list() {
            return Err(SchemaError::Definition {
                message: format!(
                    "relationship `{}.{name}` must reference a bare type; use \
                     `relates_to_many` for collections instead of a list type",
                    self.type_def.name
                ),
            });
        }
        let related_type = parsed.fully_unwrapped().to_owned();
        let mut builder = self.field(name, ty)?;
        builder.field.relationship = Some(Relationship {
            cardinality,
            related_type,
            foreign_key: foreign_key.to_owned(),
            direction,
        });
        Ok(builder)
    }

    /// Declares the datastore index for this type's documents. A type can
    /// declare at most one index.
    pub fn index(&mut self, name: &str) -> Result<IndexBuilder<'_>, SchemaError> {
        if self.type_def.index.is_some() {
            return Err(SchemaError::Definition {
                message: format!(
                    "type `{}` declares more than one index; each indexed type has \
                     exactly one index",
                    self.type_def.name
                ),
            });
        }
        let mut index = IndexDef::new(name);
        index.defined_after_field_count = self.type_def.fields.len();
        Ok(IndexBuilder {
            index: self.type_def.index.insert(index),
        })
    }

    /// Declares that documents of `destination_type` are derived from this
    /// type's events.
    pub fn derived_indexed_type(
        &mut self,
        destination_type: &str,
        id_source: &str,
        f: impl FnOnce(&mut DerivedIndexedTypeBuilder) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut builder = DerivedIndexedTypeBuilder {
            rule: DerivedIndexedType {
                destination_type: destination_type.to_owned(),
                id_source: id_source.to_owned(),
                routing_value_source: None,
                rollover_timestamp_value_source: None,
                fields: Vec::new(),
            },
        };
        f(&mut builder)?;
        self.type_def.derived_indexed_types.push(builder.rule);
        Ok(())
    }

    #[track_caller]
    pub fn renamed_from(&mut self, old_name: &str) -> &mut Self {
        let location: SourceLocation = Location::caller().into();
        self.type_def.renamed_from.insert(
            old_name.to_owned(),
            DeprecatedElement {
                name: old_name.to_owned(),
                defined_at: location,
                defined_via: format!("type.renamed_from(\"{old_name}\")"),
            },
        );
        self
    }

    #[track_caller]
    pub fn deleted_field(&mut self, old_name: &str) -> &mut Self {
        let location: SourceLocation = Location::caller().into();
        self.type_def.deleted_fields.insert(
            old_name.to_owned(),
            DeprecatedElement {
                name: old_name.to_owned(),
                defined_at: location,
                defined_via: format!("type.deleted_field(\"{old_name}\")"),
            },
        );
        self
    }

    /// Customizes the named derived types of this type once they exist.
    pub fn customize_derived_types(
        &mut self,
        type_names: &[&str],
        f: impl Fn(&mut TypeDef) + 'static,
    ) {
        self.derived_type_customizations.push(DerivedTypeCustomization {
            owner: self.type_def.name.clone(),
            target_type_names: type_names.iter().map(|n| (*n).to_owned()).collect(),
            customize: Rc::new(f),
        });
    }

    /// Customizes the named fields of one derived type of this type.
    pub fn customize_derived_type_fields(
        &mut self,
        type_name: &str,
        field_names: &[&str],
        f: impl Fn(&mut FieldDef) + 'static,
    ) {
        self.derived_field_customizations
            .push(DerivedFieldCustomization {
                owner: self.type_def.name.clone(),
                target_type_name: type_name.to_owned(),
                field_names: field_names.iter().map(|n| (*n).to_owned()).collect(),
                customize: Rc::new(f),
            });
    }
}

/// Builder handed to `interface_type` callbacks.
pub struct InterfaceTypeBuilder {
    type_def: InterfaceTypeDef,
    sub_aggregation_customizations: Vec<(String, FieldCustomization)>,
}

impl InterfaceTypeBuilder {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.type_def.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.type_def
            .directives
            .push(directive_application(name, arguments));
        self
    }

    pub fn field(&mut self, name: &str, ty: &str) -> Result<FieldBuilder<'_>, SchemaError> {
        add_field(
            &self.type_def.name,
            &mut self.type_def.fields,
            &mut self.sub_aggregation_customizations,
            name,
            ty,
        )
    }

    pub fn index(&mut self, name: &str) -> Result<IndexBuilder<'_>, SchemaError> {
        if self.type_def.index.is_some() {
            return Err(SchemaError::Definition {
                message: format!(
                    "interface `{}` declares more than one index",
                    self.type_def.name
                ),
            });
        }
        let mut index = IndexDef::new(name);
        index.defined_after_field_count = self.type_def.fields.len();
        Ok(IndexBuilder {
            index: self.type_def.index.insert(index),
        })
    }

    #[track_caller]
    pub fn renamed_from(&mut self, old_name: &str) -> &mut Self {
        let location: SourceLocation = Location::caller().into();
        self.type_def.renamed_from.insert(
            old_name.to_owned(),
            DeprecatedElement {
                name: old_name.to_owned(),
                defined_at: location,
                defined_via: format!("type.renamed_from(\"{old_name}\")"),
            },
        );
        self
    }

    #[track_caller]
    pub fn deleted_field(&mut self, old_name: &str) -> &mut Self {
        let location: SourceLocation = Location::caller().into();
        self.type_def.deleted_fields.insert(
            old_name.to_owned(),
            DeprecatedElement {
                name: old_name.to_owned(),
                defined_at: location,
                defined_via: format!("type.deleted_field(\"{old_name}\")"),
            },
        );
        self
    }
}

/// Builder handed to `union_type` callbacks.
pub struct UnionTypeBuilder {
    type_def: UnionTypeDef,
}

impl UnionTypeBuilder {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.type_def.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.type_def
            .directives
            .push(directive_application(name, arguments));
        self
    }

    pub fn subtype(&mut self, member: &str) -> &mut Self {
        self.type_def.members.insert(member.to_owned());
        self
    }

    pub fn subtypes(&mut self, members: &[&str]) -> &mut Self {
        for member in members {
            self.subtype(member);
        }
        self
    }
}

/// Builder handed to `enum_type` callbacks.
pub struct EnumTypeBuilder<'a> {
    type_def: EnumTypeDef,
    namer: &'a Namer,
}

impl EnumTypeBuilder<'_> {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.type_def.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.type_def
            .directives
            .push(directive_application(name, arguments));
        self
    }

    pub fn value(&mut self, name: &str) -> Result<&mut Self, SchemaError> {
        self.value_with(name, |_| Ok(()))
    }

    pub fn value_with(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut EnumValueBuilder) -> Result<(), SchemaError>,
    ) -> Result<&mut Self, SchemaError> {
        if !is_valid_graphql_name(name) {
            return Err(SchemaError::InvalidGraphQLName {
                name: name.to_owned(),
            });
        }
        let emitted = self.namer.enum_value(&self.type_def.name, name);
        match self.type_def.values.entry(emitted.clone()) {
            Entry::Occupied(_) => Err(SchemaError::Definition {
                message: format!(
                    "enum `{}` defines value `{emitted}` more than once",
                    self.type_def.name
                ),
            }),
            Entry::Vacant(slot) => {
                let mut value = EnumValueDef::new(emitted);
                value.original_name = name.to_owned();
                let mut builder = EnumValueBuilder { value: &mut value };
                f(&mut builder)?;
                slot.insert(value);
                Ok(self)
            }
        }
    }

    pub fn values(&mut self, names: &[&str]) -> Result<&mut Self, SchemaError> {
        for name in names {
            self.value(name)?;
        }
        Ok(self)
    }
}

pub struct EnumValueBuilder<'a> {
    value: &'a mut EnumValueDef,
}

impl EnumValueBuilder<'_> {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.value.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.value
            .directives
            .push(directive_application(name, arguments));
        self
    }
}

/// Builder handed to `scalar_type` callbacks. Both `mapping` and
/// `json_schema` are mandatory.
pub struct ScalarTypeBuilder {
    name: String,
    documentation: Option<String>,
    directives: Vec<DirectiveApplication>,
    mapping: Option<MappingDef>,
    json_schema: Option<Json>,
}

impl ScalarTypeBuilder {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.directives.push(directive_application(name, arguments));
        self
    }

    pub fn mapping(&mut self, mapping_type: &str, options: &[(&str, Json)]) -> &mut Self {
        let mut mapping = MappingDef::of_type(mapping_type);
        for (key, value) in options {
            mapping.options.insert((*key).to_owned(), value.clone());
        }
        self.mapping = Some(mapping);
        self
    }

    pub fn json_schema(&mut self, options: &[(&str, Json)]) -> Result<&mut Self, SchemaError> {
        validate_json_schema_options(&self.name, "<scalar>", options)?;
        if !options.iter().any(|(key, _)| *key == "type") {
            return Err(SchemaError::IncompleteScalarDefinition {
                name: self.name.clone(),
            });
        }
        let mut schema = serde_json::Map::new();
        for (key, value) in options {
            schema.insert((*key).to_owned(), value.clone());
        }
        self.json_schema = Some(Json::Object(schema));
        Ok(self)
    }
}

/// Builder returned by `field` and the relationship declarations.
pub struct FieldBuilder<'a> {
    type_name: String,
    field: &'a mut FieldDef,
    sub_aggregation_customizations: &'a mut Vec<(String, FieldCustomization)>,
}

impl FieldBuilder<'_> {
    pub fn documentation(&mut self, docs: impl Into<String>) -> &mut Self {
        self.field.documentation = Some(docs.into());
        self
    }

    pub fn directive(&mut self, name: &str, arguments: &[(&str, Json)]) -> &mut Self {
        self.field
            .directives
            .push(directive_application(name, arguments));
        self
    }

    /// Overrides the name this field is stored under in the index.
    pub fn name_in_index(&mut self, name: &str) -> &mut Self {
        self.field.name_in_index = name.to_owned();
        self
    }

    /// Overrides the datastore mapping for this field.
    pub fn mapping(&mut self, mapping_type: &str, options: &[(&str, Json)]) -> &mut Self {
        let mut mapping = MappingDef::of_type(mapping_type);
        for (key, value) in options {
            mapping.options.insert((*key).to_owned(), value.clone());
        }
        self.field.mapping = Some(mapping);
        self
    }

    /// Adds JSON schema constraints for this field's event values.
    pub fn json_schema(&mut self, options: &[(&str, Json)]) -> Result<&mut Self, SchemaError> {
        validate_json_schema_options(&self.type_name, &self.field.name, options)?;
        for (key, value) in options {
            self.field
                .json_schema_options
                .insert((*key).to_owned(), value.clone());
        }
        Ok(self)
    }

    pub fn graphql_only(&mut self) -> &mut Self {
        self.field.graphql_only = true;
        self
    }

    pub fn indexing_only(&mut self) -> &mut Self {
        self.field.indexing_only = true;
        self
    }

    pub fn filterable(&mut self, value: bool) -> &mut Self {
        self.field.filterable = Some(value);
        self
    }

    pub fn groupable(&mut self, value: bool) -> &mut Self {
        self.field.groupable = Some(value);
        self
    }

    pub fn aggregatable(&mut self, value: bool) -> &mut Self {
        self.field.aggregatable = Some(value);
        self
    }

    pub fn sortable(&mut self, value: bool) -> &mut Self {
        self.field.sortable = Some(value);
        self
    }

    /// Declares that this field's value is copied from a related type's
    /// events rather than supplied by this type's own events.
    pub fn sourced_from(&mut self, relationship: &str, field_path: &str) -> &mut Self {
        self.field.sourced_from = Some(SourcedFrom {
            relationship: relationship.to_owned(),
            field_path: field_path.to_owned(),
        });
        self
    }

    /// Declares the field computed at query time by a stored script.
    pub fn runtime_script(&mut self, scoped_script_name: &str) -> &mut Self {
        self.field.runtime_script = Some(scoped_script_name.to_owned());
        self
    }

    /// Tags the field; derived schema elements built from fully tagged paths
    /// carry a `@tag(name: ...)` directive.
    pub fn tag(&mut self, tag: &str) -> &mut Self {
        self.field.tags.insert(tag.to_owned());
        self
    }

    #[track_caller]
    pub fn renamed_from(&mut self, old_name: &str) -> &mut Self {
        let location: SourceLocation = Location::caller().into();
        self.field.renamed_from.insert(
            old_name.to_owned(),
            DeprecatedElement {
                name: old_name.to_owned(),
                defined_at: location,
                defined_via: format!("field.renamed_from(\"{old_name}\")"),
            },
        );
        self
    }

    /// Customizes the derived sub-aggregations field generated for this
    /// (nested list) field.
    pub fn customize_sub_aggregations_field(&mut self, f: impl Fn(&mut FieldDef) + 'static) {
        self.sub_aggregation_customizations
            .push((self.field.name.clone(), Rc::new(f)));
    }
}

/// Builder returned by `index`.
pub struct IndexBuilder<'a> {
    index: &'a mut IndexDef,
}

impl IndexBuilder<'_> {
    /// Partitions the index by a timestamp field at the given granularity.
    pub fn rollover(
        &mut self,
        granularity: RolloverGranularity,
        timestamp_field_path: &str,
    ) -> &mut Self {
        self.index.rollover = Some(Rollover {
            granularity,
            timestamp_field_path: timestamp_field_path.to_owned(),
            custom_ranges: Vec::new(),
        });
        self
    }

    /// Adds a bounded extra rollover index. Bounds are ISO-8601 timestamps;
    /// at least one must be provided.
    pub fn custom_timestamp_range(
        &mut self,
        index_name_suffix: &str,
        gte: Option<&str>,
        lt: Option<&str>,
    ) -> Result<&mut Self, SchemaError> {
        let Some(rollover) = self.index.rollover.as_mut() else {
            return Err(SchemaError::Definition {
                message: format!(
                    "index `{}` declares a custom timestamp range but no rollover",
                    self.index.name
                ),
            });
        };
        if gte.is_none() && lt.is_none() {
            return Err(SchemaError::Definition {
                message: format!(
                    "custom timestamp range `{index_name_suffix}` on index `{}` needs a \
                     `gte` or `lt` bound",
                    self.index.name
                ),
            });
        }
        for bound in [gte, lt].into_iter().flatten() {
            OffsetDateTime::parse(bound, &Rfc3339).map_err(|_| SchemaError::Definition {
                message: format!(
                    "custom timestamp range bound `{bound}` on index `{}` is not a valid \
                     ISO-8601 timestamp",
                    self.index.name
                ),
            })?;
        }
        rollover.custom_ranges.push(CustomTimestampRange {
            index_name_suffix: index_name_suffix.to_owned(),
            gte: gte.map(str::to_owned),
            lt: lt.map(str::to_owned),
        });
        Ok(self)
    }

    /// Routes documents to shards by the given field instead of by id.
    pub fn route_with(&mut self, field_path: &str) -> &mut Self {
        self.index.route_with = Some(field_path.to_owned());
        self
    }

    pub fn default_sort(&mut self, clauses: &[(&str, SortDirection)]) -> &mut Self {
        self.index.default_sort = clauses
            .iter()
            .map(|(path, direction)| SortClause {
                field_path: (*path).to_owned(),
                direction: *direction,
            })
            .collect();
        self
    }

    pub fn setting(&mut self, key: &str, value: Json) -> &mut Self {
        self.index.settings.insert(key.to_owned(), value);
        self
    }

    pub fn mapping_setting(&mut self, key: &str, value: Json) -> &mut Self {
        self.index.mappings.insert(key.to_owned(), value);
        self
    }
}

/// Builder handed to `derived_indexed_type` callbacks.
pub struct DerivedIndexedTypeBuilder {
    rule: DerivedIndexedType,
}

impl DerivedIndexedTypeBuilder {
    pub fn route_with(&mut self, source_path: &str) -> &mut Self {
        self.rule.routing_value_source = Some(source_path.to_owned());
        self
    }

    pub fn rollover_timestamp(&mut self, source_path: &str) -> &mut Self {
        self.rule.rollover_timestamp_value_source = Some(source_path.to_owned());
        self
    }

    /// Accumulates source values into an append-only set field.
    pub fn append_only_set(&mut self, field: &str, source: &str) -> &mut Self {
        self.rule.fields.push(DerivedFieldFunction::AppendOnlySet {
            field: field.to_owned(),
            source: source.to_owned(),
        });
        self
    }

    /// Sets the field from the source value once; later conflicting values
    /// fail the update.
    pub fn immutable_value(&mut self, field: &str, source: &str) -> &mut Self {
        self.rule.fields.push(DerivedFieldFunction::ImmutableValue {
            field: field.to_owned(),
            source: source.to_owned(),
        });
        self
    }

    pub fn min_value(&mut self, field: &str, source: &str) -> &mut Self {
        self.rule.fields.push(DerivedFieldFunction::MinValue {
            field: field.to_owned(),
            source: source.to_owned(),
        });
        self
    }

    pub fn max_value(&mut self, field: &str, source: &str) -> &mut Self {
        self.rule.fields.push(DerivedFieldFunction::MaxValue {
            field: field.to_owned(),
            source: source.to_owned(),
        });
        self
    }
}

fn directive_application(name: &str, arguments: &[(&str, Json)]) -> DirectiveApplication {
    let mut application = DirectiveApplication::new(name);
    for (arg_name, value) in arguments {
        application = application.with_argument(*arg_name, value.clone());
    }
    application
}

fn add_field<'a>(
    type_name: &str,
    fields: &'a mut indexmap::IndexMap<String, FieldDef>,
    sub_aggregation_customizations: &'a mut Vec<(String, FieldCustomization)>,
    name: &str,
    ty: &str,
) -> Result<FieldBuilder<'a>, SchemaError> {
    if !is_valid_graphql_name(name) {
        return Err(SchemaError::InvalidGraphQLName {
            name: name.to_owned(),
        });
    }
    let parsed = TypeRef::parse(ty).ok_or_else(|| SchemaError::Definition {
        message: format!("`{ty}` is not a valid type reference for field `{type_name}.{name}`"),
    })?;
    match fields.entry(name.to_owned()) {
        Entry::Occupied(_) => Err(SchemaError::DuplicateFieldName {
            type_name: type_name.to_owned(),
            field: name.to_owned(),
        }),
        Entry::Vacant(slot) => {
            let field = slot.insert(FieldDef::new(name, parsed));
            Ok(FieldBuilder {
                type_name: type_name.to_owned(),
                field,
                sub_aggregation_customizations,
            })
        }
    }
}
