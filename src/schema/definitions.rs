use crate::error::SourceLocation;
use crate::schema::namer::DerivedTypeKind;
use crate::schema::type_ref::TypeRef;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value as Json;
use std::collections::BTreeSet;

/// A registered type. Tagged the way the underlying GraphQL type system is:
/// one variant per type kind.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Object(ObjectTypeDef),
    Interface(InterfaceTypeDef),
    Union(UnionTypeDef),
    Enum(EnumTypeDef),
    Scalar(ScalarTypeDef),
    Input(InputTypeDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Object(t) => &t.name,
            TypeDef::Interface(t) => &t.name,
            TypeDef::Union(t) => &t.name,
            TypeDef::Enum(t) => &t.name,
            TypeDef::Scalar(t) => &t.name,
            TypeDef::Input(t) => &t.name,
        }
    }

    pub fn documentation(&self) -> Option<&str> {
        match self {
            TypeDef::Object(t) => t.documentation.as_deref(),
            TypeDef::Interface(t) => t.documentation.as_deref(),
            TypeDef::Union(t) => t.documentation.as_deref(),
            TypeDef::Enum(t) => t.documentation.as_deref(),
            TypeDef::Scalar(t) => t.documentation.as_deref(),
            TypeDef::Input(t) => t.documentation.as_deref(),
        }
    }

    pub fn directives(&self) -> &[DirectiveApplication] {
        match self {
            TypeDef::Object(t) => &t.directives,
            TypeDef::Interface(t) => &t.directives,
            TypeDef::Union(t) => &t.directives,
            TypeDef::Enum(t) => &t.directives,
            TypeDef::Scalar(t) => &t.directives,
            TypeDef::Input(t) => &t.directives,
        }
    }

    /// For compiler-generated types: the category and the base type it was
    /// derived from. `None` for user-defined and built-in types.
    pub fn derived_from(&self) -> Option<&(DerivedTypeKind, String)> {
        match self {
            TypeDef::Object(t) => t.derived_from.as_ref(),
            TypeDef::Enum(t) => t.derived_from.as_ref(),
            TypeDef::Input(t) => t.derived_from.as_ref(),
            TypeDef::Interface(_) | TypeDef::Union(_) | TypeDef::Scalar(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectTypeDef> {
        match self {
            TypeDef::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectTypeDef> {
        match self {
            TypeDef::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceTypeDef> {
        match self {
            TypeDef::Interface(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&UnionTypeDef> {
        match self {
            TypeDef::Union(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumTypeDef> {
        match self {
            TypeDef::Enum(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarTypeDef> {
        match self {
            TypeDef::Scalar(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&InputTypeDef> {
        match self {
            TypeDef::Input(t) => Some(t),
            _ => None,
        }
    }

    /// The fields of an object or interface type, in declaration order.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            TypeDef::Object(t) => Some(&t.fields),
            TypeDef::Interface(t) => Some(&t.fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut IndexMap<String, FieldDef>> {
        match self {
            TypeDef::Object(t) => Some(&mut t.fields),
            TypeDef::Interface(t) => Some(&mut t.fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: IndexSet<String>,
    /// For indexing-leaf object types (e.g. geo points): the single datastore
    /// mapping the whole object is stored under.
    pub mapping: Option<MappingDef>,
    pub index: Option<IndexDef>,
    pub derived_indexed_types: Vec<DerivedIndexedType>,
    /// Exposed in GraphQL but never present on events or in the datastore.
    pub graphql_only: bool,
    pub renamed_from: IndexMap<String, DeprecatedElement>,
    pub deleted_fields: IndexMap<String, DeprecatedElement>,
    pub derived_from: Option<(DerivedTypeKind, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct InterfaceTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub fields: IndexMap<String, FieldDef>,
    /// An index on an interface makes every implementer indexable through it.
    pub index: Option<IndexDef>,
    pub renamed_from: IndexMap<String, DeprecatedElement>,
    pub deleted_fields: IndexMap<String, DeprecatedElement>,
}

#[derive(Debug, Clone, Default)]
pub struct UnionTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub members: IndexSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnumTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub values: IndexMap<String, EnumValueDef>,
    pub derived_from: Option<(DerivedTypeKind, String)>,
}

#[derive(Debug, Clone)]
pub struct EnumValueDef {
    /// The name as emitted, after any enum value override.
    pub name: String,
    /// The name before overrides, kept for runtime translation and reporting.
    pub original_name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    /// For sort order enum values: the datastore sort this value denotes.
    pub sort_clause: Option<SortClause>,
}

impl EnumValueDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            name,
            documentation: None,
            directives: Vec::new(),
            sort_clause: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScalarTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub mapping: MappingDef,
    /// The JSON schema describing valid values; must contain `type`.
    pub json_schema: Json,
    pub built_in: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InputTypeDef {
    pub name: String,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub fields: IndexMap<String, InputFieldDef>,
    pub derived_from: Option<(DerivedTypeKind, String)>,
}

/// An input object field, also used for field arguments on output types.
#[derive(Debug, Clone)]
pub struct InputFieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub documentation: Option<String>,
    pub default_value: Option<Json>,
}

impl InputFieldDef {
    pub fn new(name: impl Into<String>, ty: &str) -> Self {
        Self {
            name: name.into(),
            ty: TypeRef::parse(ty).expect("invalid type reference in generated input field"),
            documentation: None,
            default_value: None,
        }
    }

    pub fn doc(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn default(mut self, value: Json) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    /// The field's name in datastore documents; defaults to `name`.
    pub name_in_index: String,
    pub ty: TypeRef,
    pub documentation: Option<String>,
    pub directives: Vec<DirectiveApplication>,
    pub args: Vec<InputFieldDef>,
    /// Exposed in GraphQL but not indexed.
    pub graphql_only: bool,
    /// Indexed but not exposed in GraphQL.
    pub indexing_only: bool,
    pub filterable: Option<bool>,
    pub groupable: Option<bool>,
    pub aggregatable: Option<bool>,
    pub sortable: Option<bool>,
    pub mapping: Option<MappingDef>,
    /// Extra JSON schema constraints, validated against the keyword allowlist.
    pub json_schema_options: IndexMap<String, Json>,
    pub sourced_from: Option<SourcedFrom>,
    pub relationship: Option<Relationship>,
    /// When set, the field is computed at query time by this script and is
    /// never indexed.
    pub runtime_script: Option<String>,
    pub tags: BTreeSet<String>,
    pub renamed_from: IndexMap<String, DeprecatedElement>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        Self {
            name_in_index: name.clone(),
            name,
            ty,
            documentation: None,
            directives: Vec::new(),
            args: Vec::new(),
            graphql_only: false,
            indexing_only: false,
            filterable: None,
            groupable: None,
            aggregatable: None,
            sortable: None,
            mapping: None,
            json_schema_options: IndexMap::new(),
            sourced_from: None,
            relationship: None,
            runtime_script: None,
            tags: BTreeSet::new(),
            renamed_from: IndexMap::new(),
        }
    }

    /// True when the field exists in datastore documents.
    pub fn indexed(&self) -> bool {
        !self.graphql_only && self.relationship.is_none() && self.runtime_script.is_none()
    }

    /// True when events may carry a value for this field. `sourced_from`
    /// fields are indexed but arrive via the source type's events instead.
    pub fn accepts_event_value(&self) -> bool {
        self.indexed() && self.sourced_from.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDef {
    pub mapping_type: String,
    pub options: IndexMap<String, Json>,
}

impl MappingDef {
    pub fn of_type(mapping_type: impl Into<String>) -> Self {
        Self {
            mapping_type: mapping_type.into(),
            options: IndexMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Json) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedFrom {
    pub relationship: String,
    pub field_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Cardinality {
    #[strum(to_string = "one")]
    One,
    #[strum(to_string = "many")]
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyDirection {
    /// The foreign key lives on the owning type's documents.
    Out,
    /// The foreign key lives on the related type's documents.
    In,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub cardinality: Cardinality,
    pub related_type: String,
    pub foreign_key: String,
    pub direction: ForeignKeyDirection,
}

#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub rollover: Option<Rollover>,
    pub route_with: Option<String>,
    pub default_sort: Vec<SortClause>,
    pub settings: IndexMap<String, Json>,
    pub mappings: IndexMap<String, Json>,
    /// How many fields the owning type had when `index` was declared; the
    /// rollover and routing paths must reference fields defined before it.
    pub defined_after_field_count: usize,
}

impl IndexDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rollover: None,
            route_with: None,
            default_sort: Vec::new(),
            settings: IndexMap::new(),
            mappings: IndexMap::new(),
            defined_after_field_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumIter)]
pub enum RolloverGranularity {
    #[strum(to_string = "hourly")]
    Hourly,
    #[strum(to_string = "daily")]
    Daily,
    #[strum(to_string = "monthly")]
    Monthly,
    #[strum(to_string = "yearly")]
    Yearly,
}

impl RolloverGranularity {
    /// strftime-style pattern used to build rollover index name suffixes.
    pub fn suffix_format(&self) -> &'static str {
        match self {
            RolloverGranularity::Hourly => "%Y-%m-%d-%H",
            RolloverGranularity::Daily => "%Y-%m-%d",
            RolloverGranularity::Monthly => "%Y-%m",
            RolloverGranularity::Yearly => "%Y",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rollover {
    pub granularity: RolloverGranularity,
    pub timestamp_field_path: String,
    pub custom_ranges: Vec<CustomTimestampRange>,
}

/// A bounded extra rollover index, e.g. `before_2019` for all events older
/// than the regular rollover window.
#[derive(Debug, Clone)]
pub struct CustomTimestampRange {
    pub index_name_suffix: String,
    /// Inclusive lower bound, ISO-8601.
    pub gte: Option<String>,
    /// Exclusive upper bound, ISO-8601.
    pub lt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SortDirection {
    #[strum(to_string = "asc")]
    Asc,
    #[strum(to_string = "desc")]
    Desc,
}

impl SortDirection {
    pub fn enum_suffix(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub field_path: String,
    pub direction: SortDirection,
}

/// A rename or deletion marker used by version evolution.
#[derive(Debug, Clone)]
pub struct DeprecatedElement {
    pub name: String,
    pub defined_at: SourceLocation,
    pub defined_via: String,
}

/// A rule deriving documents of another indexed type from this type's events.
#[derive(Debug, Clone)]
pub struct DerivedIndexedType {
    pub destination_type: String,
    /// Field path on the source event supplying the destination document id.
    pub id_source: String,
    pub routing_value_source: Option<String>,
    pub rollover_timestamp_value_source: Option<String>,
    pub fields: Vec<DerivedFieldFunction>,
}

/// One merge function inside a dynamic update script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedFieldFunction {
    AppendOnlySet { field: String, source: String },
    ImmutableValue { field: String, source: String },
    MinValue { field: String, source: String },
    MaxValue { field: String, source: String },
}

impl DerivedFieldFunction {
    pub fn field(&self) -> &str {
        match self {
            DerivedFieldFunction::AppendOnlySet { field, .. }
            | DerivedFieldFunction::ImmutableValue { field, .. }
            | DerivedFieldFunction::MinValue { field, .. }
            | DerivedFieldFunction::MaxValue { field, .. } => field,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            DerivedFieldFunction::AppendOnlySet { source, .. }
            | DerivedFieldFunction::ImmutableValue { source, .. }
            | DerivedFieldFunction::MinValue { source, .. }
            | DerivedFieldFunction::MaxValue { source, .. } => source,
        }
    }
}

/// A directive applied to a schema element, rendered verbatim into the SDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveApplication {
    pub name: String,
    pub arguments: Vec<(String, Json)>,
}

impl DirectiveApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Json) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    pub fn to_sdl(&self) -> String {
        if self.arguments.is_empty() {
            format!("@{}", self.name)
        } else {
            let args = self
                .arguments
                .iter()
                .map(|(name, value)| format!("{name}: {}", json_to_graphql_literal(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("@{}({args})", self.name)
        }
    }
}

/// Renders a JSON value as the equivalent GraphQL literal. Enum literals are
/// not representable; `raw_sdl` remains the escape hatch for those.
pub fn json_to_graphql_literal(value: &Json) -> String {
    match value {
        Json::Null => "null".to_owned(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => format!("{s:?}"),
        Json::Array(items) => format!(
            "[{}]",
            items
                .iter()
                .map(json_to_graphql_literal)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Json::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{k}: {}", json_to_graphql_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_applications_render_as_sdl() {
        let plain = DirectiveApplication::new("deprecated");
        assert_eq!(plain.to_sdl(), "@deprecated");

        let with_args =
            DirectiveApplication::new("tag").with_argument("name", Json::String("public".into()));
        assert_eq!(with_args.to_sdl(), r#"@tag(name: "public")"#);
    }

    #[test]
    fn graphql_literals_cover_all_json_kinds() {
        let value = serde_json::json!({"a": [1, 2.5, true, null], "b": "x\"y"});
        assert_eq!(
            json_to_graphql_literal(&value),
            r#"{a: [1, 2.5, true, null], b: "x\"y"}"#
        );
    }

    #[test]
    fn fields_default_name_in_index_to_name() {
        let field = FieldDef::new("created_at", TypeRef::parse("DateTime!").unwrap());
        assert_eq!(field.name_in_index, "created_at");
        assert!(field.indexed());
        assert!(field.accepts_event_value());
    }

    #[test]
    fn relationship_and_runtime_fields_are_not_indexed() {
        let mut field = FieldDef::new("widget", TypeRef::parse("Widget").unwrap());
        field.relationship = Some(Relationship {
            cardinality: Cardinality::One,
            related_type: "Widget".to_owned(),
            foreign_key: "widget_id".to_owned(),
            direction: ForeignKeyDirection::Out,
        });
        assert!(!field.indexed());
    }
}
