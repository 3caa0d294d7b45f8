use std::fmt::{Display, Formatter};

/// An immutable reference to a (possibly wrapped) schema type, mirroring the
/// GraphQL type grammar: `Named`, `[T]`, `T!` in any nesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(of: TypeRef) -> Self {
        TypeRef::List(Box::new(of))
    }

    pub fn non_null(of: TypeRef) -> Self {
        match of {
            // `T!!` is not representable in GraphQL.
            TypeRef::NonNull(_) => of,
            other => TypeRef::NonNull(Box::new(other)),
        }
    }

    /// Parses the SDL form: `ID`, `ID!`, `[Int!]!`, `[[String]]`, ...
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if let Some(inner) = source.strip_suffix('!') {
            if inner.ends_with('!') {
                return None;
            }
            return Self::parse(inner).map(Self::non_null);
        }
        if let Some(rest) = source.strip_prefix('[') {
            let inner = rest.strip_suffix(']')?;
            return Self::parse(inner).map(Self::list);
        }
        if source.is_empty() || source.contains(['[', ']', '!']) || !is_valid_graphql_name(source)
        {
            return None;
        }
        Some(TypeRef::Named(source.to_owned()))
    }

    /// The innermost named type, with every list/non-null wrapper removed.
    pub fn fully_unwrapped(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(of) | TypeRef::NonNull(of) => of.fully_unwrapped(),
        }
    }

    /// True when a list wrapper appears at any nesting depth.
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(of) => of.is_list(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// The reference with an outermost non-null wrapper removed, if any.
    pub fn unwrap_non_null(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(of) => of,
            other => other,
        }
    }

    /// For a list reference, the element reference (ignoring an outer `!`).
    pub fn list_element(&self) -> Option<&TypeRef> {
        match self.unwrap_non_null() {
            TypeRef::List(of) => Some(of),
            _ => None,
        }
    }

    /// Renames the innermost named type, preserving all wrappers.
    pub fn with_unwrapped_name(&self, name: &str) -> TypeRef {
        match self {
            TypeRef::Named(_) => TypeRef::Named(name.to_owned()),
            TypeRef::List(of) => TypeRef::List(Box::new(of.with_unwrapped_name(name))),
            TypeRef::NonNull(of) => TypeRef::NonNull(Box::new(of.with_unwrapped_name(name))),
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(of) => write!(f, "[{of}]"),
            TypeRef::NonNull(of) => write!(f, "{of}!"),
        }
    }
}

pub(crate) fn is_valid_graphql_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
