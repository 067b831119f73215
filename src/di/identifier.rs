use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// An opaque, optionally named identity.
///
/// Tokens stand in for a concrete type when the type is ambiguous (several
/// records built from the same struct) or unavailable (trait objects,
/// pre-built values). Two tokens are equal only if one is a clone of the
/// other, regardless of their names.
#[derive(Clone)]
pub struct Token {
    id: Uuid,
    name: Option<Arc<str>>,
}

impl Token {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
        }
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Some(name.into()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Key of a service record within one category.
#[derive(Clone)]
pub enum ServiceId {
    Type { id: TypeId, name: &'static str },
    Token(Token),
    Name(Arc<str>),
}

impl ServiceId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Self::Type { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Last path segment of the type name, without generics.
    pub fn short_name(&self) -> String {
        match self {
            Self::Type { name, .. } => short_type_name(name).to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Type { id: a, .. }, Self::Type { id: b, .. }) => a == b,
            (Self::Token(a), Self::Token(b)) => a == b,
            (Self::Name(a), Self::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ServiceId {}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Type { id, .. } => id.hash(state),
            Self::Token(token) => token.hash(state),
            Self::Name(name) => name.hash(state),
        }
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => write!(f, "Type({})", name),
            Self::Token(token) => write!(f, "{:?}", token),
            Self::Name(name) => write!(f, "Name({})", name),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.write_str(name),
            Self::Token(token) => write!(f, "{}", token),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<Token> for ServiceId {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<&Token> for ServiceId {
    fn from(token: &Token) -> Self {
        Self::Token(token.clone())
    }
}

impl From<&str> for ServiceId {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

impl From<String> for ServiceId {
    fn from(name: String) -> Self {
        Self::Name(name.into())
    }
}

/// `my_app::db::Pg` -> `Pg`; generics are dropped, so
/// `alloc::sync::Arc<my_app::db::Pg>` -> `Arc`.
pub(crate) fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;

    #[test]
    fn test_tokens_compare_by_identity() {
        let a = Token::named("db");
        let b = Token::named("db");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), "db");
    }

    #[test]
    fn test_type_ids_ignore_name() {
        assert_eq!(ServiceId::of::<Database>(), ServiceId::of::<Database>());
        assert_ne!(ServiceId::of::<Database>(), ServiceId::from("Database"));
        assert_eq!(ServiceId::of::<Database>().short_name(), "Database");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("alloc::sync::Arc<app::Pg>"), "Arc");
        assert_eq!(short_type_name("app::db::Pg"), "Pg");
        assert_eq!(short_type_name("Pg"), "Pg");
    }
}
