use crate::auth::AuthContext;
use crate::collections::FieldKind;

/// A scalar a rule can compare.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Bool(bool),
    Number(f64),
}

impl Value {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(FieldKind::Text),
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Number(_) => Some(FieldKind::Number),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Bool(b) => !b,
            Self::Number(n) => *n == 0.0,
        }
    }

    /// Equality where an unset value equals the zero value of any kind.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, v) | (v, Self::Null) => v.is_zero(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(&self, equal: bool) -> bool {
        match self {
            Self::Eq => equal,
            Self::Ne => !equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A record field, already resolved against the collection catalogue.
    Field { name: String, kind: FieldKind },
    /// `@request.auth.id`
    AuthId,
    /// `@request.auth.role`
    AuthRole,
    Literal(Value),
}

/// An operand with the request context substituted in.
#[derive(Debug, Clone, PartialEq)]
pub enum Side<'e> {
    Constant(Value),
    /// `@request.auth.id` of a caller without a session.
    AnonymousId,
    Field { name: &'e str, kind: FieldKind },
}

impl Operand {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Field { kind, .. } => Some(*kind),
            Self::AuthId | Self::AuthRole => Some(FieldKind::Text),
            Self::Literal(v) => v.kind(),
        }
    }

    pub fn resolve(&self, auth: &AuthContext) -> Side<'_> {
        match self {
            Self::Field { name, kind } => Side::Field { name, kind: *kind },
            Self::AuthId => match auth.user_id {
                Some(id) => Side::Constant(Value::Text(id.to_string())),
                None => Side::AnonymousId,
            },
            Self::AuthRole => Side::Constant(auth.role.map(|r| r.as_str()).into()),
            Self::Literal(v) => Side::Constant(v.clone()),
        }
    }
}

/// Parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}
