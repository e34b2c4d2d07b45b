use std::{cmp::Ordering, fmt::Display, sync::Arc};
use thiserror::Error;

/// The type that represents (logical) time of observations.
pub type Timestamp = u64;

/// Identifier of the dynamic execution context (thread, call-stack instance) producing an event.
pub type ContextId = u64;

/// Integer values.
pub type Integer = i64;

/// Floating-point values.
pub type Float = f64;

/// The types of [`Val`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean type.
    Boolean,
    /// Integer type.
    Integer,
    /// Floating-point type.
    Float,
    /// String type.
    Text,
    /// Opaque reference type (e.g., an object identity).
    Ref,
}

impl Type {
    /// Parses the name used by specification sources (`bool`, `int`, `float`, `str`, `ref`).
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "bool" => Some(Type::Boolean),
            "int" => Some(Type::Integer),
            "float" => Some(Type::Float),
            "str" => Some(Type::Text),
            "ref" => Some(Type::Ref),
            _ => None,
        }
    }

    #[inline(always)]
    fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Float)
    }

    /// Whether values of the two types can be compared for equality.
    pub fn comparable(self, other: Type) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    /// Whether values of the type admit an ordering (`<`, `<=`, `>`, `>=`).
    pub fn ordered(self) -> bool {
        matches!(self, Type::Integer | Type::Float | Type::Text)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Type::Boolean => "bool",
            Type::Integer => "int",
            Type::Float => "float",
            Type::Text => "str",
            Type::Ref => "ref",
        };
        write!(f, "{name}")
    }
}

/// Error comparing values of incompatible types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The two types cannot be compared.
    #[error("cannot compare {0} with {1}")]
    Incomparable(Type, Type),
}

/// A runtime value recorded by an observation event.
///
/// Values are immutable once recorded: cloning a [`Val::Text`] shares the underlying string.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(Integer),
    /// Floating-point value.
    Float(Float),
    /// String value.
    Text(Arc<str>),
    /// Opaque reference.
    Ref(u64),
}

impl Val {
    /// The [`Type`] of the value.
    pub fn r#type(&self) -> Type {
        match self {
            Val::Boolean(_) => Type::Boolean,
            Val::Integer(_) => Type::Integer,
            Val::Float(_) => Type::Float,
            Val::Text(_) => Type::Text,
            Val::Ref(_) => Type::Ref,
        }
    }

    /// Converts the value to be stored where type `ty` is declared,
    /// returning `None` if the declared type does not accept it.
    pub fn coerce(self, ty: Type) -> Option<Val> {
        match (ty, self) {
            (Type::Float, Val::Integer(i)) => Some(Val::Float(i as Float)),
            (ty, val) if val.r#type() == ty => Some(val),
            _ => None,
        }
    }

    /// Compares two values.
    ///
    /// Returns `Ok(None)` when the values are comparable but unordered,
    /// i.e., distinct booleans or references, or `NaN` floats.
    pub fn compare(&self, other: &Val) -> Result<Option<Ordering>, TypeError> {
        match (self, other) {
            (Val::Integer(lhs), Val::Integer(rhs)) => Ok(Some(lhs.cmp(rhs))),
            (Val::Float(lhs), Val::Float(rhs)) => Ok(lhs.partial_cmp(rhs)),
            (Val::Integer(lhs), Val::Float(rhs)) => Ok((*lhs as Float).partial_cmp(rhs)),
            (Val::Float(lhs), Val::Integer(rhs)) => Ok(lhs.partial_cmp(&(*rhs as Float))),
            (Val::Text(lhs), Val::Text(rhs)) => Ok(Some(lhs.cmp(rhs))),
            (Val::Boolean(lhs), Val::Boolean(rhs)) => Ok((lhs == rhs).then_some(Ordering::Equal)),
            (Val::Ref(lhs), Val::Ref(rhs)) => Ok((lhs == rhs).then_some(Ordering::Equal)),
            _ => Err(TypeError::Incomparable(self.r#type(), other.r#type())),
        }
    }
}

impl Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Boolean(b) => write!(f, "{b}"),
            Val::Integer(i) => write!(f, "{i}"),
            Val::Float(x) => write!(f, "{x:?}"),
            Val::Text(s) => write!(f, "{s:?}"),
            Val::Ref(r) => write!(f, "#{r}"),
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Boolean(value)
    }
}

impl From<Integer> for Val {
    fn from(value: Integer) -> Self {
        Val::Integer(value)
    }
}

impl From<Float> for Val {
    fn from(value: Float) -> Self {
        Val::Float(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::Text(Arc::from(value))
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Val::Text(Arc::from(value))
    }
}
