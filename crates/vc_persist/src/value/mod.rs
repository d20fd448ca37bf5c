//! Dynamic values exchanged between models, the engine and the backends.
//!
//! - [`Value`]: one member value, as read from or written to a model.
//! - [`ValueRef`]: a member value that borrows nested models in place.
//! - [`ValueKind`]: the declared type of a member, used as a hint when reading.
//! - [`Persist`]: conversion between Rust types and [`Value`].
//! - [`Shared`], [`SharedModel`]: identity-bearing model handles.

use core::any::TypeId;
use core::fmt;
use std::borrow::Cow;

use crate::info::{EnumInfo, ModelInfo};
use crate::model::Model;

// -----------------------------------------------------------------------------
// Modules

mod persist;
mod shared;

// -----------------------------------------------------------------------------
// Exports

pub use persist::{Persist, PersistEnum};
pub use shared::{Shared, SharedModel};

// -----------------------------------------------------------------------------
// Literal

/// A scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Str(String),
}

impl Literal {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "signed integer",
            Self::UInt(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => v.fmt(f),
            Self::Int(v) => v.fmt(f),
            Self::UInt(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Char(v) => v.fmt(f),
            Self::Str(v) => v.fmt(f),
        }
    }
}

// -----------------------------------------------------------------------------
// EnumValue

/// A variant of a field-less enum.
#[derive(Clone, Copy)]
pub struct EnumValue {
    info: &'static EnumInfo,
    index: usize,
}

impl EnumValue {
    /// Returns `None` if `index` is out of range.
    #[inline]
    pub fn new(info: &'static EnumInfo, index: usize) -> Option<Self> {
        (index < info.variants().len()).then_some(Self { info, index })
    }

    #[inline]
    pub fn info(&self) -> &'static EnumInfo {
        self.info
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.info.variants()[self.index].name
    }

    #[inline]
    pub fn discriminant(&self) -> i64 {
        self.info.variants()[self.index].discriminant
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.info.type_id() == other.info.type_id() && self.index == other.index
    }
}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.info.type_path(), self.name())
    }
}

// -----------------------------------------------------------------------------
// Value

/// One member value.
///
/// Models appear either with value semantics ([`Value::Model`], a private copy)
/// or with reference semantics ([`Value::Shared`], an identity-bearing handle
/// that may be reached several times in one graph).
pub enum Value {
    Null,
    Literal(Literal),
    Enum(EnumValue),
    List(Vec<Value>),
    Model(Box<dyn Model>),
    Shared(SharedModel),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// A short description used in mismatch errors.
    pub fn kind_name(&self) -> Cow<'static, str> {
        match self {
            Self::Null => Cow::Borrowed("null"),
            Self::Literal(literal) => Cow::Borrowed(literal.kind_name()),
            Self::Enum(value) => Cow::Borrowed(value.info().type_path()),
            Self::List(_) => Cow::Borrowed("list"),
            Self::Model(model) => Cow::Borrowed(model.info().type_path()),
            Self::Shared(shared) => Cow::Owned(format!("shared {}", shared.info().type_path())),
        }
    }

    #[inline]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }
}

impl From<Literal> for Value {
    #[inline]
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Literal(literal) => Self::Literal(literal.clone()),
            Self::Enum(value) => Self::Enum(*value),
            Self::List(items) => Self::List(items.clone()),
            Self::Model(model) => Self::Model(model.clone_model()),
            Self::Shared(shared) => Self::Shared(shared.clone()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Literal(literal) => literal.fmt(f),
            Self::Enum(value) => value.fmt(f),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Model(model) => write!(f, "Model({})", model.info().type_path()),
            Self::Shared(shared) => shared.fmt(f),
        }
    }
}

// -----------------------------------------------------------------------------
// ValueRef

/// A member value read without copying the value-typed models inside it.
///
/// Serialization walks nested models through this view when nothing needs an
/// owned [`Value`], so writing a deep value tree touches each model once.
pub enum ValueRef<'a> {
    Owned(Value),
    Model(&'a dyn Model),
    List(Vec<ValueRef<'a>>),
}

impl ValueRef<'_> {
    pub fn into_owned(self) -> Value {
        match self {
            Self::Owned(value) => value,
            Self::Model(model) => Value::Model(model.clone_model()),
            Self::List(items) => Value::List(items.into_iter().map(ValueRef::into_owned).collect()),
        }
    }
}

impl From<Value> for ValueRef<'_> {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Owned(value)
    }
}

impl fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(value) => value.fmt(f),
            Self::Model(model) => write!(f, "&{}", model.info().type_path()),
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

// -----------------------------------------------------------------------------
// ValueKind

/// Lazily resolved reference to a model description.
///
/// Resolution is deferred so that a type can mention itself in its own
/// member list.
#[derive(Clone, Copy)]
pub struct ModelKind(fn() -> &'static ModelInfo);

impl ModelKind {
    #[inline]
    pub fn of<T: Model>() -> Self {
        Self(T::model_info)
    }

    #[inline]
    pub fn info(&self) -> &'static ModelInfo {
        (self.0)()
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.info().type_id()
    }
}

/// The declared type of a member.
#[derive(Clone)]
pub enum ValueKind {
    Bool,
    Int,
    UInt,
    Float,
    Char,
    String,
    Enum(&'static EnumInfo),
    /// A model with value semantics.
    Model(ModelKind),
    /// A model behind a [`Shared`] handle.
    Shared(ModelKind),
    /// Any registered model, always read back as a shared handle.
    AnyModel,
    Optional(Box<ValueKind>),
    List(Box<ValueKind>),
}

impl ValueKind {
    #[inline]
    pub fn model<T: Model>() -> Self {
        Self::Model(ModelKind::of::<T>())
    }

    #[inline]
    pub fn shared<T: Model>() -> Self {
        Self::Shared(ModelKind::of::<T>())
    }

    /// Strips any number of `Optional` layers.
    pub fn required(&self) -> &ValueKind {
        let mut kind = self;
        while let Self::Optional(inner) = kind {
            kind = inner;
        }
        kind
    }

    /// Strips `Optional` and `List` layers down to the element type.
    pub fn element(&self) -> &ValueKind {
        let mut kind = self;
        loop {
            match kind {
                Self::Optional(inner) | Self::List(inner) => kind = inner,
                _ => return kind,
            }
        }
    }

    /// The enum this kind refers to, looking through options and lists.
    pub fn enum_info(&self) -> Option<&'static EnumInfo> {
        match self.element() {
            Self::Enum(info) => Some(info),
            _ => None,
        }
    }

    /// The model this kind refers to, looking through options and lists.
    pub fn model_info(&self) -> Option<&'static ModelInfo> {
        match self.element() {
            Self::Model(kind) | Self::Shared(kind) => Some(kind.info()),
            _ => None,
        }
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Bool => Cow::Borrowed("bool"),
            Self::Int => Cow::Borrowed("signed integer"),
            Self::UInt => Cow::Borrowed("unsigned integer"),
            Self::Float => Cow::Borrowed("float"),
            Self::Char => Cow::Borrowed("char"),
            Self::String => Cow::Borrowed("string"),
            Self::Enum(info) => Cow::Borrowed(info.type_path()),
            Self::Model(kind) => Cow::Borrowed(kind.info().type_path()),
            Self::Shared(kind) => Cow::Owned(format!("shared {}", kind.info().type_path())),
            Self::AnyModel => Cow::Borrowed("any model"),
            Self::Optional(inner) => Cow::Owned(format!("optional {}", inner.name())),
            Self::List(inner) => Cow::Owned(format!("list of {}", inner.name())),
        }
    }
}

impl fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::{Literal, ValueKind};

    #[test]
    fn kind_layers() {
        let kind = ValueKind::Optional(Box::new(ValueKind::List(Box::new(ValueKind::Char))));

        assert!(matches!(kind.required(), ValueKind::List(_)));
        assert!(matches!(kind.element(), ValueKind::Char));
        assert_eq!(kind.name(), "optional list of char");
        assert!(kind.model_info().is_none());
    }

    #[test]
    fn literal_display() {
        assert_eq!(Literal::Str("a b".into()).to_string(), "a b");
        assert_eq!(Literal::Int(-3).to_string(), "-3");
        assert_eq!(Literal::Char('x').kind_name(), "char");
    }
}
