use crate::error::{Error, Result};
use crate::info::EnumInfo;

use super::{EnumValue, Literal, Value, ValueKind, ValueRef};

// -----------------------------------------------------------------------------
// Persist

/// Conversion between a Rust type and [`Value`].
///
/// Every member type of a model implements it. It is provided for the
/// primitives, `String`, `Option`, `Vec` and the shared handles, and derived
/// for models (`#[derive(Model)]`) and enums (`#[derive(PersistEnum)]`).
///
/// `from_value` is lenient where no information is lost: integers of either
/// sign are accepted if they fit, floats accept integers and a one-character
/// string is a valid `char`.
pub trait Persist: Sized {
    /// The declared type, used as a hint by backends that store untyped text.
    fn value_kind() -> ValueKind;

    fn to_value(&self) -> Value;

    /// Like `to_value`, but nested models may stay borrowed.
    #[inline]
    fn to_value_ref(&self) -> ValueRef<'_> {
        ValueRef::Owned(self.to_value())
    }

    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T: Persist>(value: &Value) -> Error {
    Error::mismatch(T::value_kind().name(), value.kind_name())
}

impl Persist for bool {
    fn value_kind() -> ValueKind {
        ValueKind::Bool
    }

    fn to_value(&self) -> Value {
        Value::Literal(Literal::Bool(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Bool(v)) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

fn out_of_range(ty: &'static str, value: impl ToString) -> Error {
    Error::mismatch(ty, format!("out-of-range value {}", value.to_string()))
}

macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl Persist for $ty {
            fn value_kind() -> ValueKind {
                ValueKind::Int
            }

            fn to_value(&self) -> Value {
                Value::Literal(Literal::Int(*self as i64))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Literal(Literal::Int(v)) => {
                        <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v))
                    }
                    Value::Literal(Literal::UInt(v)) => {
                        <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v))
                    }
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl Persist for $ty {
            fn value_kind() -> ValueKind {
                ValueKind::UInt
            }

            fn to_value(&self) -> Value {
                Value::Literal(Literal::UInt(*self as u64))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Literal(Literal::UInt(v)) => {
                        <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v))
                    }
                    Value::Literal(Literal::Int(v)) => {
                        <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v))
                    }
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64, isize);
impl_unsigned!(u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($ty:ty),*) => {$(
        impl Persist for $ty {
            fn value_kind() -> ValueKind {
                ValueKind::Float
            }

            fn to_value(&self) -> Value {
                Value::Literal(Literal::Float(f64::from(*self)))
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Literal(Literal::Float(v)) => Ok(v as $ty),
                    Value::Literal(Literal::Int(v)) => Ok(v as $ty),
                    Value::Literal(Literal::UInt(v)) => Ok(v as $ty),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    )*};
}

impl_float!(f32, f64);

impl Persist for char {
    fn value_kind() -> ValueKind {
        ValueKind::Char
    }

    fn to_value(&self) -> Value {
        Value::Literal(Literal::Char(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Char(v)) => Ok(v),
            Value::Literal(Literal::Str(ref s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(Error::mismatch("char", format!("string `{s}`"))),
                }
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Persist for String {
    fn value_kind() -> ValueKind {
        ValueKind::String
    }

    fn to_value(&self) -> Value {
        Value::Literal(Literal::Str(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Str(v)) => Ok(v),
            Value::Literal(Literal::Char(v)) => Ok(v.to_string()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Persist> Persist for Option<T> {
    fn value_kind() -> ValueKind {
        ValueKind::Optional(Box::new(T::value_kind()))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn to_value_ref(&self) -> ValueRef<'_> {
        match self {
            Some(v) => v.to_value_ref(),
            None => ValueRef::Owned(Value::Null),
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn value_kind() -> ValueKind {
        ValueKind::List(Box::new(T::value_kind()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(Persist::to_value).collect())
    }

    fn to_value_ref(&self) -> ValueRef<'_> {
        ValueRef::List(self.iter().map(Persist::to_value_ref).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| e.in_member(&format!("[{i}]"))))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

// -----------------------------------------------------------------------------
// PersistEnum

/// Access to the variants of a field-less enum.
///
/// Derived by `#[derive(PersistEnum)]`, which also implements [`Persist`]
/// through [`PersistEnum::to_enum_value`] and [`PersistEnum::from_enum_value`].
pub trait PersistEnum: Sized + 'static {
    fn enum_info() -> &'static EnumInfo;

    /// Position of `self` in [`EnumInfo::variants`].
    fn variant_index(&self) -> usize;

    fn from_variant_index(index: usize) -> Option<Self>;

    fn to_enum_value(&self) -> Value {
        match EnumValue::new(Self::enum_info(), self.variant_index()) {
            Some(value) => Value::Enum(value),
            None => Value::Null,
        }
    }

    fn from_enum_value(value: Value) -> Result<Self> {
        let info = Self::enum_info();
        match value {
            Value::Enum(v) if v.info().type_id() == info.type_id() => Self::from_variant_index(v.index())
                .ok_or_else(|| unknown_variant(info, v.index())),
            other => Err(Error::mismatch(info.type_path(), other.kind_name())),
        }
    }
}

fn unknown_variant(info: &'static EnumInfo, index: usize) -> Error {
    Error::UnknownEnumValue {
        enum_path: info.type_path(),
        value: format!("#{index}"),
        member: None,
    }
}
