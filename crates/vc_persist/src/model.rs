use core::any::Any;

use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::info::ModelInfo;
use crate::value::{Persist, Value, ValueKind, ValueRef};

// -----------------------------------------------------------------------------
// Model

/// A type that describes its own members.
///
/// This is the capability the engine walks: [`ModelInfo`] lists the members,
/// `get_member` / `set_member` move their values in and out as [`Value`]s.
/// It is usually derived:
///
/// ```
/// use vc_persist::{Model, derive::Model};
///
/// #[derive(Model, Default, Clone)]
/// struct Point { x: i32, y: i32 }
///
/// let mut p = Point::default();
/// p.set_member("x", vc_persist::Persist::to_value(&4)).unwrap();
/// assert_eq!(p.x, 4);
/// assert!(p.get_member("z").is_none());
/// ```
pub trait Model: Any {
    fn model_info() -> &'static ModelInfo
    where
        Self: Sized;

    /// Same as [`Model::model_info`], callable on trait objects.
    fn info(&self) -> &'static ModelInfo;

    /// Reads the member `name`, including members inherited from the base.
    fn get_member(&self, name: &str) -> Option<Value>;

    /// Reads the member `name` with value-typed models borrowed from `self`.
    fn member_ref(&self, name: &str) -> Option<ValueRef<'_>> {
        self.get_member(name).map(ValueRef::Owned)
    }

    /// Assigns the member `name`, including members inherited from the base.
    fn set_member(&mut self, name: &str, value: Value) -> Result<()>;

    fn clone_model(&self) -> Box<dyn Model>;

    /// Returns `Some` for custom-serializable models.
    fn as_custom(&self) -> Option<&dyn CustomSerialize> {
        None
    }

    fn as_custom_mut(&mut self) -> Option<&mut dyn CustomSerialize> {
        None
    }
}

impl dyn Model {
    #[inline]
    pub fn is<T: Model>(&self) -> bool {
        let any: &dyn Any = self;
        any.is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Model>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref()
    }

    #[inline]
    pub fn downcast_mut<T: Model>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self;
        any.downcast_mut()
    }

    #[inline]
    pub fn downcast<T: Model>(self: Box<Self>) -> Option<Box<T>> {
        let any: Box<dyn Any> = self;
        any.downcast().ok()
    }
}

// -----------------------------------------------------------------------------
// ObjectAdapter

/// Reads and writes named members on a model instance.
///
/// The engine never touches members directly; replacing the adapter lets a
/// host route values through its own property storage.
pub trait ObjectAdapter: Send + Sync {
    fn get_member_value(&self, model: &dyn Model, name: &str) -> Option<Value>;

    /// Borrowing counterpart of `get_member_value`, used while writing when
    /// no hook or converter sees the value.
    fn member_value_ref<'m>(&self, model: &'m dyn Model, name: &str) -> Option<ValueRef<'m>> {
        self.get_member_value(model, name).map(ValueRef::Owned)
    }

    fn set_member_value(&self, model: &mut dyn Model, name: &str, value: Value) -> Result<()>;
}

/// The default adapter, delegating to [`Model::get_member`] and
/// [`Model::set_member`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelAdapter;

impl ObjectAdapter for ModelAdapter {
    #[inline]
    fn get_member_value(&self, model: &dyn Model, name: &str) -> Option<Value> {
        model.get_member(name)
    }

    #[inline]
    fn member_value_ref<'m>(&self, model: &'m dyn Model, name: &str) -> Option<ValueRef<'m>> {
        model.member_ref(name)
    }

    #[inline]
    fn set_member_value(&self, model: &mut dyn Model, name: &str, value: Value) -> Result<()> {
        model.set_member(name, value)
    }
}

// -----------------------------------------------------------------------------
// Custom serialization

/// A model that writes and reads its own members.
///
/// The engine still emits the object frame (type name and identity); only the
/// members in between are delegated. Members must be read back in the order
/// they were written.
///
/// Enable it with `#[persist(custom)]` on the type.
pub trait CustomSerialize {
    fn serialize_custom(&self, writer: &mut CustomWriter<'_, '_>) -> Result<()>;

    fn deserialize_custom(&mut self, reader: &mut CustomReader<'_, '_>) -> Result<()>;
}

pub(crate) trait ValueSink {
    fn write_member(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: &str,
        value: &Value,
        kind: &ValueKind,
    ) -> Result<()>;
}

pub(crate) trait ValueSource {
    fn next_member(&mut self, cx: &mut SerializationContext<'_>) -> Result<Option<String>>;

    fn read_value(&mut self, cx: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Value>;

    fn skip_value(&mut self, cx: &mut SerializationContext<'_>) -> Result<()>;
}

/// Writes named members of a custom-serializable model.
pub struct CustomWriter<'a, 'c> {
    sink: &'a mut dyn ValueSink,
    cx: &'a mut SerializationContext<'c>,
}

impl<'a, 'c> CustomWriter<'a, 'c> {
    pub(crate) fn new(sink: &'a mut dyn ValueSink, cx: &'a mut SerializationContext<'c>) -> Self {
        Self { sink, cx }
    }

    pub fn context(&self) -> &SerializationContext<'c> {
        self.cx
    }

    pub fn write<T: Persist>(&mut self, name: &str, value: &T) -> Result<()> {
        self.write_value(name, &value.to_value(), &T::value_kind())
    }

    pub fn write_value(&mut self, name: &str, value: &Value, kind: &ValueKind) -> Result<()> {
        self.sink
            .write_member(self.cx, name, value, kind)
            .map_err(|e| e.in_member(name))
    }
}

/// Reads back the members written by [`CustomWriter`].
pub struct CustomReader<'a, 'c> {
    source: &'a mut dyn ValueSource,
    cx: &'a mut SerializationContext<'c>,
}

impl<'a, 'c> CustomReader<'a, 'c> {
    pub(crate) fn new(source: &'a mut dyn ValueSource, cx: &'a mut SerializationContext<'c>) -> Self {
        Self { source, cx }
    }

    pub fn context(&self) -> &SerializationContext<'c> {
        self.cx
    }

    /// Reads the next member, which must be called `name`.
    pub fn read<T: Persist>(&mut self, name: &str) -> Result<T> {
        match self.next_member()? {
            Some(found) if found == name => self.read_value::<T>().map_err(|e| e.in_member(name)),
            Some(found) => Err(Error::format(format!(
                "expected member `{name}`, found `{found}`"
            ))),
            None => Err(Error::format(format!(
                "expected member `{name}`, found end of object"
            ))),
        }
    }

    /// Advances to the next member and returns its name, `None` at the end.
    pub fn next_member(&mut self) -> Result<Option<String>> {
        self.source.next_member(self.cx)
    }

    /// Reads the value of the member returned by the last `next_member`.
    pub fn read_value<T: Persist>(&mut self) -> Result<T> {
        let value = self.source.read_value(self.cx, &T::value_kind())?;
        T::from_value(value)
    }

    /// Skips the value of the member returned by the last `next_member`.
    pub fn skip(&mut self) -> Result<()> {
        self.source.skip_value(self.cx)
    }
}
