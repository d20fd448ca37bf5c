use core::any::Any;
use core::cell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
use core::fmt;
use std::rc::Rc;

use crate::context::RefId;
use crate::error::{Error, Result};
use crate::info::ModelInfo;
use crate::model::Model;

use super::{Persist, Value, ValueKind};

// -----------------------------------------------------------------------------
// ModelCell

/// Type-erased view of a `RefCell<T: Model>`.
trait ModelCell: Any {
    fn info(&self) -> &'static ModelInfo;

    fn try_model(&self) -> Result<Ref<'_, dyn Model>, BorrowError>;

    fn try_model_mut(&self) -> Result<RefMut<'_, dyn Model>, BorrowMutError>;

    fn addr(&self) -> usize;
}

impl<T: Model> ModelCell for RefCell<T> {
    fn info(&self) -> &'static ModelInfo {
        T::model_info()
    }

    fn try_model(&self) -> Result<Ref<'_, dyn Model>, BorrowError> {
        self.try_borrow().map(|r| Ref::map(r, |m| m as &dyn Model))
    }

    fn try_model_mut(&self) -> Result<RefMut<'_, dyn Model>, BorrowMutError> {
        self.try_borrow_mut()
            .map(|r| RefMut::map(r, |m| m as &mut dyn Model))
    }

    fn addr(&self) -> usize {
        self.as_ptr() as *const () as usize
    }
}

// -----------------------------------------------------------------------------
// Shared

/// A shared, mutable handle to a model.
///
/// Handles are identity-bearing: when the same handle is reached more than
/// once in a graph, it is written once and later occurrences become
/// back-references (or a `CircularReference` error when graph preservation is
/// disabled and the handle is its own ancestor).
///
/// Equality compares identity first, then content.
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T: Model> Shared<T> {
    #[inline]
    pub fn new(model: T) -> Self {
        Self(Rc::new(RefCell::new(model)))
    }

    /// Immutably borrows the model.
    ///
    /// # Panics
    ///
    /// Panics if the model is currently mutably borrowed.
    #[inline]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrows the model.
    ///
    /// # Panics
    ///
    /// Panics if the model is currently borrowed.
    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    #[inline]
    pub fn try_borrow(&self) -> Result<Ref<'_, T>> {
        self.0.try_borrow().map_err(|_| Error::Borrowed {
            type_path: T::model_info().type_path(),
        })
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The identity of the model inside this handle.
    #[inline]
    pub fn ref_id(&self) -> RefId {
        RefId::from_addr(self.0.addr())
    }

    /// Erases the model type; the result shares identity with `self`.
    #[inline]
    pub fn to_shared_model(&self) -> SharedModel {
        SharedModel(self.0.clone())
    }
}

impl<T> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Model + Default> Default for Shared<T> {
    #[inline]
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Model + PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.0.try_borrow(), other.0.try_borrow()) {
            (Ok(a), Ok(b)) => *a == *b,
            _ => false,
        }
    }
}

impl<T: Model> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared<{}>({:#x})", T::model_info().type_path(), self.0.addr())
    }
}

impl<T: Model> Persist for Shared<T> {
    fn value_kind() -> ValueKind {
        ValueKind::shared::<T>()
    }

    fn to_value(&self) -> Value {
        Value::Shared(self.to_shared_model())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Shared(shared) => {
                let found = shared.info().type_path();
                shared
                    .downcast::<T>()
                    .ok_or_else(|| Error::mismatch(T::model_info().type_path(), found))
            }
            Value::Model(model) => {
                let found = model.info().type_path();
                model
                    .downcast::<T>()
                    .map(|model| Self::new(*model))
                    .ok_or_else(|| Error::mismatch(T::model_info().type_path(), found))
            }
            other => Err(Error::mismatch(Self::value_kind().name(), other.kind_name())),
        }
    }
}

// -----------------------------------------------------------------------------
// SharedModel

/// A [`Shared`] handle with the model type erased.
#[derive(Clone)]
pub struct SharedModel(Rc<dyn ModelCell>);

impl SharedModel {
    #[inline]
    pub fn new<T: Model>(model: T) -> Self {
        Self(Rc::new(RefCell::new(model)))
    }

    #[inline]
    pub fn info(&self) -> &'static ModelInfo {
        self.0.info()
    }

    #[inline]
    pub fn ref_id(&self) -> RefId {
        RefId::from_addr(self.0.addr())
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.0.addr() == other.0.addr()
    }

    pub fn borrow(&self) -> Result<Ref<'_, dyn Model>> {
        self.0.try_model().map_err(|_| self.borrow_error())
    }

    pub fn borrow_mut(&self) -> Result<RefMut<'_, dyn Model>> {
        self.0.try_model_mut().map_err(|_| self.borrow_error())
    }

    /// Recovers the typed handle, sharing identity with `self`.
    pub fn downcast<T: Model>(&self) -> Option<Shared<T>> {
        let cell: Rc<dyn Any> = self.0.clone();
        cell.downcast::<RefCell<T>>().ok().map(Shared)
    }

    fn borrow_error(&self) -> Error {
        Error::Borrowed {
            type_path: self.info().type_path(),
        }
    }
}

impl<T: Model> From<Shared<T>> for SharedModel {
    #[inline]
    fn from(value: Shared<T>) -> Self {
        Self(value.0)
    }
}

impl fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedModel<{}>({:#x})", self.info().type_path(), self.0.addr())
    }
}

impl Persist for SharedModel {
    fn value_kind() -> ValueKind {
        ValueKind::AnyModel
    }

    fn to_value(&self) -> Value {
        Value::Shared(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Shared(shared) => Ok(shared),
            other => Err(Error::mismatch("shared model", other.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::derive::Model;
    use crate::value::{Persist, Shared, SharedModel, Value};

    #[derive(Model, Default, Clone, PartialEq, Debug)]
    struct Node {
        label: String,
    }

    #[derive(Model, Default, Clone, PartialEq, Debug)]
    struct Other {
        flag: bool,
    }

    #[test]
    fn erased_handle_keeps_identity() {
        let node = Shared::new(Node { label: "a".into() });
        let erased = node.to_shared_model();

        assert_eq!(erased.ref_id(), node.ref_id());
        assert!(erased.downcast::<Other>().is_none());

        let back = erased.downcast::<Node>().unwrap();
        assert!(back.ptr_eq(&node));

        back.borrow_mut().label.push('b');
        assert_eq!(node.borrow().label, "ab");
    }

    #[test]
    fn borrow_conflicts_are_errors() {
        let shared = SharedModel::new(Node::default());
        let _guard = shared.borrow_mut().unwrap();
        assert!(shared.borrow().is_err());
    }

    #[test]
    fn equality_is_identity_or_content() {
        let a = Shared::new(Node { label: "x".into() });
        let b = Shared::new(Node { label: "x".into() });
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));

        let restored = Shared::<Node>::from_value(a.to_value()).unwrap();
        assert!(restored.ptr_eq(&a));
        assert!(Shared::<Node>::from_value(Value::Null).is_err());
    }
}
