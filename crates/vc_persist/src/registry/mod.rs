//! Model registration and legacy type redirection.
//!
//! Deserialization can only instantiate types it knows: every model that may
//! appear in a stream must be in the [`ModelRegistry`] of the engine, either
//! explicitly or via `#[persist(auto_register)]`.

use core::any::TypeId;

use log::warn;

use crate::hash::{HashMap, HashSet};
use crate::info::{ModelInfo, TypeKey};
use crate::model::Model;
use crate::value::ValueKind;

// -----------------------------------------------------------------------------
// Modules

mod redirect;

// -----------------------------------------------------------------------------
// Exports

pub use redirect::TypeRedirector;

// -----------------------------------------------------------------------------
// ModelRegistry

/// The set of models a stream may contain, indexed by type id and by
/// persisted [`TypeKey`].
///
/// Two distinct types with the same key make that key ambiguous: it no longer
/// resolves, and a warning is logged when the collision is registered.
#[derive(Default, Debug)]
pub struct ModelRegistry {
    by_id: HashMap<TypeId, &'static ModelInfo>,
    by_key: HashMap<TypeKey, TypeId>,
    ambiguous: HashSet<TypeKey>,
}

impl ModelRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, its base models and the models its members refer to.
    pub fn register<T: Model>(&mut self) -> &mut Self {
        self.register_info(T::model_info());
        self
    }

    /// Same as [`ModelRegistry::register`] from a description.
    ///
    /// Returns `false` if the type was already registered.
    pub fn register_info(&mut self, info: &'static ModelInfo) -> bool {
        if self.by_id.contains_key(&info.type_id()) {
            return false;
        }
        self.by_id.insert(info.type_id(), info);

        let key = info.key().clone();
        match self.by_key.get(&key) {
            Some(&other) if other != info.type_id() => {
                warn!(
                    "type key `{key}` of `{}` is already used by `{}`",
                    info.type_path(),
                    self.by_id.get(&other).map_or("?", |i| i.type_path()),
                );
                self.ambiguous.insert(key);
            }
            Some(_) => {}
            None => {
                self.by_key.insert(key, info.type_id());
            }
        }

        if let Some(base) = info.base() {
            self.register_info(base);
        }
        for field in info.fields() {
            if let Some(kind) = field.kind() {
                self.register_kind(&kind);
            }
        }
        true
    }

    fn register_kind(&mut self, kind: &ValueKind) {
        if let Some(info) = kind.model_info() {
            self.register_info(info);
        }
    }

    /// Registers every type declared with `#[persist(auto_register)]` in the
    /// linked binary.
    #[cfg(feature = "auto_register")]
    pub fn auto_register(&mut self) -> &mut Self {
        use crate::__macro_exports::auto_register::{__AutoRegisterFunc, inventory};

        for func in inventory::iter::<__AutoRegisterFunc> {
            (func.0)(self);
        }
        self
    }

    #[inline]
    pub fn get(&self, type_id: TypeId) -> Option<&'static ModelInfo> {
        self.by_id.get(&type_id).copied()
    }

    /// Looks up a type by its persisted key. Ambiguous keys resolve to nothing.
    pub fn get_with_key(&self, key: &TypeKey) -> Option<&'static ModelInfo> {
        if self.ambiguous.contains(key) {
            return None;
        }
        self.by_key.get(key).and_then(|id| self.get(*id))
    }

    #[inline]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.by_id.contains_key(&type_id)
    }

    #[inline]
    pub fn is_ambiguous(&self, key: &TypeKey) -> bool {
        self.ambiguous.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ModelInfo> + '_ {
        self.by_id.values().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ModelRegistry;
    use crate::derive::Model;
    use crate::{Model as _, Shared, TypeKey};

    #[derive(Model, Default, Clone)]
    struct Wheel {
        size: u8,
    }

    #[derive(Model, Default, Clone)]
    struct Vehicle {
        wheels: Vec<Wheel>,
    }

    #[derive(Model, Default, Clone)]
    #[persist(type_name = "Vehicle")]
    struct Car {
        #[persist(base)]
        vehicle: Vehicle,
        trailer: Option<Shared<Car>>,
    }

    mod other {
        #[derive(crate::derive::Model, Default, Clone)]
        pub struct Wheel {
            pub spokes: u8,
        }
    }

    #[test]
    fn registers_reachable_models() {
        let mut registry = ModelRegistry::new();
        registry.register::<Car>();

        assert_eq!(registry.len(), 3);
        assert!(registry.get(Wheel::model_info().type_id()).is_some());
    }

    #[test]
    fn colliding_keys_are_ambiguous() {
        let mut registry = ModelRegistry::new();
        registry.register::<Car>();

        let key = Vehicle::model_info().key().clone();
        assert_eq!(key.name(), "Vehicle");
        assert!(registry.is_ambiguous(&key));
        assert!(registry.get_with_key(&key).is_none());

        let wheel = TypeKey::new(env!("CARGO_PKG_NAME"), "Wheel");
        assert_eq!(registry.get_with_key(&wheel).unwrap().type_path(), Wheel::model_info().type_path());

        registry.register::<other::Wheel>();
        assert!(registry.get_with_key(&wheel).is_none());
    }

    #[cfg(feature = "auto_register")]
    #[derive(Model, Default, Clone)]
    #[persist(auto_register)]
    struct Beacon {
        signal: u8,
    }

    #[cfg(feature = "auto_register")]
    #[test]
    fn auto_register_collects_annotated_models() {
        let mut registry = ModelRegistry::new();
        registry.auto_register();

        assert!(registry.contains(Beacon::model_info().type_id()));
        assert!(!registry.contains(Wheel::model_info().type_id()));
    }
}
