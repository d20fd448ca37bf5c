use log::debug;

use crate::error::{Error, Result};
use crate::hash::{HashMap, HashSet};
use crate::info::TypeKey;

use super::ModelRegistry;

/// Maps type keys found in old streams to the keys of current types.
///
/// Entries come from `#[persist(redirect_from(..))]` declarations (see
/// [`TypeRedirector::from_registry`]) or are added by hand. The table is built
/// once and only read while deserializing.
///
/// ```
/// # use vc_persist::{TypeKey, TypeRedirector};
/// let mut redirects = TypeRedirector::new();
/// redirects.add(TypeKey::new("Old", "Foo"), TypeKey::new("Mid", "Foo"));
/// redirects.add(TypeKey::new("Mid", "Foo"), TypeKey::new("New", "Bar"));
///
/// let resolved = redirects.resolve(&TypeKey::new("Old", "Foo")).unwrap();
/// assert_eq!(resolved, Some(TypeKey::new("New", "Bar")));
/// ```
#[derive(Debug, Default, Clone)]
pub struct TypeRedirector {
    table: HashMap<TypeKey, TypeKey>,
}

impl TypeRedirector {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the redirects declared by every registered model.
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let mut redirector = Self::new();
        for info in registry.iter() {
            for from in info.redirects() {
                redirector.add(from.clone(), info.key().clone());
            }
        }
        redirector
    }

    /// Adds an entry, returning the target it replaces.
    pub fn add(&mut self, from: TypeKey, to: TypeKey) -> Option<TypeKey> {
        debug!("redirect `{from}` -> `{to}`");
        self.table.insert(from, to)
    }

    /// Follows the chain starting at `key` to its end.
    ///
    /// Returns `None` when `key` has no entry.
    pub fn resolve(&self, key: &TypeKey) -> Result<Option<TypeKey>> {
        let mut visited = HashSet::default();
        visited.insert(key);

        let mut resolved = None;
        let mut current = key;
        while let Some(next) = self.table.get(current) {
            if !visited.insert(next) {
                return Err(Error::RedirectCycle {
                    origin: key.clone(),
                    revisited: next.clone(),
                });
            }
            resolved = Some(next);
            current = next;
        }
        Ok(resolved.cloned())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
