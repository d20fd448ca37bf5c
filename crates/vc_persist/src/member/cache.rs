use core::any::TypeId;
use core::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::error::{Error, Result};
use crate::hash::{HashMap, HashSet};
use crate::info::ModelInfo;
use crate::model::Model;
use crate::value::ValueKind;

use super::{MemberDescriptor, MemberFlags, TypeMemberMap};

type Listener = Box<dyn Fn(TypeId) + Send + Sync>;

#[derive(Default)]
struct CacheState {
    maps: HashMap<TypeId, Arc<TypeMemberMap>>,
    /// Base type -> cached types built on it.
    dependents: HashMap<TypeId, HashSet<TypeId>>,
}

/// Per-type cache of resolved member sets.
///
/// The first caller for a type computes its members outside the lock and
/// publishes them; callers racing on the same type compute equal results and
/// all observe the one that was published first. Published maps are never
/// mutated, only dropped by [`MemberCache::invalidate`].
///
/// The cache is an ordinary value: share it between engines with an [`Arc`].
///
/// # Resolution rules
///
/// - base members come first, then the type's own in declaration order;
/// - `EXCLUDED` and `COMPUTED` members are dropped unless `FORCE_INCLUDED`
///   (force-inclusion wins over exclusion);
/// - a member whose model type is custom-serializable gains `CUSTOM`.
///
/// A type fails with [`Error::UnsupportedType`] as a whole when two members
/// share a name, a kept member's name is empty or starts with `$` (taken by
/// backend metadata), a kept member has no persistable type, `ENUM_AS_STRING` or
/// `CUSTOM` is put on a member that cannot honor it, or the base chain loops.
#[derive(Default)]
pub struct MemberCache {
    state: RwLock<CacheState>,
    listeners: RwLock<Vec<Listener>>,
}

impl MemberCache {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the members of the type described by `info`.
    pub fn members(&self, info: &'static ModelInfo) -> Result<Arc<TypeMemberMap>> {
        let type_id = info.type_id();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(map) = state.maps.get(&type_id) {
                return Ok(Arc::clone(map));
            }
        }

        let chain = base_chain(info)?;
        let computed = Arc::new(resolve(info, &chain)?);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let published = Arc::clone(state.maps.entry(type_id).or_insert(computed));
        for base in chain.iter().filter(|base| base.type_id() != type_id) {
            state
                .dependents
                .entry(base.type_id())
                .or_default()
                .insert(type_id);
        }
        drop(state);

        debug!(
            "resolved {} members of `{}`",
            published.len(),
            info.type_path()
        );
        Ok(published)
    }

    #[inline]
    pub fn members_of<T: Model>(&self) -> Result<Arc<TypeMemberMap>> {
        self.members(T::model_info())
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .maps
            .contains_key(&type_id)
    }

    /// Number of cached types.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .maps
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the members of `type_id` and of every cached type that has it as
    /// a base, atomically. Listeners are notified of each dropped type.
    ///
    /// Returns the dropped types.
    pub fn invalidate(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut dropped = Vec::new();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut pending = vec![type_id];
            while let Some(id) = pending.pop() {
                if let Some(children) = state.dependents.remove(&id) {
                    pending.extend(children);
                }
                if state.maps.remove(&id).is_some() {
                    dropped.push(id);
                }
            }
        }

        debug!("invalidated {} cached member sets", dropped.len());
        self.notify(&dropped);
        dropped
    }

    /// Drops every cached member set.
    pub fn clear(&self) {
        let dropped: Vec<TypeId> = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.dependents.clear();
            state.maps.drain().map(|(id, _)| id).collect()
        };
        self.notify(&dropped);
    }

    /// Registers a callback invoked with every type dropped from the cache.
    ///
    /// Listeners run in registration order, after the cache lock is released.
    pub fn on_invalidate(&self, listener: impl Fn(TypeId) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn notify(&self, dropped: &[TypeId]) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for &id in dropped {
            for listener in listeners.iter() {
                listener(id);
            }
        }
    }
}

impl fmt::Debug for MemberCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Resolution

/// Member names starting with this are kept for backend metadata such as
/// `$type` and `$ref`.
const RESERVED_PREFIX: char = '$';

fn unsupported(info: &ModelInfo, reason: String) -> Error {
    Error::UnsupportedType {
        type_path: info.type_path().into(),
        reason: reason.into(),
    }
}

/// `info` and its bases, root-most first.
fn base_chain(info: &'static ModelInfo) -> Result<Vec<&'static ModelInfo>> {
    let mut chain = vec![info];
    let mut current = info;
    while let Some(base) = current.base() {
        if chain.iter().any(|seen| seen.type_id() == base.type_id()) {
            return Err(unsupported(
                info,
                format!("base chain revisits `{}`", base.type_path()),
            ));
        }
        chain.push(base);
        current = base;
    }
    chain.reverse();
    Ok(chain)
}

fn resolve(info: &'static ModelInfo, chain: &[&'static ModelInfo]) -> Result<TypeMemberMap> {
    let mut members: Vec<MemberDescriptor> = Vec::new();

    for declaring in chain {
        for field in declaring.fields() {
            let mut flags = field.flags();
            let forced = flags.contains(MemberFlags::FORCE_INCLUDED);
            if !forced && flags.intersects(MemberFlags::EXCLUDED | MemberFlags::COMPUTED) {
                continue;
            }

            let name = field.name();
            if name.is_empty() {
                return Err(unsupported(
                    info,
                    format!("a member of `{}` has no name", declaring.type_path()),
                ));
            }
            if name.starts_with(RESERVED_PREFIX) {
                return Err(unsupported(
                    info,
                    format!("member name `{name}` is reserved for stream metadata"),
                ));
            }
            if let Some(other) = members.iter().find(|m| m.name() == name) {
                return Err(unsupported(
                    info,
                    format!(
                        "member `{name}` of `{}` duplicates the one of `{}`",
                        declaring.type_path(),
                        other.declared_by()
                    ),
                ));
            }

            let Some(kind) = field.kind() else {
                return Err(unsupported(
                    info,
                    format!("member `{name}` has no persistable type"),
                ));
            };

            if flags.contains(MemberFlags::ENUM_AS_STRING) && kind.enum_info().is_none() {
                return Err(unsupported(
                    info,
                    format!("member `{name}` is not an enum but is written as a string"),
                ));
            }

            flags |= custom_flag(&kind);
            if flags.contains(MemberFlags::CUSTOM) && !is_custom(&kind) {
                return Err(unsupported(
                    info,
                    format!("member `{name}` is marked custom but its type does not serialize itself"),
                ));
            }

            members.push(MemberDescriptor::new(
                name,
                kind,
                flags,
                field.converter(),
                declaring.type_path(),
            ));
        }
    }

    Ok(TypeMemberMap::new(info.type_id(), info.type_path(), members))
}

fn is_custom(kind: &ValueKind) -> bool {
    kind.model_info().is_some_and(ModelInfo::is_custom)
}

fn custom_flag(kind: &ValueKind) -> MemberFlags {
    if is_custom(kind) {
        MemberFlags::CUSTOM
    } else {
        MemberFlags::empty()
    }
}

#[cfg(test)]
mod tests {
    use core::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, OnceLock};

    use crate::derive::{Model, PersistEnum};
    use crate::{
        Error, FieldInfo, MemberCache, MemberFlags, Model as _, ModelInfo, Result, Value,
    };

    #[derive(PersistEnum, Default, Clone, Copy, PartialEq, Debug)]
    enum Mood {
        #[default]
        Calm,
        Busy,
    }

    #[derive(Model, Default, Clone)]
    struct Entity {
        id: u64,
        #[persist(exclude)]
        scratch: Vec<u8>,
    }

    #[derive(Model, Default, Clone)]
    struct Person {
        #[persist(base)]
        entity: Entity,
        name: String,
        #[persist(exclude, include)]
        nickname: String,
        #[persist(computed)]
        initials: String,
        #[persist(computed, include)]
        display: String,
        #[persist(enum_as_string)]
        mood: Mood,
    }

    #[test]
    fn base_first_then_declaration_order() {
        let cache = MemberCache::new();
        let members = cache.members_of::<Person>().unwrap();

        let names: Vec<_> = members.names().collect();
        assert_eq!(names, ["id", "name", "nickname", "display", "mood"]);
        assert_eq!(members.get("id").unwrap().declared_by(), Entity::model_info().type_path());
        assert!(members.get("mood").unwrap().enum_as_string());
        assert!(members.get("scratch").is_none());
    }

    #[test]
    fn force_included_wins_over_excluded() {
        let cache = MemberCache::new();
        let members = cache.members_of::<Person>().unwrap();

        let nickname = members.get("nickname").unwrap();
        assert!(nickname.flags().contains(MemberFlags::EXCLUDED | MemberFlags::FORCE_INCLUDED));
    }

    #[derive(Model, Default, Clone)]
    struct Ticket {
        #[persist(rename = "$ref")]
        reference: u32,
    }

    #[derive(Model, Default, Clone)]
    struct Badge {
        #[persist(rename = "$type")]
        kind: String,
    }

    #[test]
    fn metadata_names_are_reserved() {
        let cache = MemberCache::new();

        for result in [cache.members_of::<Ticket>(), cache.members_of::<Badge>()] {
            let err = result.err().unwrap();
            assert!(matches!(&err, Error::UnsupportedType { reason, .. } if reason.contains('$')), "{err}");
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn published_once() {
        let cache = MemberCache::new();
        let a = cache.members_of::<Person>().unwrap();
        let b = cache.members_of::<Person>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_callers_converge() {
        let cache = MemberCache::new();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.members_of::<Person>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for map in &results {
            assert!(Arc::ptr_eq(map, &results[0]));
        }
    }

    #[test]
    fn invalidation_drops_dependents() {
        let cache = MemberCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.on_invalidate(move |id| sink.lock().unwrap().push(id));

        cache.members_of::<Person>().unwrap();
        cache.members_of::<Entity>().unwrap();
        assert_eq!(cache.len(), 2);

        let dropped = cache.invalidate(TypeId::of::<Entity>());

        assert_eq!(dropped.len(), 2);
        assert!(!cache.contains(TypeId::of::<Person>()));
        assert_eq!(seen.lock().unwrap().len(), 2);

        // Recomputed on next access.
        assert_eq!(cache.members_of::<Person>().unwrap().len(), 5);
    }

    // Hand-written descriptions for shapes the derive does not produce.

    macro_rules! manual_model {
        ($name:ident, $info:expr) => {
            #[derive(Default, Clone)]
            struct $name;

            impl crate::Model for $name {
                fn model_info() -> &'static ModelInfo {
                    static INFO: OnceLock<ModelInfo> = OnceLock::new();
                    INFO.get_or_init($info)
                }

                fn info(&self) -> &'static ModelInfo {
                    Self::model_info()
                }

                fn get_member(&self, _: &str) -> Option<Value> {
                    None
                }

                fn set_member(&mut self, _: &str, _: Value) -> Result<()> {
                    Ok(())
                }

                fn clone_model(&self) -> Box<dyn crate::Model> {
                    Box::new(self.clone())
                }
            }
        };
    }

    manual_model!(Duplicate, || {
        ModelInfo::new::<Duplicate>(vec![
            FieldInfo::new("id", MemberFlags::empty()).with_kind(<u8 as crate::Persist>::value_kind),
        ])
        .with_base::<Entity>()
    });

    manual_model!(Untyped, || {
        ModelInfo::new::<Untyped>(vec![FieldInfo::new("blob", MemberFlags::empty())])
    });

    manual_model!(NotAnEnum, || {
        ModelInfo::new::<NotAnEnum>(vec![FieldInfo::new("n", MemberFlags::ENUM_AS_STRING)
            .with_kind(<u8 as crate::Persist>::value_kind)])
    });

    manual_model!(Looping, || ModelInfo::new::<Looping>(Vec::new()).with_base::<Looping>());

    static UNTYPED_EXCLUDED: AtomicUsize = AtomicUsize::new(0);

    manual_model!(UntypedExcluded, || {
        UNTYPED_EXCLUDED.fetch_add(1, Ordering::Relaxed);
        ModelInfo::new::<UntypedExcluded>(vec![FieldInfo::new("blob", MemberFlags::EXCLUDED)])
    });

    #[test]
    fn invalid_types_fail_as_a_whole() {
        let cache = MemberCache::new();

        for result in [
            cache.members_of::<Duplicate>(),
            cache.members_of::<Untyped>(),
            cache.members_of::<NotAnEnum>(),
            cache.members_of::<Looping>(),
        ] {
            assert!(matches!(result, Err(Error::UnsupportedType { .. })));
        }
        assert!(cache.is_empty());

        assert!(cache.members_of::<UntypedExcluded>().unwrap().is_empty());
        assert_eq!(UNTYPED_EXCLUDED.load(Ordering::Relaxed), 1);
    }
}
