//! The member metadata resolver.
//!
//! [`MemberCache`] turns the fields a [`ModelInfo`](crate::ModelInfo) declares
//! into the ordered, validated set of members the engine walks, and keeps the
//! result per type.

use core::any::TypeId;
use core::fmt;

use crate::hash::HashMap;
use crate::value::ValueKind;

// -----------------------------------------------------------------------------
// Modules

mod cache;

// -----------------------------------------------------------------------------
// Exports

pub use cache::MemberCache;

// -----------------------------------------------------------------------------
// MemberFlags

bitflags::bitflags! {
    /// Declarative behavior of a member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        /// Not persisted.
        const EXCLUDED = 1 << 0;
        /// Persisted even when excluded or computed.
        const FORCE_INCLUDED = 1 << 1;
        /// Enum values are written by variant name instead of discriminant.
        const ENUM_AS_STRING = 1 << 2;
        /// The member's model serializes itself.
        const CUSTOM = 1 << 3;
        /// Derived from other members; not persisted unless force-included.
        const COMPUTED = 1 << 4;
    }
}

// -----------------------------------------------------------------------------
// MemberDescriptor

/// One persisted member of a type, immutable once resolved.
#[derive(Clone)]
pub struct MemberDescriptor {
    name: &'static str,
    kind: ValueKind,
    flags: MemberFlags,
    converter: Option<&'static str>,
    declared_by: &'static str,
}

impl MemberDescriptor {
    pub(crate) fn new(
        name: &'static str,
        kind: ValueKind,
        flags: MemberFlags,
        converter: Option<&'static str>,
        declared_by: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            flags,
            converter,
            declared_by,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    #[inline]
    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    #[inline]
    pub fn converter(&self) -> Option<&'static str> {
        self.converter
    }

    /// Type path of the model that declares the member (a base for inherited ones).
    #[inline]
    pub fn declared_by(&self) -> &'static str {
        self.declared_by
    }

    /// Whether enum values of this member are written by name.
    pub fn enum_as_string(&self) -> bool {
        self.flags.contains(MemberFlags::ENUM_AS_STRING)
            || self.kind.enum_info().is_some_and(|info| info.as_string())
    }
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("converter", &self.converter)
            .field("declared_by", &self.declared_by)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// TypeMemberMap

/// The resolved members of one type: base members first, then declaration order.
pub struct TypeMemberMap {
    type_id: TypeId,
    type_path: &'static str,
    members: Box<[MemberDescriptor]>,
    index: HashMap<&'static str, usize>,
}

impl TypeMemberMap {
    pub(crate) fn new(type_id: TypeId, type_path: &'static str, members: Vec<MemberDescriptor>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name, i))
            .collect();
        Self {
            type_id,
            type_path,
            members: members.into_boxed_slice(),
            index,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_path(&self) -> &'static str {
        self.type_path
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&MemberDescriptor> {
        self.index.get(name).map(|&i| &self.members[i])
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, MemberDescriptor> {
        self.members.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.members.iter().map(MemberDescriptor::name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<'a> IntoIterator for &'a TypeMemberMap {
    type Item = &'a MemberDescriptor;
    type IntoIter = core::slice::Iter<'a, MemberDescriptor>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for TypeMemberMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMemberMap")
            .field("type_path", &self.type_path)
            .field("members", &self.members)
            .finish()
    }
}
