//! Static descriptions of models and enums.
//!
//! A [`ModelInfo`] is built once per type (usually by `#[derive(Model)]`) and
//! lives for the rest of the process. It only records what the type declares;
//! the resolved, validated member set is produced by
//! [`MemberCache`](crate::MemberCache).

use core::any::TypeId;
use core::fmt;
use std::borrow::Cow;

use crate::member::MemberFlags;
use crate::model::Model;
use crate::value::{SharedModel, ValueKind};

// -----------------------------------------------------------------------------
// TypeKey

/// The persisted identity of a type: the assembly (package) that declares it
/// and its name.
///
/// Streams record this key instead of the Rust type path, so types can move
/// between modules freely. Renames across releases are bridged by redirects,
/// see [`TypeRedirector`](crate::TypeRedirector).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    assembly: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl TypeKey {
    #[inline]
    pub fn new(assembly: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            assembly: assembly.into(),
            name: name.into(),
        }
    }

    #[inline]
    pub const fn from_static(assembly: &'static str, name: &'static str) -> Self {
        Self {
            assembly: Cow::Borrowed(assembly),
            name: Cow::Borrowed(name),
        }
    }

    /// Derives a key from a Rust type path: the first segment is the
    /// assembly, the last one the name.
    ///
    /// ```
    /// # use vc_persist::TypeKey;
    /// let key = TypeKey::from_type_path("game::world::Tile");
    /// assert_eq!(key.assembly(), "game");
    /// assert_eq!(key.name(), "Tile");
    /// ```
    pub fn from_type_path(type_path: &'static str) -> Self {
        let base = type_path.split('<').next().unwrap_or(type_path);
        let assembly = base.split("::").next().unwrap_or(base);
        let name = base.rsplit("::").next().unwrap_or(base);
        Self::from_static(assembly, name)
    }

    #[inline]
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.assembly, self.name)
    }
}

// -----------------------------------------------------------------------------
// FieldInfo

/// A member as declared on a model type.
#[derive(Clone)]
pub struct FieldInfo {
    name: &'static str,
    kind: Option<fn() -> ValueKind>,
    flags: MemberFlags,
    converter: Option<&'static str>,
}

impl FieldInfo {
    #[inline]
    pub const fn new(name: &'static str, flags: MemberFlags) -> Self {
        Self {
            name,
            kind: None,
            flags,
            converter: None,
        }
    }

    /// Sets the declared type of this member.
    ///
    /// Members whose type cannot be persisted (usually excluded ones) leave
    /// this unset; the resolver rejects them if they are ever kept.
    #[inline]
    pub const fn with_kind(mut self, kind: fn() -> ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Names the converter applied to this member, see
    /// [`MemberConverter`](crate::MemberConverter).
    #[inline]
    pub const fn with_converter(mut self, id: &'static str) -> Self {
        self.converter = Some(id);
        self
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> Option<ValueKind> {
        self.kind.map(|kind| kind())
    }

    #[inline]
    pub const fn flags(&self) -> MemberFlags {
        self.flags
    }

    #[inline]
    pub const fn converter(&self) -> Option<&'static str> {
        self.converter
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("converter", &self.converter)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ModelInfo

fn new_boxed<T: Model + Default>() -> Box<dyn Model> {
    Box::new(T::default())
}

fn new_shared<T: Model + Default>() -> SharedModel {
    SharedModel::new(T::default())
}

/// Everything a model type declares about itself.
///
/// # Example
///
/// ```rust, ignore
/// ModelInfo::new::<Dog>(vec![
///     FieldInfo::new("good", MemberFlags::empty()).with_kind(<bool as Persist>::value_kind),
/// ])
/// .with_base::<Animal>()
/// .with_redirect("legacy", "Hound")
/// ```
pub struct ModelInfo {
    type_id: TypeId,
    type_path: &'static str,
    key: TypeKey,
    base: Option<fn() -> &'static ModelInfo>,
    fields: Box<[FieldInfo]>,
    custom: bool,
    redirects: Box<[TypeKey]>,
    new_boxed: fn() -> Box<dyn Model>,
    new_shared: fn() -> SharedModel,
}

impl ModelInfo {
    /// Creates the description of `T` with its own (non-inherited) fields.
    ///
    /// The key defaults to [`TypeKey::from_type_path`].
    pub fn new<T: Model + Default>(fields: Vec<FieldInfo>) -> Self {
        let type_path = core::any::type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            type_path,
            key: TypeKey::from_type_path(type_path),
            base: None,
            fields: fields.into_boxed_slice(),
            custom: false,
            redirects: Box::new([]),
            new_boxed: new_boxed::<T>,
            new_shared: new_shared::<T>,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: TypeKey) -> Self {
        self.key = key;
        self
    }

    /// Declares `B` as the base model: its members come first.
    #[must_use]
    pub fn with_base<B: Model>(mut self) -> Self {
        self.base = Some(B::model_info);
        self
    }

    /// Marks the type as custom-serializable, see
    /// [`CustomSerialize`](crate::CustomSerialize).
    #[must_use]
    pub fn with_custom(mut self, custom: bool) -> Self {
        self.custom = custom;
        self
    }

    /// Declares that streams recorded as `assembly/name` hold this type.
    #[must_use]
    pub fn with_redirect(
        mut self,
        assembly: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        let mut redirects = core::mem::take(&mut self.redirects).into_vec();
        redirects.push(TypeKey::new(assembly, name));
        self.redirects = redirects.into_boxed_slice();
        self
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
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    #[inline]
    pub fn base(&self) -> Option<&'static ModelInfo> {
        self.base.map(|base| base())
    }

    /// The fields declared on this type, without the base's.
    #[inline]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        self.custom
    }

    #[inline]
    pub fn redirects(&self) -> &[TypeKey] {
        &self.redirects
    }

    /// Creates a default instance with value semantics.
    #[inline]
    pub fn new_boxed(&self) -> Box<dyn Model> {
        (self.new_boxed)()
    }

    /// Creates a default instance behind a shared handle.
    #[inline]
    pub fn new_shared(&self) -> SharedModel {
        (self.new_shared)()
    }
}

impl fmt::Debug for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInfo")
            .field("type_path", &self.type_path)
            .field("key", &self.key)
            .field("base", &self.base().map(ModelInfo::type_path))
            .field("fields", &self.fields)
            .field("custom", &self.custom)
            .field("redirects", &self.redirects)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// EnumInfo

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: &'static str,
    pub discriminant: i64,
}

/// Description of a field-less enum, usually built by `#[derive(PersistEnum)]`.
#[derive(Debug)]
pub struct EnumInfo {
    type_id: TypeId,
    type_path: &'static str,
    variants: Box<[EnumVariant]>,
    as_string: bool,
}

impl EnumInfo {
    pub fn new<E: 'static>(variants: Vec<EnumVariant>) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_path: core::any::type_name::<E>(),
            variants: variants.into_boxed_slice(),
            as_string: false,
        }
    }

    /// Writes values of this enum by name wherever they appear.
    #[must_use]
    pub fn with_as_string(mut self, as_string: bool) -> Self {
        self.as_string = as_string;
        self
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
    pub fn variants(&self) -> &[EnumVariant] {
        &self.variants
    }

    #[inline]
    pub fn as_string(&self) -> bool {
        self.as_string
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.name == name)
    }

    pub fn index_of_discriminant(&self, discriminant: i64) -> Option<usize> {
        self.variants
            .iter()
            .position(|v| v.discriminant == discriminant)
    }
}
