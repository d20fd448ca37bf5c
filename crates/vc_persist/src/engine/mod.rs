//! The serialization driver.
//!
//! An [`Engine`] owns everything that outlives a single call: the registered
//! models, the redirect table, the member cache, hooks, converters and the
//! object adapter. Every call creates its own
//! [`SerializationContext`] and drops it on return.
//!
//! ```
//! use vc_persist::{Engine, Format, Shared, derive::Model};
//!
//! #[derive(Model, Default, Clone)]
//! struct Node {
//!     label: String,
//!     next: Option<Shared<Node>>,
//! }
//!
//! let a = Shared::new(Node { label: "a".into(), next: None });
//! let b = Shared::new(Node { label: "b".into(), next: Some(a.clone()) });
//! a.borrow_mut().next = Some(b.clone());
//!
//! let engine = Engine::builder().register::<Node>().build();
//! let bytes = engine.to_bytes(&*a.borrow(), Format::Binary).unwrap();
//!
//! let back = engine.deserialize_shared::<Node>(Format::Binary, &bytes[..], None).unwrap();
//! let b = back.borrow().next.clone().unwrap();
//! assert!(b.borrow().next.as_ref().unwrap().ptr_eq(&back));
//! ```

use core::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use log::debug;

use crate::config::SerializationConfig;
use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::format::{FormatReader, FormatWriter};
use crate::hash::HashMap;
use crate::hook::{MemberConverter, MemberHook};
use crate::info::{ModelInfo, TypeKey};
use crate::member::MemberCache;
use crate::model::{Model, ModelAdapter, ObjectAdapter};
use crate::registry::{ModelRegistry, TypeRedirector};
use crate::value::{Persist, Shared, SharedModel, Value, ValueKind};

// -----------------------------------------------------------------------------
// Modules

mod de;
mod ser;

#[cfg(all(test, feature = "binary", feature = "json", feature = "xml"))]
mod tests;

// -----------------------------------------------------------------------------
// Exports

pub use crate::format::Format;

use de::Deserializer;
use ser::Serializer;

// -----------------------------------------------------------------------------
// EngineBuilder

/// Configures an [`Engine`].
pub struct EngineBuilder {
    registry: ModelRegistry,
    redirects: Vec<(TypeKey, TypeKey)>,
    hooks: Vec<Box<dyn MemberHook>>,
    converters: HashMap<&'static str, Box<dyn MemberConverter>>,
    adapter: Box<dyn ObjectAdapter>,
    cache: Option<Arc<MemberCache>>,
    config: SerializationConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            registry: ModelRegistry::new(),
            redirects: Vec::new(),
            hooks: Vec::new(),
            converters: HashMap::default(),
            adapter: Box::new(ModelAdapter),
            cache: None,
            config: SerializationConfig::default(),
        }
    }
}

impl EngineBuilder {
    /// Registers `T` and every model reachable from its declaration.
    #[must_use]
    pub fn register<T: Model>(mut self) -> Self {
        self.registry.register::<T>();
        self
    }

    /// Registers every `#[persist(auto_register)]` model linked into the binary.
    #[cfg(feature = "auto_register")]
    #[must_use]
    pub fn auto_register(mut self) -> Self {
        self.registry.auto_register();
        self
    }

    /// Reads streams recorded as `from` into the type registered as `to`.
    ///
    /// Declarations made with `#[persist(redirect_from(..))]` are collected
    /// automatically; entries added here take precedence.
    #[must_use]
    pub fn redirect(mut self, from: TypeKey, to: TypeKey) -> Self {
        self.redirects.push((from, to));
        self
    }

    /// Appends a hook. Hooks run in the order they are added.
    #[must_use]
    pub fn hook(mut self, hook: impl MemberHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Registers the converter named by `#[persist(converter = "id")]`.
    #[must_use]
    pub fn converter(mut self, id: &'static str, converter: impl MemberConverter + 'static) -> Self {
        self.converters.insert(id, Box::new(converter));
        self
    }

    /// Replaces the default [`ModelAdapter`].
    #[must_use]
    pub fn adapter(mut self, adapter: impl ObjectAdapter + 'static) -> Self {
        self.adapter = Box::new(adapter);
        self
    }

    /// Shares a member cache with other engines.
    #[must_use]
    pub fn cache(mut self, cache: Arc<MemberCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The configuration used by calls that do not pass their own.
    #[must_use]
    pub fn config(mut self, config: SerializationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Engine {
        let mut redirector = TypeRedirector::from_registry(&self.registry);
        for (from, to) in self.redirects {
            redirector.add(from, to);
        }

        debug!(
            "engine built with {} models, {} redirects, {} hooks, {} converters",
            self.registry.len(),
            redirector.len(),
            self.hooks.len(),
            self.converters.len(),
        );

        Engine {
            registry: self.registry,
            redirector,
            hooks: self.hooks,
            converters: self.converters,
            adapter: self.adapter,
            cache: self.cache.unwrap_or_default(),
            config: self.config,
        }
    }
}

// -----------------------------------------------------------------------------
// Engine

/// Serializes and deserializes model graphs.
///
/// An engine is immutable once built and can be shared between threads;
/// each call is synchronous and independent.
pub struct Engine {
    registry: ModelRegistry,
    redirector: TypeRedirector,
    hooks: Vec<Box<dyn MemberHook>>,
    converters: HashMap<&'static str, Box<dyn MemberConverter>>,
    adapter: Box<dyn ObjectAdapter>,
    cache: Arc<MemberCache>,
    config: SerializationConfig,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::default().build()
    }
}

impl Engine {
    #[inline]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    #[inline]
    pub fn cache(&self) -> &Arc<MemberCache> {
        &self.cache
    }

    #[inline]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[inline]
    pub fn redirector(&self) -> &TypeRedirector {
        &self.redirector
    }

    #[inline]
    pub fn config(&self) -> &SerializationConfig {
        &self.config
    }

    fn converter(&self, id: &str, owner: &ModelInfo) -> Result<&dyn MemberConverter> {
        self.converters
            .get(id)
            .map(|converter| &**converter)
            .ok_or_else(|| Error::UnsupportedType {
                type_path: owner.type_path().into(),
                reason: format!("no converter registered as `{id}`").into(),
            })
    }

    // -------------------------------------------------------------------------
    // Serialization

    /// Writes `model` and everything reachable from it to `output`.
    ///
    /// `config` overrides the engine's configuration for this call.
    pub fn serialize(
        &self,
        model: &dyn Model,
        format: Format,
        output: impl Write,
        config: Option<&SerializationConfig>,
    ) -> Result<()> {
        let mut writer = format.writer(output);
        self.serialize_with(model, writer.as_mut(), config)
    }

    /// Same as [`Engine::serialize`] with a caller-provided backend.
    pub fn serialize_with(
        &self,
        model: &dyn Model,
        writer: &mut dyn FormatWriter,
        config: Option<&SerializationConfig>,
    ) -> Result<()> {
        let config = config.unwrap_or(&self.config);
        let mut cx = SerializationContext::new(config);
        debug!("serializing `{}`", model.info().type_path());

        Serializer::new(self, writer).write_root(&mut cx, model)
    }

    /// Writes the model behind a shared handle; it keeps its identity, so
    /// members pointing back at it become back-references.
    pub fn serialize_shared_with(
        &self,
        model: &SharedModel,
        writer: &mut dyn FormatWriter,
        config: Option<&SerializationConfig>,
    ) -> Result<()> {
        let root = model.borrow()?;
        self.serialize_with(&*root, writer, config)
    }

    pub fn to_bytes(&self, model: &dyn Model, format: Format) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.serialize(model, format, &mut bytes, None)?;
        Ok(bytes)
    }

    // -------------------------------------------------------------------------
    // Deserialization

    /// Reads a `T` from `input`.
    ///
    /// The result is a private copy: back-references to the root inside the
    /// graph point at a separate shared instance. Use
    /// [`Engine::deserialize_shared`] to keep the root's identity.
    pub fn deserialize<T: Model + Persist>(
        &self,
        format: Format,
        input: impl Read,
        config: Option<&SerializationConfig>,
    ) -> Result<T> {
        let mut reader = format.reader(input)?;
        let value = self.deserialize_with(reader.as_mut(), &ValueKind::model::<T>(), config)?;
        T::from_value(value)
    }

    /// Reads a `T` behind a shared handle.
    pub fn deserialize_shared<T: Model>(
        &self,
        format: Format,
        input: impl Read,
        config: Option<&SerializationConfig>,
    ) -> Result<Shared<T>> {
        let mut reader = format.reader(input)?;
        let value = self.deserialize_with(reader.as_mut(), &ValueKind::shared::<T>(), config)?;
        Shared::from_value(value)
    }

    /// Reads an instance of the type described by `info`.
    pub fn deserialize_type(
        &self,
        info: &'static ModelInfo,
        format: Format,
        input: impl Read,
        config: Option<&SerializationConfig>,
    ) -> Result<Box<dyn Model>> {
        let mut reader = format.reader(input)?;
        let config = config.unwrap_or(&self.config);
        let mut cx = SerializationContext::new(config);
        debug!("deserializing `{}`", info.type_path());

        Deserializer::new(self, reader.as_mut()).read_root_model(&mut cx, info)
    }

    /// Reads whatever registered model the stream holds.
    ///
    /// The result is a [`Value::Shared`], or [`Value::Null`] when the root
    /// type is unresolved and skipped.
    pub fn deserialize_any(
        &self,
        format: Format,
        input: impl Read,
        config: Option<&SerializationConfig>,
    ) -> Result<Value> {
        let mut reader = format.reader(input)?;
        self.deserialize_with(reader.as_mut(), &ValueKind::AnyModel, config)
    }

    /// Reads one value of the declared `kind` from a caller-provided backend.
    pub fn deserialize_with(
        &self,
        reader: &mut dyn FormatReader,
        kind: &ValueKind,
        config: Option<&SerializationConfig>,
    ) -> Result<Value> {
        let config = config.unwrap_or(&self.config);
        let mut cx = SerializationContext::new(config);
        debug!("deserializing {}", kind.name());

        Deserializer::new(self, reader).read_value(&mut cx, kind)
    }

    pub fn from_bytes<T: Model + Persist>(&self, bytes: &[u8], format: Format) -> Result<T> {
        self.deserialize(format, bytes, None)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("redirector", &self.redirector)
            .field("hooks", &self.hooks.len())
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
