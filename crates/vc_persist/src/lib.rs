//! Format-agnostic object-graph persistence.
//!
//! `vc_persist` walks a [`Model`] through the members it describes, turns every
//! member into a dynamic [`Value`], and drives one of several interchangeable
//! wire-format backends to produce or consume bytes.
//!
//! ## Menu
//!
//! - [`value`]: [`Value`], [`Literal`], [`ValueKind`] and the [`Persist`] conversion trait,
//!   plus the [`Shared`] handle for identity-bearing models.
//! - [`info`]: static model descriptions ([`ModelInfo`], [`FieldInfo`], [`EnumInfo`]).
//! - [`member`]: the resolver cache ([`MemberCache`]) producing ordered [`MemberDescriptor`]s.
//! - [`registry`]: [`ModelRegistry`] and the [`TypeRedirector`] for renamed types.
//! - [`context`]: the per-operation [`SerializationContext`].
//! - [`hook`]: member hooks and converters.
//! - [`format`]: backend traits and the binary, JSON and XML backends.
//! - [`engine`]: the [`Engine`] tying everything together.
//!
//! ## Example
//!
//! ```
//! use vc_persist::{Engine, Format, derive::{Model, PersistEnum}};
//!
//! #[derive(PersistEnum, Clone, Copy, PartialEq, Debug, Default)]
//! enum Weekday { #[default] Monday, Tuesday }
//!
//! #[derive(Model, Default, Clone, PartialEq, Debug)]
//! struct Meeting {
//!     title: String,
//!     #[persist(enum_as_string)]
//!     day: Weekday,
//!     #[persist(exclude)]
//!     dirty: bool,
//! }
//!
//! let engine = Engine::builder().register::<Meeting>().build();
//!
//! let meeting = Meeting { title: "sync".into(), day: Weekday::Tuesday, dirty: true };
//! let bytes = engine.to_bytes(&meeting, Format::Json).unwrap();
//! let text = String::from_utf8(bytes.clone()).unwrap();
//! assert!(text.contains("\"Tuesday\""));
//! assert!(!text.contains("dirty"));
//!
//! let back: Meeting = engine.from_bytes(&bytes, Format::Json).unwrap();
//! assert_eq!(back, Meeting { dirty: false, ..meeting });
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

// -----------------------------------------------------------------------------
// Extern Self

// Generated code names this crate `vc_persist`, including inside its own tests.
extern crate self as vc_persist;

// -----------------------------------------------------------------------------
// Modules

mod config;
mod error;
mod hash;
mod model;

pub mod context;
pub mod engine;
pub mod format;
pub mod hook;
pub mod info;
pub mod member;
pub mod registry;
pub mod value;

// -----------------------------------------------------------------------------
// Top-Level exports

#[doc(hidden)]
pub mod __macro_exports;

pub use config::{Culture, SerializationConfig, UnresolvedTypePolicy};
pub use context::{RefId, SerializationContext};
pub use engine::{Engine, EngineBuilder, Format};
pub use error::{Error, Result};
pub use hook::{MemberConverter, MemberHook, MemberValue};
pub use info::{EnumInfo, FieldInfo, ModelInfo, TypeKey};
pub use member::{MemberCache, MemberDescriptor, MemberFlags, TypeMemberMap};
pub use model::{CustomReader, CustomSerialize, CustomWriter, Model, ModelAdapter, ObjectAdapter};
pub use registry::{ModelRegistry, TypeRedirector};
pub use value::{Literal, Persist, PersistEnum, Shared, SharedModel, Value, ValueKind, ValueRef};

pub use vc_persist_derive as derive;
