//! See following macros:
//!
//! - [`Model`]
//! - [`PersistEnum`]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::std_instead_of_core, reason = "proc-macro lib")]
#![allow(clippy::std_instead_of_alloc, reason = "proc-macro lib")]

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

static PERSIST_ATTRIBUTE_NAME: &str = "persist";

// -----------------------------------------------------------------------------
// Modules

mod attributes;
mod enums;
mod model;
mod path;

// -----------------------------------------------------------------------------
// Macros

/// # Model Derivation
///
/// `#[derive(Model)]` implements `Model` and `Persist` for a struct with
/// named fields. The type must also implement `Default` and `Clone`.
///
/// Every field's type must implement `Persist`, unless the field is not
/// persisted.
///
/// ## Type Attributes
///
/// - `#[persist(type_name = "Name")]`: the persisted type name, defaults to
///   the struct's name.
/// - `#[persist(assembly = "name")]`: the persisted assembly, defaults to the
///   name of the package declaring the type.
/// - `#[persist(redirect_from(assembly = "..", type_name = ".."))]`: streams
///   recorded under this key are read as this type. Repeatable; `assembly`
///   defaults to the type's own.
/// - `#[persist(custom)]`: the type writes its own members through
///   `CustomSerialize`, which it must implement.
/// - `#[persist(auto_register)]`: registered by
///   `ModelRegistry::auto_register`. Requires the `auto_register` feature.
///
/// ## Field Attributes
///
/// - `exclude`: not persisted.
/// - `computed`: derived from other members, not persisted.
/// - `include`: persisted even when `exclude` or `computed`.
/// - `enum_as_string` (or `as_string`): enum values are written by name.
/// - `custom`: the member's model serializes itself.
/// - `rename = "name"`: the persisted member name.
/// - `converter = "id"`: the value passes through the converter registered
///   as `id` on the engine.
/// - `base`: this field holds the base model. Its members come first and are
///   accessed through it. At most one field, with no other attribute.
///
/// ## Example
///
/// ```ignore
/// #[derive(Model, Default, Clone)]
/// #[persist(type_name = "Dog", redirect_from(type_name = "Hound"))]
/// struct Dog {
///     #[persist(base)]
///     animal: Animal,
///     #[persist(rename = "good_boy")]
///     good: bool,
///     #[persist(exclude)]
///     last_walk: Option<u64>,
/// }
/// ```
///
/// Generic structs are not supported.
#[proc_macro_derive(Model, attributes(persist))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    match model::impl_model(&ast) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

/// # Enum Derivation
///
/// `#[derive(PersistEnum)]` implements `PersistEnum` and `Persist` for an
/// enum whose variants have no fields.
///
/// Discriminants follow Rust's rules: an explicit integer literal, otherwise
/// the previous one plus one, starting at zero.
///
/// - `#[persist(as_string)]` on the enum: values are written by name
///   wherever they appear.
/// - `#[persist(rename = "name")]` on a variant: the persisted name.
///
/// ```ignore
/// #[derive(PersistEnum, Default, Clone, Copy)]
/// #[persist(as_string)]
/// enum Level {
///     #[default]
///     Low = 1,
///     #[persist(rename = "mid")]
///     Medium,
///     High = 10,
/// }
/// ```
#[proc_macro_derive(PersistEnum, attributes(persist))]
pub fn derive_persist_enum(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    match enums::impl_persist_enum(&ast) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}
