//! Paths of the `vc_persist` items the generated code refers to.

use proc_macro2::TokenStream;
use quote::quote;

// -----------------------------------------------------------------------------
// Crate Path

/// Get the correct access path to the `vc_persist` crate.
///
/// 1. For crates that depend on `vc_persist`, `::vc_persist` is returned.
/// 2. For crates that depend on `vc_archive`, `::vc_archive::persist` is returned.
/// 3. Otherwise `::vc_persist` is returned, which may be incorrect.
///
/// This reads the caller's manifest, so it is computed once per derive and
/// passed around.
pub(crate) fn vc_persist() -> syn::Path {
    vc_macro_utils::Manifest::shared(|manifest| manifest.get_crate_path("vc_persist"))
}

// -----------------------------------------------------------------------------
// Items

#[inline(always)]
pub(crate) fn macro_exports_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::__macro_exports
    }
}

#[cfg(feature = "auto_register")]
#[inline(always)]
pub(crate) fn auto_register_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::__macro_exports::auto_register
    }
}

#[inline(always)]
pub(crate) fn model_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::Model
    }
}

#[inline(always)]
pub(crate) fn persist_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::Persist
    }
}

#[inline(always)]
pub(crate) fn value_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::Value
    }
}

#[inline(always)]
pub(crate) fn value_ref_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::ValueRef
    }
}

#[inline(always)]
pub(crate) fn value_kind_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::ValueKind
    }
}

#[inline(always)]
pub(crate) fn result_(vc_persist_path: &syn::Path) -> TokenStream {
    quote! {
        #vc_persist_path::Result
    }
}
