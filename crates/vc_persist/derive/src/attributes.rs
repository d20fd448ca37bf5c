use proc_macro2::Span;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Attribute, LitStr};

use crate::PERSIST_ATTRIBUTE_NAME;

// -----------------------------------------------------------------------------
// Helpers

fn parse_str(meta: &ParseNestedMeta) -> syn::Result<LitStr> {
    meta.value()?.parse::<LitStr>()
}

fn set_once<T>(slot: &mut Option<T>, value: T, meta: &ParseNestedMeta, what: &str) -> syn::Result<()> {
    if slot.is_some() {
        return Err(meta.error(format_args!("duplicate `{what}` attribute")));
    }
    *slot = Some(value);
    Ok(())
}

fn for_each_persist_attr(
    attrs: &[Attribute],
    mut f: impl FnMut(ParseNestedMeta) -> syn::Result<()>,
) -> syn::Result<()> {
    for attr in attrs {
        if attr.path().is_ident(PERSIST_ATTRIBUTE_NAME) {
            attr.parse_nested_meta(&mut f)?;
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Type Attributes

/// `redirect_from(assembly = "..", type_name = "..")`
pub(crate) struct RedirectFrom {
    pub assembly: Option<LitStr>,
    pub type_name: LitStr,
}

/// Attributes on a `#[derive(Model)]` or `#[derive(PersistEnum)]` type.
#[derive(Default)]
pub(crate) struct TypeAttributes {
    pub type_name: Option<LitStr>,
    pub assembly: Option<LitStr>,
    pub redirects: Vec<RedirectFrom>,
    pub custom: Option<Span>,
    pub auto_register: Option<Span>,
    /// Enum only.
    pub as_string: Option<Span>,
}

impl TypeAttributes {
    pub fn parse_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut this = Self::default();
        for_each_persist_attr(attrs, |meta| this.parse_meta(meta))?;
        Ok(this)
    }

    fn parse_meta(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("type_name") {
            let value = parse_str(&meta)?;
            set_once(&mut self.type_name, value, &meta, "type_name")
        } else if meta.path.is_ident("assembly") {
            let value = parse_str(&meta)?;
            set_once(&mut self.assembly, value, &meta, "assembly")
        } else if meta.path.is_ident("redirect_from") {
            let mut assembly = None;
            let mut type_name = None;
            meta.parse_nested_meta(|inner| {
                if inner.path.is_ident("assembly") {
                    let value = parse_str(&inner)?;
                    set_once(&mut assembly, value, &inner, "assembly")
                } else if inner.path.is_ident("type_name") {
                    let value = parse_str(&inner)?;
                    set_once(&mut type_name, value, &inner, "type_name")
                } else {
                    Err(inner.error("expected `assembly` or `type_name`"))
                }
            })?;
            let type_name = type_name.ok_or_else(|| meta.error("`redirect_from` requires a `type_name`"))?;
            self.redirects.push(RedirectFrom { assembly, type_name });
            Ok(())
        } else if meta.path.is_ident("custom") {
            set_once(&mut self.custom, meta.path.span(), &meta, "custom")
        } else if meta.path.is_ident("auto_register") {
            set_once(&mut self.auto_register, meta.path.span(), &meta, "auto_register")
        } else if meta.path.is_ident("as_string") || meta.path.is_ident("enum_as_string") {
            set_once(&mut self.as_string, meta.path.span(), &meta, "as_string")
        } else {
            Err(meta.error("unknown `persist` attribute"))
        }
    }
}

// -----------------------------------------------------------------------------
// Field Attributes

/// Attributes on a named field of a `#[derive(Model)]` struct.
#[derive(Default)]
pub(crate) struct FieldAttributes {
    pub exclude: bool,
    pub include: bool,
    pub computed: bool,
    pub enum_as_string: bool,
    pub custom: bool,
    pub base: Option<Span>,
    pub rename: Option<LitStr>,
    pub converter: Option<LitStr>,
}

impl FieldAttributes {
    pub fn parse_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut this = Self::default();
        for_each_persist_attr(attrs, |meta| this.parse_meta(meta))?;

        if let Some(span) = this.base
            && (this.exclude
                || this.include
                || this.computed
                || this.enum_as_string
                || this.custom
                || this.rename.is_some()
                || this.converter.is_some())
        {
            return Err(syn::Error::new(span, "`base` cannot be combined with other attributes"));
        }
        Ok(this)
    }

    fn parse_meta(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("exclude") {
            self.exclude = true;
        } else if meta.path.is_ident("include") {
            self.include = true;
        } else if meta.path.is_ident("computed") {
            self.computed = true;
        } else if meta.path.is_ident("enum_as_string") || meta.path.is_ident("as_string") {
            self.enum_as_string = true;
        } else if meta.path.is_ident("custom") {
            self.custom = true;
        } else if meta.path.is_ident("base") {
            set_once(&mut self.base, meta.path.span(), &meta, "base")?;
        } else if meta.path.is_ident("rename") {
            let value = parse_str(&meta)?;
            set_once(&mut self.rename, value, &meta, "rename")?;
        } else if meta.path.is_ident("converter") {
            let value = parse_str(&meta)?;
            set_once(&mut self.converter, value, &meta, "converter")?;
        } else {
            return Err(meta.error("unknown `persist` attribute"));
        }
        Ok(())
    }

    /// Whether the member is read and written.
    #[inline]
    pub fn is_persisted(&self) -> bool {
        self.include || !(self.exclude || self.computed)
    }
}

// -----------------------------------------------------------------------------
// Variant Attributes

#[derive(Default)]
pub(crate) struct VariantAttributes {
    pub rename: Option<LitStr>,
}

impl VariantAttributes {
    pub fn parse_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut this = Self::default();
        for_each_persist_attr(attrs, |meta| {
            if meta.path.is_ident("rename") {
                let value = parse_str(&meta)?;
                set_once(&mut this.rename, value, &meta, "rename")
            } else {
                Err(meta.error("expected `rename`"))
            }
        })?;
        Ok(this)
    }
}
