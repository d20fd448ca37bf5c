use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Expr, ExprLit, ExprUnary, Fields, Lit, LitStr, UnOp};

use crate::attributes::{TypeAttributes, VariantAttributes};
use crate::path;

/// Reads an explicit discriminant: an integer literal, optionally negated.
fn discriminant(expr: &Expr) -> syn::Result<i64> {
    match expr {
        Expr::Lit(ExprLit { lit: Lit::Int(int), .. }) => int.base10_parse::<i64>(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => discriminant(expr).map(|value| -value),
        Expr::Group(group) => discriminant(&group.expr),
        Expr::Paren(paren) => discriminant(&paren.expr),
        _ => Err(syn::Error::new_spanned(
            expr,
            "discriminants must be integer literals",
        )),
    }
}

pub(crate) fn impl_persist_enum(input: &DeriveInput) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "`PersistEnum` cannot be derived for generic types",
        ));
    }
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "`PersistEnum` can only be derived for enums",
        ));
    };

    let attrs = TypeAttributes::parse_attrs(&input.attrs)?;
    if let Some(span) = attrs.custom.or(attrs.auto_register) {
        return Err(syn::Error::new(span, "only `as_string` applies to enums"));
    }
    if let Some(name) = attrs.type_name.as_ref().or(attrs.assembly.as_ref()) {
        return Err(syn::Error::new_spanned(name, "only `as_string` applies to enums"));
    }
    if let Some(redirect) = attrs.redirects.first() {
        return Err(syn::Error::new_spanned(&redirect.type_name, "only `as_string` applies to enums"));
    }

    let mut idents = Vec::with_capacity(data.variants.len());
    let mut names = Vec::with_capacity(data.variants.len());
    let mut discriminants = Vec::with_capacity(data.variants.len());
    let mut next = 0i64;
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                &variant.fields,
                "`PersistEnum` variants cannot have fields",
            ));
        }
        let variant_attrs = VariantAttributes::parse_attrs(&variant.attrs)?;

        let value = match &variant.discriminant {
            Some((_, expr)) => discriminant(expr)?,
            None => next,
        };
        next = value.wrapping_add(1);

        let name = match variant_attrs.rename {
            Some(name) => name,
            None => LitStr::new(&variant.ident.unraw().to_string(), variant.ident.span()),
        };
        idents.push(&variant.ident);
        names.push(name);
        discriminants.push(value);
    }

    let ident = &input.ident;
    let vc_persist = path::vc_persist();
    let persist_ = path::persist_(&vc_persist);
    let value_ = path::value_(&vc_persist);
    let value_kind_ = path::value_kind_(&vc_persist);
    let result_ = path::result_(&vc_persist);
    let enum_ = quote!(#vc_persist::PersistEnum);
    let info_ = quote!(#vc_persist::info);
    let as_string = attrs.as_string.is_some();
    let indices = 0..idents.len();
    let indices2 = indices.clone();

    let variant_index = if idents.is_empty() {
        quote!(match *self {})
    } else {
        quote! {
            match self {
                #(Self::#idents => #indices,)*
            }
        }
    };

    Ok(quote! {
        const _: () = {
            impl #enum_ for #ident {
                fn enum_info() -> &'static #info_::EnumInfo {
                    static INFO: ::std::sync::OnceLock<#info_::EnumInfo> = ::std::sync::OnceLock::new();
                    INFO.get_or_init(|| {
                        #info_::EnumInfo::new::<Self>(::std::vec![
                            #(#info_::EnumVariant { name: #names, discriminant: #discriminants },)*
                        ])
                        .with_as_string(#as_string)
                    })
                }

                #[inline]
                fn variant_index(&self) -> usize {
                    #variant_index
                }

                fn from_variant_index(index: usize) -> ::core::option::Option<Self> {
                    match index {
                        #(#indices2 => ::core::option::Option::Some(Self::#idents),)*
                        _ => ::core::option::Option::None,
                    }
                }
            }

            impl #persist_ for #ident {
                #[inline]
                fn value_kind() -> #value_kind_ {
                    #value_kind_::Enum(<Self as #enum_>::enum_info())
                }

                #[inline]
                fn to_value(&self) -> #value_ {
                    <Self as #enum_>::to_enum_value(self)
                }

                #[inline]
                fn from_value(value: #value_) -> #result_<Self> {
                    <Self as #enum_>::from_enum_value(value)
                }
            }
        };
    })
}
