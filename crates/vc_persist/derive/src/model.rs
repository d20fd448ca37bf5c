use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type};

use crate::attributes::{FieldAttributes, TypeAttributes};
use crate::path;

// -----------------------------------------------------------------------------
// Parsed Input

struct Member<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    /// The persisted name.
    name: LitStr,
    attrs: FieldAttributes,
}

struct Base<'a> {
    ident: &'a Ident,
    ty: &'a Type,
}

struct ModelInput<'a> {
    ident: &'a Ident,
    attrs: TypeAttributes,
    base: Option<Base<'a>>,
    members: Vec<Member<'a>>,
}

impl<'a> ModelInput<'a> {
    fn parse(input: &'a DeriveInput) -> syn::Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(syn::Error::new_spanned(
                &input.generics,
                "`Model` cannot be derived for generic types",
            ));
        }

        let Data::Struct(data) = &input.data else {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "`Model` can only be derived for structs",
            ));
        };
        let Fields::Named(fields) = &data.fields else {
            return Err(syn::Error::new_spanned(
                &data.fields,
                "`Model` requires named fields",
            ));
        };

        let attrs = TypeAttributes::parse_attrs(&input.attrs)?;
        if let Some(span) = attrs.as_string {
            return Err(syn::Error::new(span, "`as_string` applies to enums and members"));
        }

        let mut base = None;
        let mut members = Vec::with_capacity(fields.named.len());
        for field in &fields.named {
            let attrs = FieldAttributes::parse_attrs(&field.attrs)?;
            let Some(ident) = field.ident.as_ref() else {
                continue;
            };

            if let Some(span) = attrs.base {
                if base.is_some() {
                    return Err(syn::Error::new(span, "only one field can be the `base`"));
                }
                base = Some(Base { ident, ty: &field.ty });
                continue;
            }

            let name = match &attrs.rename {
                Some(name) => name.clone(),
                None => LitStr::new(&ident.unraw().to_string(), ident.span()),
            };
            members.push(Member {
                ident,
                ty: &field.ty,
                name,
                attrs,
            });
        }

        Ok(Self {
            ident: &input.ident,
            attrs,
            base,
            members,
        })
    }

    fn persisted(&self) -> impl Iterator<Item = &Member<'a>> {
        self.members.iter().filter(|m| m.attrs.is_persisted())
    }
}

// -----------------------------------------------------------------------------
// Generation

pub(crate) fn impl_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let input = ModelInput::parse(input)?;
    let vc_persist = path::vc_persist();

    let model_info = impl_model_info(&input, &vc_persist);
    let model = impl_model_trait(&input, &vc_persist, model_info);
    let persist = impl_persist(&input, &vc_persist);
    let auto_register = impl_auto_register(&input, &vc_persist);

    Ok(quote! {
        const _: () = {
            #model

            #persist

            #auto_register
        };
    })
}

fn impl_model_info(input: &ModelInput, vc_persist: &syn::Path) -> TokenStream {
    let persist_ = path::persist_(vc_persist);
    let flags_ = quote!(#vc_persist::MemberFlags);

    let fields = input.members.iter().map(|member| {
        let name = &member.name;
        let ty = member.ty;
        let attrs = &member.attrs;

        let mut flags = Vec::new();
        if attrs.exclude {
            flags.push(quote!(#flags_::EXCLUDED));
        }
        if attrs.include {
            flags.push(quote!(#flags_::FORCE_INCLUDED));
        }
        if attrs.enum_as_string {
            flags.push(quote!(#flags_::ENUM_AS_STRING));
        }
        if attrs.custom {
            flags.push(quote!(#flags_::CUSTOM));
        }
        if attrs.computed {
            flags.push(quote!(#flags_::COMPUTED));
        }
        let flags = if flags.is_empty() {
            quote!(#flags_::empty())
        } else {
            quote!(#(#flags)|*)
        };

        let kind = attrs
            .is_persisted()
            .then(|| quote!(.with_kind(<#ty as #persist_>::value_kind)));
        let converter = attrs.converter.as_ref().map(|id| quote!(.with_converter(#id)));

        quote! {
            #vc_persist::FieldInfo::new(#name, #flags) #kind #converter
        }
    });

    let ident = input.ident;
    let assembly = match &input.attrs.assembly {
        Some(assembly) => quote!(#assembly),
        None => quote!(::core::env!("CARGO_PKG_NAME")),
    };
    let type_name = match &input.attrs.type_name {
        Some(name) => name.clone(),
        None => LitStr::new(&ident.unraw().to_string(), ident.span()),
    };

    let base = input.base.as_ref().map(|base| {
        let ty = base.ty;
        quote!(.with_base::<#ty>())
    });
    let custom = input.attrs.custom.map(|_| quote!(.with_custom(true)));
    let redirects = input.attrs.redirects.iter().map(|redirect| {
        let from_assembly = match &redirect.assembly {
            Some(assembly) => quote!(#assembly),
            None => assembly.clone(),
        };
        let from_name = &redirect.type_name;
        quote!(.with_redirect(#from_assembly, #from_name))
    });

    quote! {
        static INFO: ::std::sync::OnceLock<#vc_persist::ModelInfo> = ::std::sync::OnceLock::new();
        INFO.get_or_init(|| {
            #vc_persist::ModelInfo::new::<Self>(::std::vec![#(#fields),*])
                .with_key(#vc_persist::TypeKey::from_static(#assembly, #type_name))
                #base
                #custom
                #(#redirects)*
        })
    }
}

fn impl_model_trait(input: &ModelInput, vc_persist: &syn::Path, model_info: TokenStream) -> TokenStream {
    let ident = input.ident;
    let model_ = path::model_(vc_persist);
    let persist_ = path::persist_(vc_persist);
    let value_ = path::value_(vc_persist);
    let value_ref_ = path::value_ref_(vc_persist);
    let result_ = path::result_(vc_persist);
    let macro_exports_ = path::macro_exports_(vc_persist);

    let names: Vec<_> = input.persisted().map(|m| &m.name).collect();
    let idents: Vec<_> = input.persisted().map(|m| m.ident).collect();

    let (get_fallback, ref_fallback, set_fallback) = match &input.base {
        Some(Base { ident: base, ty }) => (
            quote!(<#ty as #model_>::get_member(&self.#base, name)),
            quote!(<#ty as #model_>::member_ref(&self.#base, name)),
            quote!(<#ty as #model_>::set_member(&mut self.#base, name, value)),
        ),
        None => (
            quote!(::core::option::Option::None),
            quote!(::core::option::Option::None),
            quote! {{
                ::core::mem::drop(value);
                ::core::result::Result::Err(#macro_exports_::unknown_member(
                    <Self as #model_>::model_info().type_path(),
                    name,
                ))
            }},
        ),
    };

    let custom = input.attrs.custom.map(|span| {
        let custom_ = quote!(#vc_persist::CustomSerialize);
        quote_spanned! { span =>
            fn as_custom(&self) -> ::core::option::Option<&dyn #custom_> {
                ::core::option::Option::Some(self)
            }

            fn as_custom_mut(&mut self) -> ::core::option::Option<&mut dyn #custom_> {
                ::core::option::Option::Some(self)
            }
        }
    });

    quote! {
        impl #model_ for #ident {
            fn model_info() -> &'static #vc_persist::ModelInfo {
                #model_info
            }

            #[inline]
            fn info(&self) -> &'static #vc_persist::ModelInfo {
                <Self as #model_>::model_info()
            }

            fn get_member(&self, name: &str) -> ::core::option::Option<#value_> {
                match name {
                    #(#names => ::core::option::Option::Some(#persist_::to_value(&self.#idents)),)*
                    _ => #get_fallback,
                }
            }

            fn member_ref(&self, name: &str) -> ::core::option::Option<#value_ref_<'_>> {
                match name {
                    #(#names => ::core::option::Option::Some(#persist_::to_value_ref(&self.#idents)),)*
                    _ => #ref_fallback,
                }
            }

            fn set_member(&mut self, name: &str, value: #value_) -> #result_<()> {
                match name {
                    #(#names => {
                        self.#idents = #persist_::from_value(value)?;
                        ::core::result::Result::Ok(())
                    })*
                    _ => #set_fallback,
                }
            }

            fn clone_model(&self) -> ::std::boxed::Box<dyn #model_> {
                ::std::boxed::Box::new(::core::clone::Clone::clone(self))
            }

            #custom
        }
    }
}

fn impl_persist(input: &ModelInput, vc_persist: &syn::Path) -> TokenStream {
    let ident = input.ident;
    let persist_ = path::persist_(vc_persist);
    let value_ = path::value_(vc_persist);
    let value_ref_ = path::value_ref_(vc_persist);
    let value_kind_ = path::value_kind_(vc_persist);
    let result_ = path::result_(vc_persist);
    let macro_exports_ = path::macro_exports_(vc_persist);

    quote! {
        impl #persist_ for #ident {
            #[inline]
            fn value_kind() -> #value_kind_ {
                #value_kind_::model::<Self>()
            }

            fn to_value(&self) -> #value_ {
                #value_::Model(::std::boxed::Box::new(::core::clone::Clone::clone(self)))
            }

            #[inline]
            fn to_value_ref(&self) -> #value_ref_<'_> {
                #value_ref_::Model(self)
            }

            fn from_value(value: #value_) -> #result_<Self> {
                #macro_exports_::model_from_value::<Self>(value)
            }
        }
    }
}

#[cfg(feature = "auto_register")]
fn impl_auto_register(input: &ModelInput, vc_persist: &syn::Path) -> TokenStream {
    let Some(span) = input.attrs.auto_register else {
        return TokenStream::new();
    };
    let ident = input.ident;
    let auto_register_ = path::auto_register_(vc_persist);

    quote_spanned! { span =>
        fn __register(registry: &mut #vc_persist::ModelRegistry) {
            registry.register::<#ident>();
        }

        #auto_register_::inventory::submit!{
            #auto_register_::__AutoRegisterFunc(__register)
        }
    }
}

#[cfg(not(feature = "auto_register"))]
fn impl_auto_register(_: &ModelInput, _: &syn::Path) -> TokenStream {
    TokenStream::new()
}
