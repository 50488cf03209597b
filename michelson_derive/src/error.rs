//! Derive macro for error types.
//!
//! Generates `std::fmt::Display`, `std::error::Error` and, for variants
//! whose single field is marked `#[from]`, a `From` conversion.
//!
//! # Usage
//!
//! ```ignore
//! use michelson_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum VMError {
//!     #[error("unknown primitive: {0}")]
//!     UnknownPrimitive(String),
//!
//!     #[error("stack underflow: {instruction} needs {required}, found {available}")]
//!     StackUnderflow { instruction: &'static str, required: usize, available: usize },
//!
//!     #[error("decode error: {0}")]
//!     Decode(#[from] DecodeError),
//! }
//! ```
//!
//! Messages interpolate `{0}`, `{1}` for tuple fields and `{name}` for
//! struct fields.

use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::with_capacity(data_enum.variants.len());
            let mut from_impls = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message_from_attrs(
                    &variant.attrs,
                    &variant.ident,
                    &format!("variant `{}`", variant.ident),
                )?;

                let arm = match &variant.fields {
                    Fields::Unit => quote! {
                        Self::#variant_name => write!(f, #error_msg),
                    },
                    Fields::Unnamed(fields) => {
                        let format_str =
                            convert_positional_to_named(&error_msg, fields.unnamed.len());
                        let bindings: Vec<_> = (0..fields.unnamed.len())
                            .map(|i| {
                                let ident = quote::format_ident!("f{}", i);
                                if mentions(&format_str, &ident.to_string()) {
                                    quote! { #ident }
                                } else {
                                    quote! { _ }
                                }
                            })
                            .collect();
                        let used: Vec<_> = (0..fields.unnamed.len())
                            .map(|i| quote::format_ident!("f{}", i))
                            .filter(|ident| mentions(&format_str, &ident.to_string()))
                            .collect();
                        quote! {
                            Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#used = #used),*),
                        }
                    }
                    Fields::Named(fields) => {
                        let used: Vec<_> = fields
                            .named
                            .iter()
                            .filter_map(|f| f.ident.as_ref())
                            .filter(|ident| mentions(&error_msg, &ident.to_string()))
                            .collect();
                        quote! {
                            Self::#variant_name { #(#used,)* .. } => write!(f, #error_msg, #(#used = #used),*),
                        }
                    }
                };
                display_arms.push(arm);

                if let Fields::Unnamed(fields) = &variant.fields {
                    let marked = fields
                        .unnamed
                        .iter()
                        .any(|field| field.attrs.iter().any(|a| a.path().is_ident("from")));
                    if marked {
                        if fields.unnamed.len() != 1 {
                            return Err(syn::Error::new_spanned(
                                variant,
                                "#[from] requires a variant with exactly one field",
                            ));
                        }
                        let source_ty = &fields.unnamed[0].ty;
                        from_impls.push(quote! {
                            impl #impl_generics ::std::convert::From<#source_ty> for #name #ty_generics #where_clause {
                                fn from(source: #source_ty) -> Self {
                                    Self::#variant_name(source)
                                }
                            }
                        });
                    }
                }
            }

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}

                #(#from_impls)*
            })
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            let display_body = match &data_struct.fields {
                Fields::Unit => quote! { write!(f, #error_msg) },
                Fields::Named(fields) => {
                    let used: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|f| f.ident.as_ref())
                        .filter(|ident| mentions(&error_msg, &ident.to_string()))
                        .collect();
                    quote! {
                        write!(f, #error_msg, #(#used = self.#used),*)
                    }
                }
                Fields::Unnamed(fields) => {
                    let format_str = convert_positional_to_named(&error_msg, fields.unnamed.len());
                    let (field_idents, field_indices): (Vec<_>, Vec<_>) = (0..fields.unnamed.len())
                        .map(|i| (quote::format_ident!("f{}", i), syn::Index::from(i)))
                        .filter(|(ident, _)| mentions(&format_str, &ident.to_string()))
                        .unzip();
                    quote! {
                        write!(f, #format_str, #(#field_idents = self.#field_indices),*)
                    }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        #display_body
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Extracts the message of an `#[error("...")]` attribute.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")]",
            ));
        };
        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"type mismatch: {0}\")]",
            )
        })?;
        return match lit {
            Lit::Str(lit_str) => Ok(lit_str.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "#[error] message must be a string literal",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Returns `true` when the format string interpolates `name`.
fn mentions(format_str: &str, name: &str) -> bool {
    format_str.contains(&format!("{{{}}}", name)) || format_str.contains(&format!("{{{}:", name))
}

/// Rewrites positional `{0}`, `{1}` into the generated `{f0}`, `{f1}` bindings.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result.replace(&format!("{{{}}}", i), &format!("{{f{}}}", i));
        result = result.replace(&format!("{{{}:", i), &format!("{{f{}:", i));
    }
    result
}
