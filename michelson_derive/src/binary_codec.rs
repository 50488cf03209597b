//! Derive macro for the fixed binary layouts of chain domain types.
//!
//! Generates `Encode` and `Decode` implementations against
//! `crate::types::encoding`.
//!
//! # Supported Types
//!
//! - **Named structs**: `struct Foo { a: u8, b: [u8; 20] }`
//! - **Tuple structs**: `struct ContractHash(pub [u8; 20])`
//! - **Enums**: one tag byte followed by the variant fields, e.g. the
//!   `key_hash` layout `enum KeyHash { Ed25519([u8; 20]) = 0, ... }`
//!
//! # Variant attributes
//!
//! - `#[binary_codec(padding = N)]`: writes `N` zero bytes after the fields
//!   and rejects non-zero padding on decode (originated addresses carry one
//!   padding byte after the contract hash).
//!
//! Unions are not supported.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let bodies = match &input.data {
        Data::Struct(data_struct) => Ok(struct_bodies(&data_struct.fields)),
        Data::Enum(data_enum) => enum_bodies(data_enum),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input,
            "BinaryCodec derive does not support unions",
        )),
    };

    let (encode_body, decode_body) = match bodies {
        Ok(bodies) => bodies,
        Err(err) => return err.to_compile_error().into(),
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Encode/decode bodies for a struct, fields in declaration order.
fn struct_bodies(fields: &Fields) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            (
                quote! { #( crate::types::encoding::Encode::encode(&self.#names, out); )* },
                quote! {
                    Ok(Self { #( #names: crate::types::encoding::Decode::decode(input)?, )* })
                },
            )
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
            let decoders = indices
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
            (
                quote! { #( crate::types::encoding::Encode::encode(&self.#indices, out); )* },
                quote! { Ok(Self( #(#decoders)* )) },
            )
        }
        Fields::Unit => (quote! { let _ = out; }, quote! { let _ = input; Ok(Self) }),
    }
}

/// Encode/decode bodies for a tagged enum.
fn enum_bodies(
    data_enum: &DataEnum,
) -> syn::Result<(proc_macro2::TokenStream, proc_macro2::TokenStream)> {
    let tags = compute_tags(data_enum)?;
    let mut encode_arms = Vec::with_capacity(tags.len());
    let mut decode_arms = Vec::with_capacity(tags.len());

    for (variant, tag) in data_enum.variants.iter().zip(tags) {
        let variant_name = &variant.ident;
        let padding = variant_padding(variant)?;

        let write_padding = quote! {
            crate::types::encoding::EncodeSink::write(out, &[0u8; #padding]);
        };
        let read_padding = quote! {
            crate::types::encoding::read_padding(input, #padding)?;
        };

        match &variant.fields {
            Fields::Unit => {
                encode_arms.push(quote! {
                    Self::#variant_name => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #write_padding
                    }
                });
                decode_arms.push(quote! {
                    #tag => {
                        #read_padding
                        Ok(Self::#variant_name)
                    }
                });
            }
            Fields::Unnamed(fields) => {
                let bindings: Vec<_> = (0..fields.unnamed.len())
                    .map(|i| quote::format_ident!("f{}", i))
                    .collect();
                let decoders = bindings.iter().map(|b| {
                    quote! { let #b = crate::types::encoding::Decode::decode(input)?; }
                });
                encode_arms.push(quote! {
                    Self::#variant_name(#(#bindings),*) => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #( crate::types::encoding::Encode::encode(#bindings, out); )*
                        #write_padding
                    }
                });
                decode_arms.push(quote! {
                    #tag => {
                        #(#decoders)*
                        #read_padding
                        Ok(Self::#variant_name(#(#bindings),*))
                    }
                });
            }
            Fields::Named(fields) => {
                let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                encode_arms.push(quote! {
                    Self::#variant_name { #(#names),* } => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #( crate::types::encoding::Encode::encode(#names, out); )*
                        #write_padding
                    }
                });
                decode_arms.push(quote! {
                    #tag => {
                        #( let #names = crate::types::encoding::Decode::decode(input)?; )*
                        #read_padding
                        Ok(Self::#variant_name { #(#names),* })
                    }
                });
            }
        }
    }

    Ok((
        quote! {
            match self {
                #(#encode_arms)*
            }
        },
        quote! {
            let tag: u8 = crate::types::encoding::Decode::decode(input)?;
            match tag {
                #(#decode_arms)*
                other => Err(crate::types::encoding::DecodeError::UnknownTag(other)),
            }
        },
    ))
}

/// Computes the tag byte of each variant, following Rust's discriminant rules.
fn compute_tags(data_enum: &DataEnum) -> syn::Result<Vec<u8>> {
    let mut tags = Vec::with_capacity(data_enum.variants.len());
    let mut next: u16 = 0;

    for variant in &data_enum.variants {
        let tag = match &variant.discriminant {
            Some((_, syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(lit),
                ..
            }))) => lit.base10_parse::<u8>()?,
            Some((_, expr)) => {
                return Err(syn::Error::new_spanned(
                    expr,
                    "tag must be an integer literal in 0..=255",
                ));
            }
            None => u8::try_from(next).map_err(|_| {
                syn::Error::new_spanned(variant, "more than 256 variants cannot be tagged by a byte")
            })?,
        };
        tags.push(tag);
        next = u16::from(tag) + 1;
    }

    Ok(tags)
}

/// Reads `#[binary_codec(padding = N)]`, defaulting to zero.
fn variant_padding(variant: &syn::Variant) -> syn::Result<usize> {
    let mut padding = 0usize;
    for attr in &variant.attrs {
        if !attr.path().is_ident("binary_codec") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("padding") {
                let lit: syn::LitInt = meta.value()?.parse()?;
                padding = lit.base10_parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported binary_codec attribute; expected `padding = N`"))
            }
        })?;
    }
    Ok(padding)
}
