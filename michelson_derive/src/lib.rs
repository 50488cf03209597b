//! Derive macros for the michelson-vm crate.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - fixed binary layouts of chain domain types
//!   (key hashes, public keys, addresses)
//! - `#[derive(Error)]` - error type boilerplate with `#[from]` conversions

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` for tagged fixed-layout domain types.
#[proc_macro_derive(BinaryCodec, attributes(binary_codec))]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display`, `Error` and `From` conversions for error types.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
