/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Relaymesh Macro Library
//!
//! Procedural macros for declaring types that travel over relaymesh channels.
//!
//! # Message Macro
//!
//! The [`relay_message`] macro turns a plain struct or enum into a channel payload:
//!
//! ```ignore
//! #[relay_message]
//! pub struct Reading {
//!     pub sensor: String,
//!     pub value: f32,
//! }
//!
//! // Also derive PartialEq, handy for assertions
//! #[relay_message(eq)]
//! pub enum Command {
//!     Start,
//!     Stop,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                // Accept both `Serialize` and `serde::Serialize`.
                if meta
                    .path
                    .segments
                    .last()
                    .is_some_and(|segment| segment.ident == trait_name)
                {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Configuration options parsed from `#[relay_message(...)]` attributes.
#[derive(Default)]
struct MessageConfig {
    /// Also derive `PartialEq`.
    eq: bool,
}

impl MessageConfig {
    /// Parse configuration from attribute tokens.
    fn parse(attr: &TokenStream) -> Self {
        let mut config = Self::default();

        let attr_string = attr.to_string();
        for part in attr_string.split(',') {
            if part.trim() == "eq" {
                config.eq = true;
            }
        }

        config
    }
}

/// Derives the traits a type needs to be sent and received on a relaymesh channel.
///
/// Channel payloads are encoded as MessagePack with named fields, so they must be
/// serde-serializable. They are also handed to receiver callbacks on the dispatch
/// task, so they must be `Send + Sync + 'static`.
///
/// # Usage
///
/// ```ignore
/// use relaymesh::prelude::*;
///
/// #[relay_message]
/// pub struct Position {
///     pub x: f32,
///     pub y: f32,
/// }
/// ```
///
/// This expands to:
/// - `#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]` (only traits not already present)
/// - `PartialEq` as well when written as `#[relay_message(eq)]`
/// - A compile-time assertion that the type is `Send + Sync + 'static`
///
/// **Note:** the generated derives name `serde` directly, so the calling crate needs
/// `serde` (with the `derive` feature) in its dependencies.
#[proc_macro_attribute]
pub fn relay_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = MessageConfig::parse(&attr);

    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if config.eq && !has_derive(&input, "PartialEq") {
            traits.push(quote!(PartialEq));
        }
        if !has_derive(&input, "Serialize") {
            traits.push(quote!(serde::Serialize));
        }
        if !has_derive(&input, "Deserialize") {
            traits.push(quote!(serde::Deserialize));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertRelayMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
