// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This crate provides the declaration attributes for the Beacon bus.
//!
//! * `#[topic("key", priority = N)]` marks a topic handler.
//! * `#[provides("key", priority = N)]` marks a request provider.
//! * `#[handlers]` on an `impl` block turns its marked `&self` methods into
//!   an implementation of `beacon_core::Handlers`.
//!
//! Markers are repeatable. On free functions (and on associated functions
//! without `self`) they register through `inventory` and are picked up by
//! `Bus::register_static_handlers`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, ItemImpl};

mod handlers;
mod marker;

use marker::{static_entry, MarkerArgs, MarkerKind};

/// Declares a free function as a handler for a topic.
///
/// The function takes the sender as `&dyn Any` followed by the payload
/// parameters it wants bound, and returns `()` or a `Result<(), E>`.
///
/// ```ignore
/// #[topic("score.changed", priority = 5)]
/// fn log_score(_sender: &dyn Any, score: i32) { log::info!("score {score}"); }
/// ```
#[proc_macro_attribute]
pub fn topic(args: TokenStream, input: TokenStream) -> TokenStream {
    free_marker(MarkerKind::Topic, args, input)
}

/// Declares a free function as a provider for a request type.
///
/// The function takes the requester as `&dyn Any` followed by its
/// parameters, and must return a value.
///
/// ```ignore
/// #[provides("stat.modifiers", priority = 2)]
/// fn base_modifiers(_requester: &dyn Any, kind: StatKind) -> Vec<Modifier> { .. }
/// ```
#[proc_macro_attribute]
pub fn provides(args: TokenStream, input: TokenStream) -> TokenStream {
    free_marker(MarkerKind::Provides, args, input)
}

/// Implements `beacon_core::Handlers` from the `#[topic]` and `#[provides]`
/// markers on the methods of an inherent `impl` block.
#[proc_macro_attribute]
pub fn handlers(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[handlers] takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    let item = parse_macro_input!(input as ItemImpl);
    handlers::expand(item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn free_marker(kind: MarkerKind, args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as MarkerArgs);
    let function = parse_macro_input!(input as ItemFn);

    if let Some(FnArg::Receiver(receiver)) = function.sig.inputs.first() {
        return syn::Error::new_spanned(
            receiver,
            "methods are declared through #[handlers] on their impl block",
        )
        .to_compile_error()
        .into();
    }
    if !function.sig.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &function.sig.generics,
            "handler functions cannot be generic",
        )
        .to_compile_error()
        .into();
    }

    let ident = &function.sig.ident;
    let entry = static_entry(kind, &args, quote!(#ident), &ident.to_string());
    TokenStream::from(quote! {
        #function
        #entry
    })
}
