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

//! Parsing of `#[topic(..)]` / `#[provides(..)]` arguments and the static
//! registration they expand to.

use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Expr, Ident, LitStr, Token};

/// Which marker an attribute is.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    Topic,
    Provides,
}

impl MarkerKind {
    pub(crate) fn of(attr: &Attribute) -> Option<Self> {
        let ident = attr.path().segments.last()?.ident.to_string();
        match ident.as_str() {
            "topic" => Some(MarkerKind::Topic),
            "provides" => Some(MarkerKind::Provides),
            _ => None,
        }
    }

    fn handler_kind(self) -> TokenStream2 {
        match self {
            MarkerKind::Topic => quote!(::beacon_core::HandlerKind::Topic),
            MarkerKind::Provides => quote!(::beacon_core::HandlerKind::Provider),
        }
    }

    fn erase(self, callable: TokenStream2) -> TokenStream2 {
        match self {
            MarkerKind::Topic => quote!(::beacon_core::Handler::topic(#callable)),
            MarkerKind::Provides => quote!(::beacon_core::Handler::provider(#callable)),
        }
    }
}

/// `("key")`, `("key", 5)` or `("key", priority = 5)`.
pub(crate) struct MarkerArgs {
    pub(crate) key: LitStr,
    pub(crate) priority: Option<Expr>,
}

impl Parse for MarkerArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let key: LitStr = input.parse()?;
        if key.value().is_empty() {
            return Err(syn::Error::new(key.span(), "the key must not be empty"));
        }
        let mut priority = None;
        if input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.peek(Ident) && input.peek2(Token![=]) {
                let name: Ident = input.parse()?;
                if name != "priority" {
                    return Err(syn::Error::new(name.span(), "expected `priority = <i32>`"));
                }
                input.parse::<Token![=]>()?;
            }
            if !input.is_empty() {
                priority = Some(input.parse()?);
            }
            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after the priority"));
        }
        Ok(Self { key, priority })
    }
}

impl MarkerArgs {
    pub(crate) fn priority_tokens(&self) -> TokenStream2 {
        match &self.priority {
            Some(expr) => expr.to_token_stream(),
            None => quote!(::beacon_core::DEFAULT_PRIORITY),
        }
    }
}

/// Emits a link-time [`StaticHandler`] entry for a free callable.
///
/// `callable` is the path used to reach the function, `name` its identity in
/// diagnostics (prefixed with the module path at expansion).
pub(crate) fn static_entry(
    kind: MarkerKind,
    args: &MarkerArgs,
    callable: TokenStream2,
    name: &str,
) -> TokenStream2 {
    let handler_kind = kind.handler_kind();
    let build = kind.erase(callable);
    let key = &args.key;
    let priority = args.priority_tokens();
    quote! {
        const _: () = {
            fn __beacon_build() -> ::beacon_core::Handler {
                #build
            }
            ::beacon_core::inventory::submit! {
                ::beacon_core::StaticHandler {
                    kind: #handler_kind,
                    key: #key,
                    priority: #priority,
                    name: ::core::concat!(::core::module_path!(), "::", #name),
                    build: __beacon_build,
                }
            }
        };
    }
}
