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

//! Expansion of `#[handlers]` on an inherent `impl` block.

use crate::marker::{static_entry, MarkerArgs, MarkerKind};
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::spanned::Spanned;
use syn::{FnArg, ImplItem, ItemImpl, Type};

pub(crate) fn expand(mut item: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[handlers] goes on an inherent impl block",
        ));
    }

    let type_label = type_label(&item.self_ty);
    let generic = !item.generics.params.is_empty();
    let mut declarations = Vec::new();
    let mut statics = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };

        let mut markers = Vec::new();
        let mut kept = Vec::with_capacity(method.attrs.len());
        for attr in method.attrs.drain(..) {
            match MarkerKind::of(&attr) {
                Some(kind) => markers.push((kind, attr.parse_args::<MarkerArgs>()?)),
                None => kept.push(attr),
            }
        }
        method.attrs = kept;
        if markers.is_empty() {
            continue;
        }

        let ident = &method.sig.ident;
        let name = format!("{type_label}::{ident}");
        match method.sig.inputs.first() {
            Some(FnArg::Receiver(receiver)) => {
                if receiver.reference.is_none() || receiver.mutability.is_some() {
                    return Err(syn::Error::new(
                        receiver.span(),
                        "handler methods take `&self`; use interior mutability for state",
                    ));
                }
                for (kind, args) in &markers {
                    let key = &args.key;
                    let priority = args.priority_tokens();
                    let register = match kind {
                        MarkerKind::Topic => quote!(topic_as),
                        MarkerKind::Provides => quote!(provides_as),
                    };
                    declarations.push(quote! {
                        decl.#register(#name, #key, #priority, Self::#ident);
                    });
                }
            }
            _ => {
                if generic {
                    return Err(syn::Error::new(
                        method.sig.span(),
                        "associated handler functions are not supported on generic impl blocks",
                    ));
                }
                let self_ty = &item.self_ty;
                for (kind, args) in &markers {
                    statics.push(static_entry(
                        *kind,
                        args,
                        quote!(<#self_ty>::#ident),
                        &name,
                    ));
                }
            }
        }
    }

    let (impl_generics, _, where_clause) = item.generics.split_for_impl();
    let self_ty = &item.self_ty;
    Ok(quote! {
        #item

        impl #impl_generics ::beacon_core::Handlers for #self_ty #where_clause {
            #[allow(unused_variables)]
            fn declare(decl: &mut ::beacon_core::Declarations<Self>) {
                #(#declarations)*
            }
        }

        #(#statics)*
    })
}

fn type_label(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default(),
        other => other.to_token_stream().to_string(),
    }
}
