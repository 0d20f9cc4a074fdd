//! Path of the runtime crate for generated code.
//!
//! Generated code goes through `::rpcnest` when the facade is a dependency
//! and through `::rpcnest_core` otherwise.

use proc_macro2::{Span, TokenStream};
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

fn found_path(found: FoundCrate, self_name: &str) -> TokenStream {
    // `Itself` is also reported for the crate's own integration tests, where
    // `crate` names the test crate, so the crate is always named explicitly.
    // The facade declares `extern crate self as rpcnest` for its own sources.
    let name = match found {
        FoundCrate::Itself => self_name.to_string(),
        FoundCrate::Name(name) => name,
    };
    let ident = syn::Ident::new(&name, Span::call_site());
    quote!(::#ident)
}

/// Path to the `__macro_support` module of the runtime.
pub fn macro_support_path() -> TokenStream {
    let root = if let Ok(found) = crate_name("rpcnest") {
        found_path(found, "rpcnest")
    } else if let Ok(found) = crate_name("rpcnest-core") {
        found_path(found, "rpcnest_core")
    } else {
        quote!(::rpcnest_core)
    };
    quote!(#root::__macro_support)
}
