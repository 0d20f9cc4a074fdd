//! Code generation for `#[rpc_router]`.

use proc_macro2::TokenStream;
use quote::quote;

use crate::crate_path::macro_support_path;
use crate::parsing::{Kind, ProcedureMethod, RouterImplDef};

pub fn generate(def: &RouterImplDef) -> TokenStream {
    let ms = macro_support_path();
    let item = &def.item;
    let name = &def.controller_name;
    let name_str = name.to_string();

    let prefix = def.args.prefix.as_ref().map(|prefix| quote!(.prefix(#prefix)));
    let default_instance = def.args.default_instance.then(|| quote!(.default_instance()));
    let procedures = def.procedures.iter().map(|p| procedure(&ms, p));

    quote! {
        #item

        impl #ms::RpcController for #name {
            fn declaration() -> #ms::ControllerDecl<Self> {
                #ms::ControllerDecl::new(#name_str)
                    #prefix
                    #(#procedures)*
                    #default_instance
            }
        }

        #ms::inventory::submit! {
            #ms::ControllerRegistration {
                name: #name_str,
                declare: #ms::declare_erased::<#name>,
            }
        }
    }
}

/// Schema for `ty`, running its garde rules when it implements `Validate`.
fn schema(ms: &TokenStream, ty: &syn::Type) -> TokenStream {
    quote! {
        #ms::Schema::with_check::<#ty, _>(::core::stringify!(#ty), |value: &#ty| {
            #[allow(unused_imports)]
            use #ms::{__DoValidate as _, __SkipValidate as _};
            (&#ms::__AutoValidator(value)).__maybe_validate()
        })
    }
}

fn meta(ms: &TokenStream, p: &ProcedureMethod) -> TokenStream {
    let method_name = p.name.to_string();
    let kind = match p.attr.kind {
        Kind::Query => quote!(Query),
        Kind::Mutation => quote!(Mutation),
        Kind::Subscription => quote!(Subscription),
    };

    let mut meta = quote!(#ms::ProcedureMeta::new(#ms::ProcedureKind::#kind, #method_name));
    if let Some(path) = &p.attr.path {
        meta = quote!(#meta.with_path(#path));
    }
    if let Some(ty) = &p.attr.input {
        let schema = schema(ms, ty);
        meta = quote!(#meta.with_input(#schema));
    }
    if let Some(ty) = &p.attr.output {
        let schema = schema(ms, ty);
        meta = quote!(#meta.with_output(#schema));
    }
    if let Some(variant) = &p.attr.content_type {
        meta = quote!(#meta.with_content_type(#ms::ContentType::#variant));
    }
    if p.attr.streaming {
        meta = quote!(#meta.streaming());
    }
    if p.attr.sse {
        meta = quote!(#meta.sse());
    }
    meta
}

fn procedure(ms: &TokenStream, p: &ProcedureMethod) -> TokenStream {
    let meta = meta(ms, p);
    let method = &p.name;
    let awaited = p.is_async.then(|| quote!(.await));
    let wrap = if p.attr.is_stream() {
        quote!(#ms::stream_handler)
    } else {
        quote!(#ms::typed_handler)
    };

    // Methods without an input accept and ignore whatever the client sent.
    let (param, call) = match &p.input_ty {
        Some(ty) => (quote!(__input: #ty), quote!(__this.#method(__input))),
        None => (quote!(_: #ms::Value), quote!(__this.#method())),
    };

    quote! {
        .procedure(
            #meta,
            #wrap(|__this: #ms::Arc<Self>, #param| async move { #call #awaited }),
        )
    }
}
