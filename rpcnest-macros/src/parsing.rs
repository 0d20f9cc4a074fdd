//! Parsing for the `#[rpc_router(...)]` attribute macro.

use syn::parse::{Parse, ParseStream};
use syn::{Ident, LitStr, Token, Type};

/// Arguments of `#[rpc_router]`: `("prefix")` or `(prefix = "...", default_instance)`.
#[derive(Default)]
pub struct RouterArgs {
    pub prefix: Option<LitStr>,
    pub default_instance: bool,
}

impl Parse for RouterArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = RouterArgs::default();
        if input.peek(LitStr) {
            args.prefix = Some(input.parse()?);
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            match key.to_string().as_str() {
                "prefix" => {
                    input.parse::<Token![=]>()?;
                    args.prefix = Some(input.parse()?);
                }
                "default_instance" => args.default_instance = true,
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown rpc_router option `{other}`, expected `prefix` or `default_instance`"),
                    ))
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }
        Ok(args)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Query,
    Mutation,
    Subscription,
}

impl Kind {
    fn from_attr(attr: &syn::Attribute) -> Option<Self> {
        let path = attr.path();
        if path.is_ident("query") {
            Some(Kind::Query)
        } else if path.is_ident("mutation") {
            Some(Kind::Mutation)
        } else if path.is_ident("subscription") {
            Some(Kind::Subscription)
        } else {
            None
        }
    }
}

/// Options of a `#[query]`, `#[mutation]` or `#[subscription]` marker.
pub struct ProcedureAttr {
    pub kind: Kind,
    pub path: Option<LitStr>,
    pub input: Option<Type>,
    pub output: Option<Type>,
    pub streaming: bool,
    pub sse: bool,
    /// Variant name of `ContentType`.
    pub content_type: Option<Ident>,
}

impl ProcedureAttr {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            path: None,
            input: None,
            output: None,
            streaming: false,
            sse: false,
            content_type: None,
        }
    }

    /// Whether the handler's return value is converted as a stream.
    pub fn is_stream(&self) -> bool {
        self.kind == Kind::Subscription || self.streaming
    }
}

fn content_type_variant(lit: &LitStr) -> syn::Result<Ident> {
    let variant = match lit.value().as_str() {
        "json" => "Json",
        "formdata" | "form-data" => "FormData",
        "octet-stream" => "OctetStream",
        "text" => "Text",
        other => {
            return Err(syn::Error::new(
                lit.span(),
                format!("unknown content type `{other}`, expected json, formdata, octet-stream or text"),
            ))
        }
    };
    Ok(Ident::new(variant, lit.span()))
}

fn parse_procedure_args(kind: Kind, input: ParseStream) -> syn::Result<ProcedureAttr> {
    let mut attr = ProcedureAttr::new(kind);
    if input.peek(LitStr) {
        attr.path = Some(input.parse()?);
        if !input.is_empty() {
            input.parse::<Token![,]>()?;
        }
    }
    while !input.is_empty() {
        let key: Ident = input.parse()?;
        match key.to_string().as_str() {
            "path" => {
                input.parse::<Token![=]>()?;
                attr.path = Some(input.parse()?);
            }
            "input" => {
                input.parse::<Token![=]>()?;
                attr.input = Some(input.parse()?);
            }
            "output" => {
                input.parse::<Token![=]>()?;
                attr.output = Some(input.parse()?);
            }
            "content_type" => {
                input.parse::<Token![=]>()?;
                let lit: LitStr = input.parse()?;
                attr.content_type = Some(content_type_variant(&lit)?);
            }
            "streaming" => attr.streaming = true,
            "sse" => attr.sse = true,
            other => {
                return Err(syn::Error::new(
                    key.span(),
                    format!("unknown procedure option `{other}`"),
                ))
            }
        }
        if input.is_empty() {
            break;
        }
        input.parse::<Token![,]>()?;
    }
    if attr.content_type.is_some() && kind != Kind::Mutation {
        return Err(syn::Error::new(
            input.span(),
            "`content_type` only applies to mutations",
        ));
    }
    Ok(attr)
}

fn parse_procedure_attr(kind: Kind, attr: &syn::Attribute) -> syn::Result<ProcedureAttr> {
    match &attr.meta {
        syn::Meta::Path(_) => Ok(ProcedureAttr::new(kind)),
        syn::Meta::List(_) => attr.parse_args_with(|input: ParseStream| parse_procedure_args(kind, input)),
        syn::Meta::NameValue(_) => Err(syn::Error::new_spanned(
            attr,
            "expected `#[query]` or `#[query(...)]`",
        )),
    }
}

/// A method carrying a procedure marker.
pub struct ProcedureMethod {
    pub name: Ident,
    pub attr: ProcedureAttr,
    /// Type of the single input parameter, if any.
    pub input_ty: Option<Type>,
    pub is_async: bool,
}

/// Parsed `#[rpc_router] impl Name { ... }` block.
pub struct RouterImplDef {
    pub controller_name: Ident,
    pub args: RouterArgs,
    pub procedures: Vec<ProcedureMethod>,
    /// The impl block with procedure markers stripped.
    pub item: syn::ItemImpl,
}

fn check_signature(method: &syn::ImplItemFn) -> syn::Result<Option<Type>> {
    let mut inputs = method.sig.inputs.iter();
    match inputs.next() {
        Some(syn::FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(
                &method.sig,
                "procedures must take `&self`",
            ))
        }
    }
    let input_ty = match inputs.next() {
        Some(syn::FnArg::Typed(pat_type)) => Some((*pat_type.ty).clone()),
        Some(arg @ syn::FnArg::Receiver(_)) => {
            return Err(syn::Error::new_spanned(arg, "unexpected receiver"))
        }
        None => None,
    };
    if let Some(extra) = inputs.next() {
        return Err(syn::Error::new_spanned(
            extra,
            "procedures take at most one input parameter",
        ));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &method.sig.generics,
            "procedures cannot be generic",
        ));
    }
    Ok(input_ty)
}

pub fn parse(args: RouterArgs, mut item: syn::ItemImpl) -> syn::Result<RouterImplDef> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[rpc_router] goes on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[rpc_router] does not support generic controllers",
        ));
    }

    let controller_name = match *item.self_ty {
        syn::Type::Path(ref type_path) => type_path
            .path
            .segments
            .last()
            .ok_or_else(|| syn::Error::new_spanned(&item.self_ty, "expected type name"))?
            .ident
            .clone(),
        _ => {
            return Err(syn::Error::new_spanned(
                &item.self_ty,
                "expected a type path",
            ))
        }
    };

    let mut procedures = Vec::new();
    for impl_item in item.items.iter_mut() {
        let syn::ImplItem::Fn(method) = impl_item else {
            continue;
        };

        let mut found: Option<ProcedureAttr> = None;
        let mut kept = Vec::with_capacity(method.attrs.len());
        for attr in std::mem::take(&mut method.attrs) {
            match Kind::from_attr(&attr) {
                Some(kind) => {
                    if found.is_some() {
                        return Err(syn::Error::new_spanned(
                            &attr,
                            "a method can carry only one procedure marker",
                        ));
                    }
                    found = Some(parse_procedure_attr(kind, &attr)?);
                }
                None => kept.push(attr),
            }
        }
        method.attrs = kept;

        if let Some(attr) = found {
            let input_ty = check_signature(method)?;
            procedures.push(ProcedureMethod {
                name: method.sig.ident.clone(),
                attr,
                input_ty,
                is_async: method.sig.asyncness.is_some(),
            });
        }
    }

    Ok(RouterImplDef {
        controller_name,
        args,
        procedures,
        item,
    })
}
