use proc_macro::TokenStream;

pub(crate) mod codegen;
pub(crate) mod crate_path;
pub(crate) mod parsing;

/// Attribute macro turning an impl block into an rpcnest router.
///
/// Methods marked with `#[query]`, `#[mutation]` or `#[subscription]` become
/// procedures. Other methods are left untouched and are not exposed.
///
/// The macro generates an `RpcController` implementation for the type and
/// registers it for discovery, so controllers are found without listing
/// them anywhere.
///
/// # Router arguments
///
/// | Argument | Description |
/// |----------|-------------|
/// | `"prefix"` / `prefix = "..."` | Router name. Defaults to the type name without its `Controller` suffix, first letter lowercased |
/// | `default_instance` | Discovery may build the controller with `Default` when no instance was bound |
///
/// # Procedure arguments
///
/// | Argument | Description |
/// |----------|-------------|
/// | `"path"` / `path = "..."` | Exposed procedure name. Defaults to the method name |
/// | `input = T` | Input schema. Runs garde rules when `T: Validate` |
/// | `output = T` | Output schema, applied to every item of a stream |
/// | `content_type = "..."` | Mutation input encoding: `json`, `formdata`, `octet-stream` or `text` |
/// | `streaming` | The method returns a `Sequence`, an `Emitter` or a `ProcedureOutput` |
/// | `sse` | Mark the procedure as served over server-sent events |
///
/// Procedures take `&self` and at most one input parameter, which is decoded
/// from the request's JSON input.
///
/// # Example
///
/// ```ignore
/// #[derive(Default)]
/// pub struct UsersController { /* ... */ }
///
/// #[rpc_router(default_instance)]
/// impl UsersController {
///     #[query("getById")]
///     async fn get_by_id(&self, id: u64) -> Result<User, RpcError> {
///         // ...
///     }
///
///     #[mutation(input = CreateUser)]
///     async fn create(&self, input: CreateUser) -> Result<User, RpcError> {
///         // ...
///     }
///
///     #[subscription]
///     async fn events(&self) -> Sequence<UserEvent> {
///         // ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn rpc_router(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as parsing::RouterArgs);
    let item = syn::parse_macro_input!(input as syn::ItemImpl);
    match parsing::parse(args, item) {
        Ok(def) => codegen::generate(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Marks a method as a query procedure. Consumed by `#[rpc_router]`.
#[proc_macro_attribute]
pub fn query(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Marks a method as a mutation procedure. Consumed by `#[rpc_router]`.
#[proc_macro_attribute]
pub fn mutation(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Marks a method as a subscription procedure. Consumed by `#[rpc_router]`.
#[proc_macro_attribute]
pub fn subscription(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}
