use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RpcError;
use crate::meta::{ControllerClass, ProcedureMeta};
use crate::output::{IntoProcedureResult, IntoProcedureStream, ProcedureOutput};

/// Future returned by every procedure handler.
pub type HandlerFuture = BoxFuture<'static, Result<ProcedureOutput, RpcError>>;

/// Typed handler of a controller method.
pub type Handler<C> = Arc<dyn Fn(Arc<C>, Value) -> HandlerFuture + Send + Sync>;

/// Factory producing a controller without going through the application state.
pub type DefaultFactory = fn() -> ControllerInstance;

/// A live controller with its type erased.
#[derive(Clone)]
pub struct ControllerInstance {
    class: ControllerClass,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ControllerInstance {
    pub fn new<C: Send + Sync + 'static>(instance: Arc<C>) -> Self {
        Self {
            class: ControllerClass::of::<C>(),
            inner: instance,
        }
    }

    pub fn from_value<C: Send + Sync + 'static>(instance: C) -> Self {
        Self::new(Arc::new(instance))
    }

    pub fn class(&self) -> ControllerClass {
        self.class
    }

    pub fn downcast<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        Arc::clone(&self.inner).downcast::<C>().ok()
    }
}

impl std::fmt::Debug for ControllerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInstance")
            .field("class", &self.class.name())
            .finish()
    }
}

/// One entry of a class's method table, callable with any instance of that
/// class.
#[derive(Clone)]
pub struct ErasedMethod {
    name: String,
    call: Arc<dyn Fn(ControllerInstance, Value) -> HandlerFuture + Send + Sync>,
}

impl ErasedMethod {
    pub(crate) fn erase<C: Send + Sync + 'static>(name: String, handler: Handler<C>) -> Self {
        let method = name.clone();
        let call = move |instance: ControllerInstance, input: Value| -> HandlerFuture {
            match instance.downcast::<C>() {
                Some(this) => handler(this, input),
                None => {
                    let message = format!(
                        "method {method} was called on an instance of {}",
                        instance.class()
                    );
                    Box::pin(async move { Err(RpcError::Declaration(message)) })
                }
            }
        };
        Self {
            name,
            call: Arc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, instance: ControllerInstance, input: Value) -> HandlerFuture {
        (self.call)(instance, input)
    }
}

impl std::fmt::Debug for ErasedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ErasedMethod").field(&self.name).finish()
    }
}

/// A method declared on a controller, with its procedure metadata when it is
/// exposed as a procedure.
pub struct MethodDecl<C> {
    pub name: String,
    pub meta: Option<ProcedureMeta>,
    pub handler: Handler<C>,
}

/// Declaration of a controller: its router prefix and method table.
///
/// ```ignore
/// ControllerDecl::new("UsersController")
///     .prefix("users")
///     .query("getAll", |c: Arc<UsersController>, _: ()| async move { c.all().await })
/// ```
pub struct ControllerDecl<C> {
    class: ControllerClass,
    prefix: String,
    methods: Vec<MethodDecl<C>>,
    default_factory: Option<DefaultFactory>,
}

impl<C: Send + Sync + 'static> ControllerDecl<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            class: ControllerClass::named::<C>(name),
            prefix: String::new(),
            methods: Vec::new(),
            default_factory: None,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Add a method exposed as a procedure.
    pub fn procedure(mut self, meta: ProcedureMeta, handler: Handler<C>) -> Self {
        self.methods.push(MethodDecl {
            name: meta.method_name.clone(),
            meta: Some(meta),
            handler,
        });
        self
    }

    /// Add a method to the table without exposing it.
    pub fn method(mut self, name: impl Into<String>, handler: Handler<C>) -> Self {
        self.methods.push(MethodDecl {
            name: name.into(),
            meta: None,
            handler,
        });
        self
    }

    pub fn query<I, F, Fut, R>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoProcedureResult,
    {
        self.procedure(ProcedureMeta::query(name), typed_handler(f))
    }

    pub fn mutation<I, F, Fut, R>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoProcedureResult,
    {
        self.procedure(ProcedureMeta::mutation(name), typed_handler(f))
    }

    pub fn subscription<I, F, Fut, R>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoProcedureStream,
    {
        self.procedure(ProcedureMeta::subscription(name), stream_handler(f))
    }

    /// A query producing a stream of values.
    pub fn streaming_query<I, F, Fut, R>(self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoProcedureStream,
    {
        self.procedure(ProcedureMeta::query(name).streaming(), stream_handler(f))
    }

    pub fn class(&self) -> ControllerClass {
        self.class
    }

    pub(crate) fn into_parts(
        self,
    ) -> (ControllerClass, String, Vec<MethodDecl<C>>, Option<DefaultFactory>) {
        (self.class, self.prefix, self.methods, self.default_factory)
    }
}

impl<C: Default + Send + Sync + 'static> ControllerDecl<C> {
    /// Allow discovery to build the controller with `Default` when no
    /// instance was bound.
    pub fn default_instance(mut self) -> Self {
        let factory: DefaultFactory = || ControllerInstance::from_value(C::default());
        self.default_factory = Some(factory);
        self
    }
}

/// Build a handler from a typed async function returning a single value.
pub fn typed_handler<C, I, F, Fut, R>(f: F) -> Handler<C>
where
    C: Send + Sync + 'static,
    I: DeserializeOwned + Send + 'static,
    F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoProcedureResult,
{
    Arc::new(move |this: Arc<C>, input: Value| -> HandlerFuture {
        match decode_input::<I>(input) {
            Ok(input) => {
                let fut = f(this, input);
                Box::pin(async move { fut.await.into_output() })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        }
    })
}

/// Build a handler from a typed async function returning a stream.
pub fn stream_handler<C, I, F, Fut, R>(f: F) -> Handler<C>
where
    C: Send + Sync + 'static,
    I: DeserializeOwned + Send + 'static,
    F: Fn(Arc<C>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoProcedureStream,
{
    Arc::new(move |this: Arc<C>, input: Value| -> HandlerFuture {
        match decode_input::<I>(input) {
            Ok(input) => {
                let fut = f(this, input);
                Box::pin(async move { fut.await.into_stream_output() })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        }
    })
}

/// Decode a procedure input into the handler's argument type.
///
/// An absent input arrives as `{}`; when that does not fit `I` it is retried
/// as `null`, so `()` and `Option<T>` arguments accept it.
pub fn decode_input<I: DeserializeOwned>(input: Value) -> Result<I, RpcError> {
    let empty = matches!(&input, Value::Object(m) if m.is_empty());
    match serde_json::from_value::<I>(input) {
        Ok(decoded) => Ok(decoded),
        Err(_) if empty => serde_json::from_value(Value::Null)
            .map_err(|e| RpcError::InvalidInput(format!("invalid input: {e}"))),
        Err(e) => Err(RpcError::InvalidInput(format!("invalid input: {e}"))),
    }
}

/// A controller that can be exposed as a router.
///
/// Usually implemented by `#[rpc_router]`.
pub trait RpcController: Send + Sync + Sized + 'static {
    fn declaration() -> ControllerDecl<Self>;
}

/// Construct a controller from the application state.
///
/// The state plays the role of the dependency container: it holds whatever
/// services controllers need and is cloned into each of them.
pub trait StatefulConstruct<S>: Sized {
    fn from_state(state: &S) -> Self;
}
