use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RpcError;

/// Stream of JSON values produced by a streaming procedure.
pub type ValueStream = BoxStream<'static, Result<Value, RpcError>>;

/// Cleanup run when an emitter's consumer goes away.
pub type Teardown = Box<dyn FnOnce() + Send>;

/// What a procedure handler produced.
pub enum ProcedureOutput {
    Single(Value),
    Sequence(ValueStream),
    Emitter(Emitter<Value>),
}

impl fmt::Debug for ProcedureOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureOutput::Single(v) => f.debug_tuple("Single").field(v).finish(),
            ProcedureOutput::Sequence(_) => f.write_str("Sequence(..)"),
            ProcedureOutput::Emitter(_) => f.write_str("Emitter(..)"),
        }
    }
}

impl ProcedureOutput {
    pub fn single<T: Serialize>(value: T) -> Result<Self, RpcError> {
        to_value(&value).map(ProcedureOutput::Single)
    }

    pub fn is_single(&self) -> bool {
        matches!(self, ProcedureOutput::Single(_))
    }

    /// View the output as a stream. A single value becomes a one-item stream.
    pub fn into_stream(self) -> ValueStream {
        match self {
            ProcedureOutput::Single(value) => stream::once(async move { Ok(value) }).boxed(),
            ProcedureOutput::Sequence(values) => values,
            ProcedureOutput::Emitter(emitter) => emitter_stream(emitter).boxed(),
        }
    }

    /// Resolve the output to one JSON value. Sequences are drained into an
    /// array; the first item error aborts the drain.
    pub async fn collect(self) -> Result<Value, RpcError> {
        match self {
            ProcedureOutput::Single(value) => Ok(value),
            other => {
                let mut items = Vec::new();
                let mut values = other.into_stream();
                while let Some(item) = values.next().await {
                    items.push(item?);
                }
                Ok(Value::Array(items))
            }
        }
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::Internal(format!("failed to serialize procedure output: {e}")))
}

/// A pull-based sequence, the async-iterator flavour of a streaming result.
pub struct Sequence<T>(BoxStream<'static, Result<T, RpcError>>);

impl<T: Send + 'static> Sequence<T> {
    pub fn new<S>(items: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Sequence(items.map(Ok).boxed())
    }

    /// A sequence whose items may fail. The consumer stops at the first error.
    pub fn try_new<S, E>(items: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<RpcError> + 'static,
    {
        Sequence(items.map(|item| item.map_err(Into::into)).boxed())
    }

    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(items))
    }

    pub fn once(item: T) -> Self {
        Self::from_items(std::iter::once(item))
    }

    pub fn into_inner(self) -> BoxStream<'static, Result<T, RpcError>> {
        self.0
    }
}

impl<T: Serialize + Send + 'static> Sequence<T> {
    pub fn into_values(self) -> ValueStream {
        self.0
            .map(|item| item.and_then(|v| to_value(&v)))
            .boxed()
    }
}

/// Handle an emitter's subscribe function pushes values through.
///
/// The emitter completes once every clone of its observer is dropped.
pub struct Observer<T> {
    sink: Arc<dyn Fn(Result<T, RpcError>) -> bool + Send + Sync>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T> Observer<T> {
    fn from_sink(sink: Arc<dyn Fn(Result<T, RpcError>) -> bool + Send + Sync>) -> Self {
        Self { sink }
    }

    /// Push a value. Returns `false` once the consumer is gone.
    pub fn next(&self, value: T) -> bool {
        (self.sink)(Ok(value))
    }

    /// Fail the emitter. Nothing pushed afterwards is delivered.
    pub fn error(&self, error: impl Into<RpcError>) {
        (self.sink)(Err(error.into()));
    }

    pub fn complete(self) {}
}

/// A push-based source: a subscribe function that receives an observer and
/// returns a teardown.
pub struct Emitter<T> {
    subscribe: Box<dyn FnOnce(Observer<T>) -> Teardown + Send>,
}

impl<T: Send + 'static> Emitter<T> {
    pub fn new<F>(subscribe: F) -> Self
    where
        F: FnOnce(Observer<T>) -> Teardown + Send + 'static,
    {
        Self {
            subscribe: Box::new(subscribe),
        }
    }

    pub fn subscribe(self, observer: Observer<T>) -> Teardown {
        (self.subscribe)(observer)
    }
}

impl<T: Serialize + Send + 'static> Emitter<T> {
    pub fn into_values(self) -> Emitter<Value> {
        Emitter::new(move |values: Observer<Value>| {
            let typed = Observer::from_sink(Arc::new(move |item: Result<T, RpcError>| {
                (values.sink)(item.and_then(|v| to_value(&v)))
            }));
            self.subscribe(typed)
        })
    }
}

/// Turn an emitter into a stream.
///
/// The stream ends after the first error or once the observer is dropped.
/// The teardown runs when the stream completes or is dropped, whichever
/// comes first.
pub fn emitter_stream<T: Send + 'static>(emitter: Emitter<T>) -> EmitterStream<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer = Observer::from_sink(Arc::new(move |item| tx.send(item).is_ok()));
    let teardown = emitter.subscribe(observer);
    EmitterStream {
        rx,
        teardown: Some(teardown),
        done: false,
    }
}

pub struct EmitterStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T, RpcError>>,
    teardown: Option<Teardown>,
    done: bool,
}

impl<T> EmitterStream<T> {
    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl<T> Unpin for EmitterStream<T> {}

impl<T> Stream for EmitterStream<T> {
    type Item = Result<T, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Some(Ok(v))) => Poll::Ready(Some(Ok(v))),
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for EmitterStream<T> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Conversion of a non-streaming handler's return value.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned from a query or mutation",
    note = "return `Result<T, E>` where `T: Serialize` and `E: Into<RpcError>`"
)]
pub trait IntoProcedureResult {
    fn into_output(self) -> Result<ProcedureOutput, RpcError>;
}

impl<T, E> IntoProcedureResult for Result<T, E>
where
    T: Serialize,
    E: Into<RpcError>,
{
    fn into_output(self) -> Result<ProcedureOutput, RpcError> {
        let value = self.map_err(Into::into)?;
        ProcedureOutput::single(value)
    }
}

/// Conversion of a streaming handler's return value.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned from a streaming procedure",
    note = "return a `Sequence<T>`, an `Emitter<T>` or a `Result` of either"
)]
pub trait IntoProcedureStream {
    fn into_stream_output(self) -> Result<ProcedureOutput, RpcError>;
}

impl IntoProcedureStream for ProcedureOutput {
    fn into_stream_output(self) -> Result<ProcedureOutput, RpcError> {
        Ok(self)
    }
}

impl<T: Serialize + Send + 'static> IntoProcedureStream for Sequence<T> {
    fn into_stream_output(self) -> Result<ProcedureOutput, RpcError> {
        Ok(ProcedureOutput::Sequence(self.into_values()))
    }
}

impl<T: Serialize + Send + 'static> IntoProcedureStream for Emitter<T> {
    fn into_stream_output(self) -> Result<ProcedureOutput, RpcError> {
        Ok(ProcedureOutput::Emitter(self.into_values()))
    }
}

impl<O, E> IntoProcedureStream for Result<O, E>
where
    O: IntoProcedureStream,
    E: Into<RpcError>,
{
    fn into_stream_output(self) -> Result<ProcedureOutput, RpcError> {
        self.map_err(Into::into)?.into_stream_output()
    }
}
