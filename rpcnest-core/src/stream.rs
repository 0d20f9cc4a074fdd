//! Helpers for streaming procedures: paced sequences and Server-Sent Events
//! framing.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;

use crate::error::RpcError;

pub use crate::output::{emitter_stream, EmitterStream};

/// Comment frame sent when a stream stays idle longer than the heartbeat.
pub const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";

#[derive(Debug, Clone, Copy)]
pub struct PaceOptions {
    pub batch_size: usize,
    pub delay: Duration,
}

impl Default for PaceOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            delay: Duration::from_millis(100),
        }
    }
}

/// One yield of a paced sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Chunk<T> {
    Item(T),
    Batch(Vec<T>),
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Item(_) => 1,
            Chunk::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Chunk::Item(item) => vec![item],
            Chunk::Batch(items) => items,
        }
    }
}

/// Yield `items` in order, one at a time when `batch_size` is 1 and in
/// batches otherwise, sleeping `delay` between yields but not after the last
/// one. A batch size of 0 counts as 1.
pub fn paced<T: Send + 'static>(
    items: Vec<T>,
    options: PaceOptions,
) -> impl Stream<Item = Chunk<T>> + Send + 'static {
    let batch_size = options.batch_size.max(1);
    async_stream::stream! {
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let mut batch: Vec<T> = items.by_ref().take(batch_size).collect();
            let chunk = if batch_size == 1 {
                match batch.pop() {
                    Some(item) => Chunk::Item(item),
                    None => break,
                }
            } else {
                Chunk::Batch(batch)
            };
            yield chunk;
            if items.peek().is_some() && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }
    }
}

/// Frame `source` as Server-Sent Events.
///
/// Each value becomes `data: <json>\n\n`. When nothing was emitted for
/// `heartbeat`, a heartbeat comment is sent; a zero interval disables
/// heartbeats. An item error is sent as an `error` event and ends the stream.
pub fn sse_frames<S, T>(
    source: S,
    heartbeat: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<T, RpcError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    async_stream::stream! {
        let mut source = Box::pin(source);
        loop {
            let next = if heartbeat.is_zero() {
                Some(source.next().await)
            } else {
                tokio::time::timeout(heartbeat, source.next()).await.ok()
            };
            match next {
                None => yield Ok(Bytes::from_static(HEARTBEAT_FRAME)),
                Some(Some(Ok(value))) => match serde_json::to_string(&value) {
                    Ok(json) => yield Ok(data_frame(&json)),
                    Err(e) => {
                        yield Ok(error_frame(&RpcError::Internal(e.to_string())));
                        break;
                    }
                },
                Some(Some(Err(e))) => {
                    yield Ok(error_frame(&e));
                    break;
                }
                Some(None) => break,
            }
        }
    }
}

fn data_frame(json: &str) -> Bytes {
    Bytes::from(format!("data: {json}\n\n"))
}

fn error_frame(error: &RpcError) -> Bytes {
    let body = json!({"message": error.to_string(), "code": error.code()});
    Bytes::from(format!("event: error\ndata: {body}\n\n"))
}
