use std::sync::Arc;
use std::time::Duration;

use rpcnest::prelude::*;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::state::{AppState, Post, Store};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByAuthor {
    pub author_id: u64,
}

pub struct PostController {
    store: Arc<RwLock<Store>>,
}

impl StatefulConstruct<AppState> for PostController {
    fn from_state(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }
}

#[rpc_router(prefix = "posts")]
impl PostController {
    #[query("getByAuthor")]
    async fn get_by_author(&self, input: ByAuthor) -> Result<Vec<Post>, RpcError> {
        Ok(self
            .store
            .read()
            .await
            .posts
            .iter()
            .filter(|p| p.author_id == input.author_id)
            .cloned()
            .collect())
    }

    /// Every post, two per event, a quarter second apart.
    #[subscription(sse)]
    async fn feed(&self) -> Sequence<Chunk<Post>> {
        let posts = self.store.read().await.posts.clone();
        Sequence::new(paced(
            posts,
            PaceOptions {
                batch_size: 2,
                delay: Duration::from_millis(250),
            },
        ))
    }

    /// Ticks once a second until the client disconnects.
    #[subscription]
    async fn clock(&self) -> Emitter<u64> {
        Emitter::new(|observer: Observer<u64>| {
            let task = tokio::spawn(async move {
                let mut tick = 0u64;
                loop {
                    if !observer.next(tick) {
                        break;
                    }
                    tick += 1;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            });
            Box::new(move || task.abort()) as Teardown
        })
    }
}
