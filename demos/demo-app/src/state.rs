use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub author_id: u64,
    pub title: String,
}

#[derive(Default)]
pub struct Store {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
}

impl AppState {
    pub fn seeded() -> Self {
        let store = Store {
            users: vec![
                User {
                    id: 1,
                    name: "Alice".into(),
                    email: "alice@example.com".into(),
                },
                User {
                    id: 2,
                    name: "Bob".into(),
                    email: "bob@example.com".into(),
                },
            ],
            posts: vec![
                Post {
                    id: 1,
                    author_id: 1,
                    title: "Hello".into(),
                },
                Post {
                    id: 2,
                    author_id: 1,
                    title: "Streaming with rpcnest".into(),
                },
                Post {
                    id: 3,
                    author_id: 2,
                    title: "Batching".into(),
                },
            ],
        };
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }
}
