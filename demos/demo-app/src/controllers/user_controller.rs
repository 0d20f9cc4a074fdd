use std::sync::Arc;

use garde::Validate;
use rpcnest::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::state::{AppState, Store, User};

#[derive(Debug, Deserialize)]
pub struct ById {
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateUser {
    #[garde(length(min = 2, max = 50))]
    pub name: String,
    #[garde(contains("@"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct Search {
    pub q: String,
}

pub struct UserController {
    store: Arc<RwLock<Store>>,
}

impl StatefulConstruct<AppState> for UserController {
    fn from_state(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }
}

#[rpc_router(prefix = "users")]
impl UserController {
    #[query("getAll")]
    async fn get_all(&self) -> Result<Vec<User>, RpcError> {
        Ok(self.store.read().await.users.clone())
    }

    #[query("getById")]
    async fn get_by_id(&self, input: ById) -> Result<User, RpcError> {
        self.store
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == input.id)
            .cloned()
            .ok_or_else(|| RpcError::not_found(format!("user {} not found", input.id)))
    }

    #[mutation(input = CreateUser)]
    async fn create(&self, input: CreateUser) -> Result<User, RpcError> {
        let mut store = self.store.write().await;
        let id = store.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            name: input.name,
            email: input.email,
        };
        store.users.push(user.clone());
        tracing::info!(id, "User created");
        Ok(user)
    }

    #[query]
    async fn search(&self, input: Search) -> Result<Vec<User>, RpcError> {
        let q = input.q.to_lowercase();
        Ok(self
            .store
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.name.to_lowercase().contains(&q))
            .cloned()
            .collect())
    }
}
