use std::path::Path;

use rpcnest::config::RpcConfig;
use rpcnest::prelude::*;
use rpcnest::{init_tracing, RpcSettings};

mod controllers;
mod state;

use controllers::post_controller::PostController;
use controllers::user_controller::UserController;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RpcConfig::load_from(Path::new(env!("CARGO_MANIFEST_DIR")), "dev").unwrap_or_else(|_| RpcConfig::empty());
    let settings = RpcSettings::from_config(&config)?;
    init_tracing(settings.log_format);

    tracing::info!(profile = config.profile(), "Starting demo app");

    RpcApp::new()
        .with_state(AppState::seeded())
        .with_settings(settings)
        .bind::<UserController>()
        .bind::<PostController>()
        .serve()
        .await
}
