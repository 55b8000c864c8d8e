//! Tessera client: REST and WebSocket adapters around the board engine, plus
//! the `tessera-mirror` entry point.

pub mod config;
pub mod http;
pub mod push;

use std::path::Path;

use tessera_core::error::MutationError;
use tessera_core::manager::MutationManager;
use tessera_core::session::{lock_session, BoardSession};

use crate::config::{load_config, ConfigError};
use crate::http::HttpBoardApi;
use crate::push::{PushEnd, PushError};

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Push(#[from] PushError),
}

/// Mirror one board until the push channel ends or Ctrl-C is pressed.
pub async fn run(config_path: &Path) -> Result<PushEnd, MirrorError> {
    let config = load_config(config_path)?;
    config.validate()?;

    let session =
        BoardSession::new(&config.board_id, &config.user_id, config.session.clone()).into_shared();
    let manager = MutationManager::new(session.clone(), HttpBoardApi::from_config(&config));
    manager.hydrate().await?;
    {
        let session = lock_session(&session);
        log::info!(
            "[tessera.mirror] Board '{}': {} lists, {} cards",
            session.store().board().title,
            session.store().lists().len(),
            session.store().cards().len()
        );
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("[tessera.mirror] Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let end = push::run_push_channel(&push::push_url(&config), session, shutdown).await?;
    log::info!("[tessera.mirror] Stopped: {:?}", end);
    Ok(end)
}
