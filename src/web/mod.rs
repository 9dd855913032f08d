use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use salvo::prelude::*;
use secrecy::SecretString;
use tracing::info;

use crate::commands::CommandHandler;
use crate::config::WebConfig;
use crate::ledger::Ledger;

pub mod handlers;
pub mod metrics;
pub mod middleware;

pub use self::metrics::ReactionMetrics;
pub use self::middleware::auth::create_router;

/// Shared handler state, injected into every request's depot.
#[derive(Clone)]
pub struct WebState {
    pub ledger: Arc<Ledger>,
    pub commands: Arc<CommandHandler>,
    /// Required on `POST /reactions` when set.
    pub key: Option<SecretString>,
    pub metrics: Arc<ReactionMetrics>,
    pub started_at: Instant,
}

impl WebState {
    pub fn new(ledger: Arc<Ledger>, commands: Arc<CommandHandler>, config: &WebConfig) -> Self {
        let key = if config.key_enabled {
            config.key.clone()
        } else {
            None
        };

        Self {
            ledger,
            commands,
            key,
            metrics: Arc::new(ReactionMetrics::default()),
            started_at: Instant::now(),
        }
    }
}

#[derive(Clone)]
pub struct WebServer {
    config: WebConfig,
    state: WebState,
}

impl WebServer {
    pub fn new(config: WebConfig, state: WebState) -> Self {
        Self { config, state }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!(
            key_required = self.state.key.is_some(),
            "starting web server on {}", bind_addr
        );

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor)
            .serve(create_router(self.state.clone()))
            .await;

        Ok(())
    }
}
