#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

mod cli;
mod commands;
mod config;
mod db;
mod ingest;
mod ledger;
mod utils;
mod web;

use cli::{Cli, Commands};
use commands::{CommandHandler, OfflineDirectory};
use config::Config;
use ledger::{Ledger, RateLimiter};
use web::{WebServer, WebState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    if cli.command() == Commands::CheckConfig {
        println!("{} is valid", cli.config.display());
        return Ok(());
    }

    utils::logging::init_tracing(&config.logging)?;
    info!(config = %cli.config.display(), "reaction reputation starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!(
        path = %config.database.sqlite_path(),
        operation_timeout_ms = db_manager.operation_timeout().as_millis() as u64,
        "database ready"
    );

    let limiter = Arc::new(RateLimiter::new(config.ledger.cooldown()));
    let ledger = Arc::new(Ledger::new(&db_manager, limiter.clone(), &config));

    let prune_after = config.ledger.rate_limit_prune_after();
    let prune_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_after);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.prune(prune_after);
            debug!(removed, tracked = limiter.tracked_users(), "pruned rate limiter");
        }
    });

    // No chat API client in this process: live lookups miss and replies fall
    // back to the username cache, then the raw id.
    let commands = Arc::new(CommandHandler::new(
        ledger.clone(),
        Arc::new(OfflineDirectory),
        config.bot.username.clone(),
    ));
    let web_server = WebServer::new(
        config.web.clone(),
        WebState::new(ledger, commands, &config.web),
    );
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    tokio::select! {
        _ = web_handle => {},
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {}", e);
            }
        }
    }

    prune_handle.abort();
    info!("reaction reputation shutting down");
    Ok(())
}
