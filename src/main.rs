use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nudgebot::config::Config;
use nudgebot::dispatcher::Dispatcher;
use nudgebot::telegram::TelegramClient;
use nudgebot::tracker::sweeper::sweep_loop;
use nudgebot::tracker::{MessageRepository, Notifier, SqliteRepository};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting reaction reminder bot");

    let config = Config::from_env().context("failed to load configuration")?;

    let client = Arc::new(TelegramClient::new(&config.bot_token));
    let me = client
        .get_me()
        .await
        .context("could not identify the bot account")?;
    info!(bot_id = %me.id, "connected to the platform");

    let db_path = config.state_dir.join("nudgebot.db");
    info!("Using state database: {}", db_path.display());
    let repo: Arc<dyn MessageRepository> =
        Arc::new(SqliteRepository::new(&db_path).context("failed to open state database")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier: Arc<dyn Notifier> = client.clone();
    let sweeper = tokio::spawn(sweep_loop(
        repo.clone(),
        notifier,
        config.sweep_interval,
        shutdown_rx.clone(),
    ));

    let dispatcher = Dispatcher::new(
        client,
        repo,
        me.id,
        me.username,
        config.target_chat,
        config.topic_name,
        config.rate_limit_window,
        config.rate_limit_max_updates,
    );
    let poller = tokio::spawn(dispatcher.run(shutdown_rx));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = poller.await;
    let _ = sweeper.await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for either ctrl-c or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("could not install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
