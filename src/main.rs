use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use don_records::config::Config;
use don_records::http::{AppState, router};
use don_records::logging;
use don_records::service::Marketplace;
use don_records::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_filter)?;

    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path))?;
    info!(db_path = %config.db_path, currency = %config.currency, "database opened");

    let marketplace = Marketplace::with_config(store.clone(), &config);
    let admin = marketplace.ensure_admin(&config.admin_username, &config.admin_email)?;
    info!(admin_id = %admin.id, "admin account ready");
    info!(sender = %marketplace.system_sender()?, "automated notifications sender");

    let state = Arc::new(AppState::new(marketplace, config.webhook_secret.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening for payment webhooks");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.flush()?;
    info!("shut down");
    Ok(())
}
