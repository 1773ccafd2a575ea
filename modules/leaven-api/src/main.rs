use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaven_api::{router, AppState};
use leaven_common::Config;
use leaven_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("leaven=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::api_from_env()?;
    config.log_redacted();

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required")?;
    let store = PgStore::connect(database_url).await?;
    store.migrate().await?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
    });
    let app = router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Leaven API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
