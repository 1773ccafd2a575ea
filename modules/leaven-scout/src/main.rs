use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leaven_common::{Config, PipelineConfig};
use leaven_scout::evidence::HttpPageFetcher;
use leaven_scout::{Scout, ScoutDeps};
use leaven_store::{InMemoryStore, PgStore, RecordStore};
use places_client::PlacesClient;

#[derive(Parser, Debug)]
#[command(name = "scout", about = "Discover and verify sourdough pizza restaurants for a city")]
struct Args {
    /// City to search, e.g. "Portland"
    #[arg(long)]
    city: String,

    /// State or region code, e.g. "OR"
    #[arg(long)]
    state: String,

    /// Pipeline config JSON. Overrides PIPELINE_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist unverified candidates too
    #[arg(long)]
    persist_all: bool,

    /// Parallel templates/candidates (1-3)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Don't write the JSON run log
    #[arg(long)]
    no_run_log: bool,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("leaven=info".parse()?)
        .add_directive("places_client=info".parse()?);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    info!("Leaven scout starting...");

    let config = Config::scout_from_env()?;
    config.log_redacted();

    let mut pipeline = match args.config.as_ref().or(config.pipeline_config.as_ref()) {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if args.persist_all {
        pipeline.persist_all = true;
    }
    if let Some(n) = args.concurrency {
        pipeline.concurrency = n;
    }
    pipeline.validate()?;

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, records are kept in memory and lost on exit");
            Arc::new(InMemoryStore::new())
        }
    };

    let mut places = PlacesClient::new(config.places_api_key.clone());
    if let Some(base) = &config.places_base_url {
        places = places.with_base_url(base.clone());
    }
    let pages = HttpPageFetcher::new(pipeline.fetch_timeout());

    let deps = ScoutDeps::builder()
        .places(Arc::new(places))
        .pages(Arc::new(pages))
        .store(store)
        .config(pipeline)
        .data_dir((!args.no_run_log).then(|| config.data_dir.clone()))
        .build();
    let scout = Scout::new(deps);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, persisting verified work and stopping");
            on_interrupt.cancel();
        }
    });

    let summary = scout.run(&args.city, &args.state, &cancel).await?;
    println!("{summary}");

    Ok(())
}
