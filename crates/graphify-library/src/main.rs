//! CLI entry point: migrate the library schema and print the exposure
//! catalog as JSON on stdout.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use graphify_core::config::StoreBackend;
use graphify_core::{GraphifyConfig, Observer};
use graphify_expose::{ExposeFilter, Exposure};
use graphify_store::{Access, Cancel, MemoryStore, Neo4jConfig, Neo4jStore, StoreDriver};

#[derive(Parser)]
#[command(name = "graphify-library")]
#[command(about = "Migrate the library schema and print its API catalog")]
struct Cli {
    /// Config file prefix (default: graphify).
    #[arg(short, long, default_value = "graphify")]
    config: String,

    /// Print the migration plan without applying it.
    #[arg(long)]
    dry_run: bool,

    /// Node types to expose, comma separated. Overrides the config file.
    #[arg(long, value_delimiter = ',')]
    expose: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GraphifyConfig::load(&cli.config)?;

    let driver: Arc<dyn StoreDriver> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Neo4j => {
            Arc::new(Neo4jStore::connect(&Neo4jConfig::from(&config.store)).await?)
        }
    };

    let observer = Observer::default();
    let mut events = observer.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(event_id = %event.id.0, payload = ?event.payload, "Schema event");
        }
    });

    let access = Access::from_arc(driver).with_observer(observer);
    tracing::info!(backend = access.backend(), "Store ready");

    let registry = Arc::new(graphify_library::registry()?);
    let migrator = graphify_library::migrator(&access);
    let cancel = Cancel::with_timeout(Duration::from_secs(config.migration.timeout_secs));

    if cli.dry_run {
        let plan = migrator.dry_run(&cancel, &registry).await?;
        tracing::info!(actions = plan.len(), fingerprint = %plan.fingerprint(), "Dry run");
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if config.migration.enabled {
        let report = migrator.run(&cancel, &registry).await?;
        tracing::info!(
            created = report.created.len(),
            existing = report.existing.len(),
            hooks = report.hooks,
            "Schema migrated"
        );
    } else {
        tracing::warn!("Migration disabled; exposed resources need existing collections");
    }

    let filter = if cli.expose.is_empty() {
        ExposeFilter::from(&config.expose)
    } else {
        ExposeFilter::nodes(cli.expose)
    };
    let exposure = Exposure::build(registry, access, filter)?;
    println!("{}", exposure.catalog().to_json_pretty()?);

    Ok(())
}
