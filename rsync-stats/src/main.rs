use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Error};
use common_geoip::GeoIpClient;
use envconfig::Envconfig;
use rsync_stats::{
    config::Config,
    enrich::Enricher,
    pipeline::Pipeline,
    source::LineSource,
    types::CompletedEvent,
    writer::BulkWriter,
};
use tracing::{error, info, info_span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn print_events(events: &[CompletedEvent]) -> Result<(), Error> {
    let mut out = io::stdout().lock();
    for event in events {
        serde_json::to_writer(&mut out, event)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().context("failed to load configuration from env")?;

    let geoip = GeoIpClient::new(config.maxmind_db_path())
        .context("failed to open the GeoIP database")?;
    let enricher = Enricher::new(
        Arc::new(geoip),
        config.geohash_precision,
        config.fallback_location(),
    )
    .context("invalid GEOHASH_PRECISION")?;
    let pipeline = Pipeline::new(enricher)
        .with_span(info_span!("rsync_stats", dry_run = config.dry_run));

    let writer = if config.dry_run {
        None
    } else {
        let pool = config
            .connect_pool()
            .await
            .context("failed to connect to postgres")?;
        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run migrations")?;
        }
        Some(BulkWriter::new(
            Arc::new(pool),
            &config.table_name,
            config.persist_hostnames,
        )?)
    };

    for path in config.log_paths() {
        let source = LineSource::from_path(path);
        let outcome = match pipeline.parse(&source) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("skipping log: {}", e);
                continue;
            }
        };

        match &writer {
            Some(writer) => {
                let rows = writer.write(&outcome.events).await;
                info!(
                    source = %source,
                    events = outcome.report.events,
                    rows,
                    "finished log"
                );
            }
            None => print_events(&outcome.events)?,
        }
    }

    info!("exiting");
    Ok(())
}
