//! Product catalog import command.
//!
//! Fetches the manifest, then downloads, decodes and stores every listed
//! feed file, indexing stored products for search when a search driver is
//! configured.
//!
//! # Usage
//!
//! ```bash
//! # Import with defaults (batches of 100, settings from .env)
//! catalog-import
//!
//! # Bigger batches, custom paths
//! catalog-import --chunk 500 \
//!     --database /data/catalog.db \
//!     --scratch-dir /tmp/catalog-import
//!
//! # With metrics
//! catalog-import --metrics-port 9091
//! ```
//!
//! The exit status is non-zero only when the run aborts (bad configuration
//! or unreachable manifest). Failed files are reported in the summary.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use catalog_core::metrics::{init_metrics, start_metrics_server};
use catalog_ingest::pipeline::effective_batch_size;
use catalog_ingest::{
    FailureNotification, ImportConfig, ImportOptions, ImportPhase, ImportRunReport, Importer,
    IndexerStats, LogSink, NotificationSink, ProductStore, SearchIndexer, index_queue,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Import product feed files into the catalog.
#[derive(Parser, Debug)]
#[command(name = "catalog-import")]
#[command(about = "Bulk import product feed files into the catalog")]
#[command(version)]
struct Args {
    /// Records per batch (zero or negative falls back to 100)
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    chunk: i64,

    /// Path to .env file (optional)
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Download directory (overrides IMPORT_SCRATCH_DIR)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Log progress every N lines
    #[arg(long, default_value = "100000")]
    progress_interval: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("catalog_ingest=debug".parse()?),
        )
        .init();

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
    }

    let sink = LogSink;

    let mut config = match ImportConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            sink.notify(FailureNotification::new(e.to_string(), ImportPhase::Idle));
            return Err(e).context("Failed to load import configuration");
        }
    };
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if let Some(scratch_dir) = &args.scratch_dir {
        config.scratch_dir = scratch_dir.clone();
    }

    let options = ImportOptions {
        batch_size: effective_batch_size(args.chunk),
        progress_interval: args.progress_interval,
        ..Default::default()
    };

    tracing::info!("Configuration:");
    tracing::info!("  Manifest: {}", config.manifest_url);
    tracing::info!("  Files from: {}", config.base_url);
    tracing::info!("  Scratch dir: {}", config.scratch_dir.display());
    tracing::info!("  Database: {}", config.database_path.display());
    tracing::info!("  Batch size: {}", options.batch_size);
    tracing::info!(
        "  Search: {}",
        if config.search.is_enabled() {
            config.search.index_name.as_str()
        } else {
            "disabled"
        }
    );

    let (store, indexer_handle) = match init_pipeline(&config) {
        Ok(components) => components,
        Err(e) => {
            sink.notify(FailureNotification::new(format!("{e:#}"), ImportPhase::Idle));
            return Err(e);
        }
    };

    let start = Instant::now();
    let mut importer = Importer::new(config, options, store, Box::new(sink));
    let result = importer.run().await;

    // Dropping the importer closes the store's channel, which stops the indexer
    drop(importer);
    let indexer_stats = match indexer_handle {
        Some(handle) => {
            tracing::info!("Waiting for search indexer to finish...");
            match handle.join() {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!("Search indexer thread panicked: {:?}", e);
                    None
                }
            }
        }
        None => None,
    };

    let report = result.context("Import aborted")?;
    print_summary(&report, indexer_stats.as_ref(), start.elapsed());

    Ok(())
}

/// Pipeline components: (product store, optional search indexer handle).
type PipelineComponents = (
    ProductStore,
    Option<std::thread::JoinHandle<IndexerStats>>,
);

fn init_pipeline(config: &ImportConfig) -> Result<PipelineComponents> {
    let indexer = SearchIndexer::from_config(&config.search)
        .context("Failed to create search indexer")?;

    let (stored_sender, indexer_handle) = if indexer.is_enabled() {
        let (tx, rx) = index_queue();
        (Some(tx), Some(indexer.start(rx)))
    } else {
        (None, None)
    };

    let store = ProductStore::open(&config.database_path, stored_sender).with_context(|| {
        format!(
            "Failed to open product store at {}",
            config.database_path.display()
        )
    })?;

    Ok((store, indexer_handle))
}

fn print_summary(
    report: &ImportRunReport,
    indexer: Option<&IndexerStats>,
    elapsed: std::time::Duration,
) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("IMPORT SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Files listed:      {:>12}", report.files_total);
    println!("Files succeeded:   {:>12}", report.files_succeeded);
    println!("Files failed:      {:>12}", report.files_failed);
    for file in report.files.iter().filter(|f| !f.succeeded()) {
        println!("  - {}: {}", file.name, file.error.as_deref().unwrap_or(""));
    }
    println!();
    println!("Lines read:        {:>12}", report.lines_read);
    println!("Decode failures:   {:>12}", report.decode_failures);
    println!("Records stored:    {:>12}", report.records_stored);
    println!("  - new:           {:>12}", report.records_inserted);
    println!("Records failed:    {:>12}", report.records_failed);
    println!("Batches:           {:>12}", report.batches);

    if let Some(stats) = indexer {
        println!();
        println!("Batches indexed:   {:>12}", stats.batches_indexed);
        println!("Records indexed:   {:>12}", stats.records_indexed);
        println!("Index failures:    {:>12}", stats.batches_failed);
    }

    println!();
    println!("Elapsed time:      {:>12.2?}", elapsed);

    if report.records_stored > 0 {
        let records_per_sec = report.records_stored as f64 / elapsed.as_secs_f64();
        println!("Throughput:        {:>12.0} records/sec", records_per_sec);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_ingest::FileReport;

    #[test]
    fn test_chunk_defaults_to_100() {
        let args = Args::try_parse_from(["catalog-import"]).unwrap();
        assert_eq!(effective_batch_size(args.chunk), 100);
    }

    #[test]
    fn test_negative_chunk_falls_back() {
        let args = Args::try_parse_from(["catalog-import", "--chunk", "-5"]).unwrap();
        assert_eq!(args.chunk, -5);
        assert_eq!(effective_batch_size(args.chunk), 100);
    }

    #[test]
    fn test_overrides_parse() {
        let args = Args::try_parse_from([
            "catalog-import",
            "--chunk",
            "250",
            "--database",
            "/tmp/c.db",
            "--metrics-port",
            "9091",
        ])
        .unwrap();
        assert_eq!(effective_batch_size(args.chunk), 250);
        assert_eq!(args.database, Some(PathBuf::from("/tmp/c.db")));
        assert_eq!(args.metrics_port, 9091);
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let mut report = ImportRunReport::new(2);
        report.record_file(FileReport::failed("a.json", "HTTP 404"));
        report.finish();

        let stats = IndexerStats {
            batches_indexed: 3,
            records_indexed: 250,
            ..Default::default()
        };
        print_summary(&report, Some(&stats), std::time::Duration::from_secs(2));
        print_summary(&report, None, std::time::Duration::ZERO);
    }
}
