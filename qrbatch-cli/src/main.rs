//! qrbatch CLI - Command-line interface
//!
//! Drives the batch generation pipeline with a built-in placeholder
//! encoder, for exercising configuration, retries, cancellation, and
//! progress reporting without the embedding application.

mod smoke;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use qrbatch::catalog::{CatalogItem, ItemId};
use qrbatch::config::load_pipeline_config;
use qrbatch::logging::{default_log_dir, default_log_file, init_logging};
use qrbatch::orchestrator::{GenerationOrchestrator, RunPhase, RunStatus};
use qrbatch::pipeline::PipelineConfig;

use smoke::SmokeEncoder;

#[derive(Parser)]
#[command(name = "qrbatch")]
#[command(about = "Generate a batch of QR images with the smoke encoder", long_about = None)]
struct Args {
    /// Number of synthetic items to generate
    #[arg(long, default_value = "10", conflicts_with = "items_file")]
    items: usize,

    /// File with one item per line: id<TAB>payload
    #[arg(long)]
    items_file: Option<PathBuf>,

    /// INI config file with a [pipeline] section
    #[arg(long)]
    config: Option<PathBuf>,

    /// Items per batch (overrides the config file)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Retry budget per item (overrides the config file)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Disable retries entirely
    #[arg(long)]
    no_retries: bool,

    /// Per-item encode timeout in seconds (overrides the config file)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Inter-batch delay in milliseconds (overrides the config file)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Percentage of payloads whose encodes fail (deterministic by hash)
    #[arg(long, default_value = "0")]
    fail_rate: u8,

    /// Injected failures become transient: fail this many attempts, then succeed
    #[arg(long)]
    flaky: Option<u32>,

    /// Fire cancel() this many milliseconds into the run
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Directory to write the produced PNG files into
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, default_value = default_log_dir())]
    log_dir: String,

    /// Mirror log records to stdout alongside the progress lines
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.fail_rate > 100 {
        eprintln!("Error: --fail-rate must be between 0 and 100");
        process::exit(1);
    }

    let _logging_guard = match init_logging(&args.log_dir, default_log_file(), args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    info!("qrbatch v{}", qrbatch::VERSION);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let items = match load_items(&args) {
        Ok(items) => items,
        Err(e) => {
            eprintln!("Error loading items: {}", e);
            process::exit(1);
        }
    };
    let item_count = items.len();

    println!(
        "Generating {} QR images (batch size {}, max retries {}, timeout {}s)",
        item_count,
        config.batch_size,
        config.max_retries,
        config.encode_timeout.as_secs()
    );

    let encoder = Arc::new(SmokeEncoder::new(args.fail_rate, args.flaky));
    let (orchestrator, mut handle) = GenerationOrchestrator::new(encoder, config);
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

    let started = Instant::now();
    if let Err(e) = handle.start(items) {
        eprintln!("Error starting run: {}", e);
        process::exit(1);
    }

    if let Some(ms) = args.cancel_after_ms {
        let cancel_handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            println!("Cancelling run...");
            cancel_handle.cancel();
        });
    }

    let final_status = follow_run(&mut handle).await;
    let elapsed = started.elapsed();
    let snapshot = handle.snapshot();
    let stats = handle.cache_stats();

    println!();
    println!("Run {} in {:.2}s", final_status.phase, elapsed.as_secs_f64());
    println!("  Images generated: {}", snapshot.images.len());
    if let Some(error) = &final_status.last_error {
        println!("  Fatal error: {}", error);
    }
    if !final_status.failed.is_empty() {
        let mut failed: Vec<_> = final_status.failed.iter().collect();
        failed.sort_by(|a, b| a.0.cmp(b.0));
        println!("  Failed items ({}):", failed.len());
        for (id, reason) in failed {
            println!("    {}: {}", id, reason);
        }
    }
    println!(
        "  Cache: {} hits, {} misses, {} encodes, {} encode failures",
        stats.hits, stats.misses, stats.encodes, stats.encode_failures
    );

    if let Some(dir) = &args.out {
        match write_images(dir, &snapshot.images) {
            Ok(()) => println!(
                "  Wrote {} PNG files to {}",
                snapshot.images.len(),
                dir.display()
            ),
            Err(e) => {
                eprintln!("Error writing images: {}", e);
                process::exit(1);
            }
        }
    }

    shutdown.cancel();
    let _ = worker.await;

    if final_status.phase == RunPhase::Failed || (item_count > 0 && snapshot.images.is_empty()) {
        process::exit(1);
    }
}

/// Print progress lines as the run advances and return the settled status.
async fn follow_run(handle: &mut qrbatch::orchestrator::PipelineHandle) -> RunStatus {
    let mut shown: Option<u8> = None;

    loop {
        let last = shown;
        let result = handle
            .wait_for(move |s: &RunStatus| {
                s.runs_started > 0 && (Some(s.progress) != last || s.is_quiescent())
            })
            .await;
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        };

        if Some(status.progress) != shown {
            println!(
                "Progress: {:>3}%  ({} done, {} failed, {} pending)",
                status.progress,
                status.counts.completed,
                status.counts.failed,
                status.counts.pending
            );
            shown = Some(status.progress);
        }

        if status.is_quiescent() {
            return status;
        }
    }
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<PipelineConfig, qrbatch::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if args.no_retries {
        config.retries_enabled = false;
    }
    if let Some(secs) = args.timeout_secs {
        config.encode_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = args.delay_ms {
        config.batch_delay = Duration::from_millis(ms);
    }

    Ok(config.normalized())
}

/// Build the item list from --items-file, or synthesize one.
fn load_items(args: &Args) -> Result<Vec<CatalogItem>, String> {
    let Some(path) = &args.items_file else {
        return Ok((1..=args.items)
            .map(|n| {
                let id = format!("item-{n:03}");
                let payload = format!("https://qr.example/i/{id}");
                CatalogItem::new(id, payload)
            })
            .collect());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;

    let mut items = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (id, payload) = line.split_once('\t').ok_or_else(|| {
            format!(
                "{}:{}: expected id<TAB>payload",
                path.display(),
                line_no + 1
            )
        })?;
        items.push(CatalogItem::new(id.trim(), payload.trim()));
    }
    Ok(items)
}

/// Write each image as `<id>.png` under `dir`.
fn write_images(dir: &Path, images: &HashMap<ItemId, Bytes>) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for (id, data) in images {
        let path = dir.join(format!("{}.png", id));
        std::fs::write(path, data)?;
    }
    Ok(())
}
