//! Seq2seq Batcher Command-Line Driver
//!
//! Starts the batching pipeline, pulls batches from it and logs their shape
//! and padding. Useful for checking a dataset and vocabulary before training.
//!
//! # Usage
//!
//! ```bash
//! # Read the validation set once
//! seq2seq-batcher --data-path 'chunked/val_*.bin' --vocab vocab --single-pass
//!
//! # Pull 100 training batches using a configuration file
//! seq2seq-batcher --config batcher.toml --batches 100
//!
//! # Decode the first row of each batch back to words
//! seq2seq-batcher --config batcher.toml --batches 5 --show-targets
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batcher_core::{output_to_words, Batch, Batcher, BatcherConfig, Result, Vocab};

/// Seq2seq Batcher
#[derive(Parser, Debug)]
#[command(name = "seq2seq-batcher")]
#[command(about = "Length-bucketed batching pipeline for seq2seq summarization data")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record file pattern, e.g. 'chunked/train_*.bin'
    #[arg(short, long)]
    data_path: Option<String>,

    /// Vocabulary file path
    #[arg(short, long)]
    vocab: Option<PathBuf>,

    /// Read the data once in sorted order, then stop
    #[arg(long)]
    single_pass: bool,

    /// Inference mode: each batch repeats one example
    #[arg(long)]
    decode: bool,

    /// Number of batches to pull (0 = until end of stream)
    #[arg(short, long, default_value = "10")]
    batches: u64,

    /// Log the decoded target of each batch's first row
    #[arg(long)]
    show_targets: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Config file (or defaults), then `BATCHER_*` variables, then flags.
fn build_config(args: &Args) -> Result<BatcherConfig> {
    let config = match &args.config {
        Some(path) => BatcherConfig::from_file(path)?,
        None => BatcherConfig::default(),
    };
    apply_flags(config.with_env_overrides(), args)
}

fn apply_flags(mut config: BatcherConfig, args: &Args) -> Result<BatcherConfig> {
    if let Some(data_path) = &args.data_path {
        config.data.data_path = data_path.clone();
    }
    if let Some(vocab) = &args.vocab {
        config.data.vocab_path = vocab.clone();
    }
    if args.single_pass {
        config.pipeline.singlepass = true;
    }
    if args.decode {
        config.pipeline.decode = true;
    }

    config.validate()?;
    Ok(config)
}

fn log_target(batch: &Batch, vocab: &Vocab) -> Result<()> {
    let len = batch.dec_padding_mask.row(0).iter().filter(|&&m| m > 0.0).count();
    let ids: Vec<u32> = batch.target_batch.row(0).iter().take(len).copied().collect();
    let words = output_to_words(&ids, vocab, batch.art_oovs(0))?;
    tracing::info!(target_words = %words.join(" "), "first row target");
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = build_config(&args)?;

    tracing::info!("Starting seq2seq batcher");
    tracing::info!("  Data path: {}", config.data.data_path);
    tracing::info!("  Vocabulary: {}", config.data.vocab_path.display());
    tracing::info!("  Batch size: {}", config.batching.batch_size);
    tracing::info!("  Single pass: {}", config.pipeline.singlepass);
    tracing::info!("  Decode: {}", config.pipeline.decode);

    let mut batcher = Batcher::from_config(config)?;
    let vocab = batcher.vocab().clone();
    let started = Instant::now();
    let mut pulled = 0u64;
    let mut rows = 0usize;

    while args.batches == 0 || pulled < args.batches {
        let Some(batch) = batcher.next_batch() else {
            tracing::info!("End of stream");
            break;
        };

        pulled += 1;
        rows += batch.len();
        tracing::info!(
            batch = pulled,
            rows = batch.len(),
            enc_width = batch.enc_width(),
            padding = %format!("{:.1}%", batch.enc_padding_fraction() * 100.0),
            max_art_oovs = batch.pointer.as_ref().map_or(0, |p| p.max_art_oovs),
            "pulled batch"
        );

        if args.show_targets {
            if let Err(e) = log_target(&batch, &vocab) {
                tracing::warn!("Failed to decode target: {}", e);
            }
        }
    }

    let stats = batcher.stats();
    tracing::info!(
        batches = pulled,
        examples = rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        encoder_restarts = stats.encoder_restarts,
        collator_restarts = stats.collator_restarts,
        "done"
    );

    batcher.shutdown();
    Ok(())
}
