//! Offline tree trainer CLI.
//!
//! Loads a CSV residual dump, trains the decision tree, and writes the
//! canonical-JSON model alongside its BLAKE3 hash and the serialized token
//! count.

use anyhow::{Context, Result};
use clap::Parser;
use matree_core::{to_canonical_json, tokenize_tree, Predictor};
use matree_trainer::{train_tree_from_csv, TrainParams};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "matree-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic meta-adaptive tree trainer", long_about = None)]
struct Args {
    /// Input CSV dataset (channel,group,y,x,pixel,pred_*)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the model and its hash
    #[arg(short, long, default_value = "models/matree")]
    output: PathBuf,

    /// Predictor configuration; 'best' and 'variable' train over several
    /// predictors, each needing its own pred_<name> column
    #[arg(long, default_value = "gradient")]
    predictor: Predictor,

    /// Minimum bit saving a split must buy
    #[arg(long, default_value = "96.0")]
    threshold: f32,

    /// Slack factor under which decode-friendly splits win
    #[arg(long, default_value = "1.0")]
    fast_decode_multiplier: f32,

    /// Bucket budget per property
    #[arg(long, default_value = "32")]
    max_property_values: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("loading dataset from {}", args.input.display());
    let params = TrainParams {
        predictor: args.predictor,
        threshold: args.threshold,
        fast_decode_multiplier: args.fast_decode_multiplier,
        max_property_values: args.max_property_values,
    };
    info!(
        "training: predictor={:?} threshold={} fast_decode_multiplier={} max_property_values={}",
        params.predictor, params.threshold, params.fast_decode_multiplier, params.max_property_values
    );

    let tree = train_tree_from_csv(&args.input, &params)?;
    tree.validate().context("trained tree failed validation")?;
    let (tokens, _) = tokenize_tree(&tree).context("failed to tokenize tree")?;
    info!("trained tree: {} nodes, {} tokens", tree.len(), tokens.len());

    std::fs::create_dir_all(&args.output).context("failed to create output directory")?;

    let model_path = args.output.join("tree.json");
    let canonical = to_canonical_json(&tree).context("failed to serialize tree")?;
    std::fs::write(&model_path, &canonical).context("failed to write model file")?;

    let hash = hex::encode(blake3::hash(canonical.as_bytes()).as_bytes());
    let hash_path = args.output.join("tree.hash");
    std::fs::write(&hash_path, &hash).context("failed to write hash file")?;

    info!("model: {}", model_path.display());
    info!("hash: {hash}");
    Ok(())
}
