use clap::Parser;
use data_contracts::DatasetManifest;
use models::MultiboxDetectorConfig;
use onnx_export::{export_checkpoint, onnx_path_for};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "export",
    about = "Export trained checkpoints (best/last) to ONNX for inference"
)]
struct Args {
    /// Dataset manifest; supplies the class count the checkpoint was trained with.
    #[arg(long, default_value = "data/data.yaml")]
    manifest: PathBuf,
    /// Directory holding best.bin / last.bin.
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,
    /// Explicit checkpoints to export instead of the best/last pair.
    #[arg(long)]
    checkpoint: Vec<PathBuf>,
    /// Output directory for the .onnx files (defaults to the checkpoint dir).
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Hidden width of the detector (must match training).
    #[arg(long, default_value_t = 128)]
    hidden: usize,
    /// Number of hidden blocks (must match training).
    #[arg(long, default_value_t = 2)]
    depth: usize,
    /// Maximum boxes per image (must match training).
    #[arg(long, default_value_t = 64)]
    max_boxes: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let manifest = DatasetManifest::load(&args.manifest)?;
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| args.checkpoint_dir.clone());

    let targets: Vec<PathBuf> = if args.checkpoint.is_empty() {
        ["best.bin", "last.bin"]
            .iter()
            .map(|name| args.checkpoint_dir.join(name))
            .filter(|path| path.exists())
            .collect()
    } else {
        args.checkpoint.clone()
    };
    if targets.is_empty() {
        anyhow::bail!(
            "no checkpoints found under {} (expected best.bin/last.bin)",
            args.checkpoint_dir.display()
        );
    }

    for checkpoint in &targets {
        let cfg = MultiboxDetectorConfig {
            hidden: args.hidden,
            depth: args.depth,
            max_boxes: args.max_boxes,
            num_classes: manifest.num_classes(),
            input_dim: 8,
        };
        export_checkpoint(checkpoint, cfg, &onnx_path_for(checkpoint, &out_dir))?;
    }
    Ok(())
}
