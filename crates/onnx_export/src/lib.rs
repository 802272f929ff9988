//! Conversion of trained detector checkpoints into ONNX inference artifacts.
//!
//! The checkpoint is rebuilt through the training crate's recorder machinery,
//! its weights extracted, and an opset-12 graph assembled and written as a
//! prost-encoded `ModelProto`.

pub mod graph;
pub mod proto;

pub use graph::{build_model_proto, write_onnx, ExportError, IR_VERSION, ONNX_OPSET};
pub use proto::ModelProto;

use models::MultiboxDetectorConfig;
use std::path::{Path, PathBuf};
use tracing::info;
use training::load_detector_from_checkpoint;

/// Load a checkpoint, rebuild the detector, and write the ONNX artifact.
pub fn export_checkpoint(
    checkpoint: &Path,
    cfg: MultiboxDetectorConfig,
    out: &Path,
) -> anyhow::Result<()> {
    let device = Default::default();
    let model = load_detector_from_checkpoint(checkpoint, cfg, &device).map_err(|e| {
        anyhow::anyhow!("failed to load checkpoint {}: {e}", checkpoint.display())
    })?;
    let weights = model.extract_weights()?;
    let proto = build_model_proto(&weights)?;
    write_onnx(&proto, out)?;
    info!(
        checkpoint = %checkpoint.display(),
        out = %out.display(),
        opset = ONNX_OPSET,
        "exported"
    );
    Ok(())
}

/// The `.onnx` path next to a checkpoint, under `out_dir`.
pub fn onnx_path_for(checkpoint: &Path, out_dir: &Path) -> PathBuf {
    let stem = checkpoint
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    out_dir.join(format!("{stem}.onnx"))
}
