#![recursion_limit = "256"]

pub mod batch;
pub mod util;

pub use batch::{collate, CollatedBatch};
pub use models::{MultiboxDetector, MultiboxDetectorConfig};
pub use util::{
    batch_loss, build_greedy_targets, detector_config, iou_xyxy, load_detector_from_checkpoint,
    run_train, validate_backend_choice, BackendKind, LossWeights, TrainArgs,
};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
