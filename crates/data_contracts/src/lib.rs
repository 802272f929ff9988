//! Shared data contracts for annotations, dataset manifests, and image stats.
//!
//! Everything here is pure data: no image decoding, no tensor types.
//! - Bounding-box annotations in the two interchangeable normalized schemas
//!   (corner-based and center/size-based), with conversion and validation.
//! - The dataset manifest (`data.yaml`) naming splits and classes.
//! - Per-image statistics used as model input features.

pub mod annotation;
pub mod manifest;
pub mod preprocess;

pub use annotation::{
    center_to_corner, clamp_corner, corner_to_center, validate_center, validate_corner,
    Annotation, LabelFormat, ValidationError,
};
pub use manifest::{DatasetManifest, ManifestError};
pub use preprocess::{stats_from_chw_f32, stats_from_rgb_u8, ImageStats, PreprocessError};
