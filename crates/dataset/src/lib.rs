//! Dataset indexing, label IO, and the box-aware augmentation pipeline.
//!
//! This crate provides:
//! - Pairing of image files with label files per the manifest layout
//! - Label parsing/serialization in both on-disk box schemas
//! - The augmentation pipeline (crop, flips, color jitter,
//!   shift/scale/rotate, blur/noise group)
//! - The augmentation driver that re-exports an augmented dataset

pub mod aug;
pub mod export;
pub mod index;
pub mod labels;
pub mod types;

pub use aug::{
    letterbox, AugmentConfig, AugmentedSample, TransformPipeline, TransformPipelineBuilder,
};
pub use export::{run_augment, AugmentOptions, AugmentReport};
pub use index::{index_split, load_image, load_split, summarize_split};
pub use labels::{read_labels, write_labels};
pub use types::{DatasetError, DatasetResult, DatasetSample, SampleIndex, SplitSummary};
