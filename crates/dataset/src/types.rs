//! Error definitions and core sample types.

use data_contracts::Annotation;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Manifest(#[from] data_contracts::ManifestError),
    #[error("label parse error at {path}:{line}: {msg}")]
    Label {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    #[error("invalid annotation at {path}:{line}: {source}")]
    Annotation {
        path: PathBuf,
        line: usize,
        #[source]
        source: data_contracts::ValidationError,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("images directory missing: {path}")]
    MissingImagesDir { path: PathBuf },
}

/// One dataset entry: an image file and its (possibly absent) label file.
#[derive(Debug, Clone)]
pub struct SampleIndex {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

/// A fully loaded entry: index plus parsed annotations in the corner schema.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub index: SampleIndex,
    pub annotations: Vec<Annotation>,
}

/// Counters over one split, reported before a run touches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub total: usize,
    pub labeled: usize,
    pub empty: usize,
    pub missing_label_file: usize,
    pub boxes: usize,
}
