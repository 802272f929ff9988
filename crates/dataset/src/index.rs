//! Pairing image files with label files and summarizing a split.

use crate::labels::read_labels;
use crate::types::{DatasetError, DatasetResult, DatasetSample, SampleIndex, SplitSummary};
use data_contracts::{DatasetManifest, LabelFormat};
use image::RgbImage;
use std::path::Path;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Scan an images directory and index every image with its label path.
/// Entries come back sorted by image path.
pub fn index_split(images_dir: &Path) -> DatasetResult<Vec<SampleIndex>> {
    if !images_dir.is_dir() {
        return Err(DatasetError::MissingImagesDir {
            path: images_dir.to_path_buf(),
        });
    }
    let labels_dir = DatasetManifest::labels_dir_for(images_dir);
    let entries = std::fs::read_dir(images_dir).map_err(|e| DatasetError::Io {
        path: images_dir.to_path_buf(),
        source: e,
    })?;

    let mut indices = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let image_path = entry.path();
        let Some(ext) = image_path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Some(stem) = image_path.file_stem() else {
            continue;
        };
        let label_path = labels_dir.join(Path::new(stem)).with_extension("txt");
        indices.push(SampleIndex {
            image_path,
            label_path,
        });
    }
    indices.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    Ok(indices)
}

/// Index a split and parse every label file.
pub fn load_split(
    images_dir: &Path,
    format: LabelFormat,
    num_classes: usize,
) -> DatasetResult<Vec<DatasetSample>> {
    let indices = index_split(images_dir)?;
    let mut samples = Vec::with_capacity(indices.len());
    for index in indices {
        let annotations = read_labels(&index.label_path, format, num_classes)?;
        samples.push(DatasetSample { index, annotations });
    }
    Ok(samples)
}

/// Count labeled / empty / label-file-missing entries without failing the run.
pub fn summarize_split(
    indices: &[SampleIndex],
    format: LabelFormat,
    num_classes: usize,
) -> SplitSummary {
    let mut summary = SplitSummary {
        total: indices.len(),
        ..Default::default()
    };
    for index in indices {
        if !index.label_path.exists() {
            summary.missing_label_file += 1;
            continue;
        }
        match read_labels(&index.label_path, format, num_classes) {
            Ok(annotations) if annotations.is_empty() => summary.empty += 1,
            Ok(annotations) => {
                summary.labeled += 1;
                summary.boxes += annotations.len();
            }
            Err(_) => summary.empty += 1,
        }
    }
    summary
}

/// Decode an image file to RGB.
pub fn load_image(path: &Path) -> DatasetResult<RgbImage> {
    let img = image::open(path).map_err(|e| DatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(img.to_rgb8())
}
