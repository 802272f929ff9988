//! The augmentation driver: dataset in, augmented dataset out.

use crate::aug::TransformPipeline;
use crate::index::{index_split, load_image, summarize_split};
use crate::labels::{read_labels, write_labels};
use anyhow::Context;
use data_contracts::{DatasetManifest, LabelFormat};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AugmentOptions {
    /// Input dataset manifest (data.yaml).
    pub manifest_path: PathBuf,
    /// Root directory of the exported dataset.
    pub output_root: PathBuf,
    /// Label schema for the export; None keeps the input schema.
    pub output_format: Option<LabelFormat>,
    /// Also copy the unaugmented samples into the export.
    pub copy_originals: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AugmentReport {
    pub processed: usize,
    pub images_written: usize,
    pub boxes_in: usize,
    pub boxes_out: usize,
    pub dropped_boxes: usize,
}

/// Run the augmentation pipeline over the manifest's train split and
/// re-export the result as a dataset of its own. One shot; the first
/// failure aborts the run.
pub fn run_augment(
    opts: &AugmentOptions,
    pipeline: &TransformPipeline,
) -> anyhow::Result<AugmentReport> {
    let manifest = DatasetManifest::load(&opts.manifest_path)?;
    let images_dir = manifest.train_images_dir(&opts.manifest_path);
    let indices = index_split(&images_dir)?;
    if indices.is_empty() {
        anyhow::bail!("no images found under {}", images_dir.display());
    }

    let summary = summarize_split(&indices, manifest.label_format, manifest.num_classes());
    info!(
        total = summary.total,
        labeled = summary.labeled,
        empty = summary.empty,
        missing_label_file = summary.missing_label_file,
        "indexed train split"
    );
    info!(pipeline = %pipeline.describe(), "augmentation pipeline");

    let out_format = opts.output_format.unwrap_or(manifest.label_format);
    let out_images = opts.output_root.join("images/train");
    let out_labels = opts.output_root.join("labels/train");
    std::fs::create_dir_all(&out_images)
        .with_context(|| format!("creating {}", out_images.display()))?;
    std::fs::create_dir_all(&out_labels)
        .with_context(|| format!("creating {}", out_labels.display()))?;

    let mut report = AugmentReport::default();
    for (i, index) in indices.iter().enumerate() {
        let annotations = read_labels(
            &index.label_path,
            manifest.label_format,
            manifest.num_classes(),
        )?;
        info!(
            image = %index.image_path.display(),
            boxes = annotations.len(),
            "processing image"
        );

        let img = load_image(&index.image_path)?;
        let augmented = pipeline.apply(img, &annotations, i as u64);
        if augmented.dropped_boxes > 0 {
            warn!(
                image = %index.image_path.display(),
                dropped = augmented.dropped_boxes,
                "boxes fell below the visibility threshold"
            );
        }

        let stem = index
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("non-utf8 file name: {}", index.image_path.display()))?;
        let ext = output_extension(&index.image_path);

        let image_out = out_images.join(format!("{stem}_aug.{ext}"));
        augmented
            .image
            .save(&image_out)
            .with_context(|| format!("writing {}", image_out.display()))?;
        write_labels(
            &out_labels.join(format!("{stem}_aug.txt")),
            &augmented.annotations,
            out_format,
        )?;
        report.images_written += 1;

        if opts.copy_originals {
            let copy_out = out_images.join(format!("{stem}.{ext}"));
            std::fs::copy(&index.image_path, &copy_out)
                .with_context(|| format!("copying {}", index.image_path.display()))?;
            write_labels(
                &out_labels.join(format!("{stem}.txt")),
                &annotations,
                out_format,
            )?;
            report.images_written += 1;
        }

        report.processed += 1;
        report.boxes_in += annotations.len();
        report.boxes_out += augmented.annotations.len();
        report.dropped_boxes += augmented.dropped_boxes;
    }

    let exported = DatasetManifest {
        path: None,
        train: "images/train".into(),
        val: None,
        names: manifest.names.clone(),
        label_format: out_format,
    };
    let manifest_out = opts.output_root.join("data.yaml");
    exported.save(&manifest_out)?;

    info!(
        processed = report.processed,
        images_written = report.images_written,
        boxes_in = report.boxes_in,
        boxes_out = report.boxes_out,
        dropped_boxes = report.dropped_boxes,
        manifest = %manifest_out.display(),
        "augmented dataset exported"
    );
    Ok(report)
}

/// Keep the source encoding when the image crate can write it; PNG otherwise.
fn output_extension(path: &Path) -> String {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ["jpg", "jpeg", "png", "bmp"].contains(&ext.as_str()) => ext,
        _ => "png".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extensions_fall_back_to_png() {
        assert_eq!(output_extension(Path::new("a.tiff")), "png");
        assert_eq!(output_extension(Path::new("a.JPG")), "jpg");
        assert_eq!(output_extension(Path::new("noext")), "png");
    }
}
