//! End-to-end test of the augmentation driver on a synthetic dataset.

use data_contracts::{DatasetManifest, LabelFormat};
use detect_dataset::aug::TransformPipelineBuilder;
use detect_dataset::export::{run_augment, AugmentOptions};
use detect_dataset::{index_split, read_labels};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Lay out a small dataset: data.yaml, images/train/*.png, labels/train/*.txt.
fn create_synthetic_dataset(root: &Path, frames: usize) -> anyhow::Result<PathBuf> {
    let images = root.join("images/train");
    let labels = root.join("labels/train");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&labels)?;

    for i in 0..frames {
        let name = format!("frame_{i:03}");
        let img = RgbImage::from_fn(96, 80, |x, y| {
            Rgb([(x * 2) as u8, (y * 3) as u8, (i * 40) as u8])
        });
        img.save(images.join(format!("{name}.png")))?;
        // One centered box plus one off-center box, center/size schema.
        fs::write(
            labels.join(format!("{name}.txt")),
            "0 0.5 0.5 0.4 0.4\n1 0.25 0.3 0.2 0.2\n",
        )?;
    }

    let manifest = DatasetManifest {
        path: None,
        train: "images/train".into(),
        val: None,
        names: vec!["orange mallet".into(), "water bottle".into()],
        label_format: LabelFormat::CenterSize,
    };
    let manifest_path = root.join("data.yaml");
    manifest.save(&manifest_path)?;
    Ok(manifest_path)
}

fn pipeline(seed: u64) -> detect_dataset::TransformPipeline {
    TransformPipelineBuilder::new()
        .crop(Some((48, 48)), 1.0)
        .seed(Some(seed))
        .build()
}

#[test]
fn augment_driver_end_to_end() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 3)?;
    let out_root = tmp.path().join("augmented");

    let opts = AugmentOptions {
        manifest_path,
        output_root: out_root.clone(),
        output_format: None,
        copy_originals: false,
    };
    let report = run_augment(&opts, &pipeline(7))?;
    assert_eq!(report.processed, 3);
    assert_eq!(report.images_written, 3);
    assert_eq!(report.boxes_in, 6);

    let exported = DatasetManifest::load(&out_root.join("data.yaml"))?;
    assert_eq!(exported.names.len(), 2);
    assert_eq!(exported.label_format, LabelFormat::CenterSize);

    let out_indices = index_split(&out_root.join("images/train"))?;
    assert_eq!(out_indices.len(), 3);
    for index in &out_indices {
        assert!(index
            .image_path
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .ends_with("_aug"));
        let img = image::open(&index.image_path)?.to_rgb8();
        assert_eq!(img.dimensions(), (48, 48));
        let annotations = read_labels(&index.label_path, LabelFormat::CenterSize, 2)?;
        for annotation in &annotations {
            data_contracts::validate_corner(annotation.bbox)?;
        }
    }
    Ok(())
}

#[test]
fn seeded_runs_are_identical() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 2)?;

    let mut label_dumps = Vec::new();
    for run in 0..2 {
        let out_root = tmp.path().join(format!("out_{run}"));
        let opts = AugmentOptions {
            manifest_path: manifest_path.clone(),
            output_root: out_root.clone(),
            output_format: None,
            copy_originals: false,
        };
        run_augment(&opts, &pipeline(42))?;

        let mut dump = String::new();
        for index in index_split(&out_root.join("images/train"))? {
            dump.push_str(&fs::read_to_string(&index.label_path)?);
        }
        label_dumps.push(dump);
    }
    assert_eq!(label_dumps[0], label_dumps[1]);
    Ok(())
}

#[test]
fn copy_originals_keeps_source_samples() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 2)?;
    let out_root = tmp.path().join("augmented");

    let opts = AugmentOptions {
        manifest_path,
        output_root: out_root.clone(),
        output_format: Some(LabelFormat::Corners),
        copy_originals: true,
    };
    let report = run_augment(&opts, &pipeline(3))?;
    assert_eq!(report.images_written, 4);

    let out_indices = index_split(&out_root.join("images/train"))?;
    assert_eq!(out_indices.len(), 4);

    // Exported labels are in the corner schema now.
    let exported = DatasetManifest::load(&out_root.join("data.yaml"))?;
    assert_eq!(exported.label_format, LabelFormat::Corners);
    for index in &out_indices {
        let annotations = read_labels(&index.label_path, LabelFormat::Corners, 2)?;
        for annotation in &annotations {
            data_contracts::validate_corner(annotation.bbox)?;
        }
    }
    Ok(())
}
