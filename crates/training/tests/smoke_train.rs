//! Training smoke tests on a tiny synthetic dataset.

use data_contracts::{DatasetManifest, LabelFormat};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use training::util::{load_detector_from_checkpoint, run_train, BackendKind, TrainArgs};
use training::{collate, MultiboxDetectorConfig, TrainBackend};

fn create_synthetic_dataset(root: &Path, frames: usize) -> anyhow::Result<PathBuf> {
    let images = root.join("images/train");
    let labels = root.join("labels/train");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&labels)?;
    for i in 0..frames {
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, i as u8]));
        img.save(images.join(format!("frame_{i:03}.png")))?;
        fs::write(
            labels.join(format!("frame_{i:03}.txt")),
            "0 0.5 0.5 0.5 0.5\n1 0.25 0.25 0.2 0.2\n",
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

fn args(manifest: PathBuf, checkpoint_dir: PathBuf) -> TrainArgs {
    TrainArgs {
        manifest,
        pretrained: None,
        backend: BackendKind::NdArray,
        epochs: 1,
        imgsz: 32,
        batch_size: 2,
        lr: 1e-3,
        val_ratio: 0.25,
        seed: 1,
        max_boxes: 4,
        hidden: 8,
        depth: 1,
        lambda_box: 1.0,
        lambda_obj: 1.0,
        lambda_cls: 1.0,
        checkpoint_dir,
    }
}

#[test]
fn train_smoke_produces_checkpoint_pair() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 4)?;
    let checkpoint_dir = tmp.path().join("checkpoints");

    run_train(args(manifest_path, checkpoint_dir.clone()))?;

    let best = checkpoint_dir.join("best.bin");
    let last = checkpoint_dir.join("last.bin");
    assert!(best.exists(), "best.bin missing");
    assert!(last.exists(), "last.bin missing");

    // The checkpoint loads back into a matching config.
    let device = Default::default();
    let cfg = MultiboxDetectorConfig {
        hidden: 8,
        depth: 1,
        max_boxes: 4,
        num_classes: 2,
        input_dim: 8,
    };
    assert!(load_detector_from_checkpoint(&last, cfg, &device).is_ok());
    Ok(())
}

#[test]
fn training_resumes_from_pretrained_checkpoint() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 4)?;
    let first_dir = tmp.path().join("first");
    run_train(args(manifest_path.clone(), first_dir.clone()))?;

    let mut resumed = args(manifest_path, tmp.path().join("second"));
    resumed.pretrained = Some(first_dir.join("last.bin"));
    run_train(resumed)?;
    assert!(tmp.path().join("second/last.bin").exists());
    Ok(())
}

#[test]
fn missing_pretrained_checkpoint_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let manifest_path = create_synthetic_dataset(tmp.path(), 2)?;
    let mut broken = args(manifest_path, tmp.path().join("out"));
    broken.pretrained = Some(tmp.path().join("nope.bin"));
    assert!(run_train(broken).is_err());
    Ok(())
}

#[test]
fn collate_rejects_empty_batches() {
    let device = Default::default();
    assert!(collate::<TrainBackend>(&[], 32, 4, &device).is_err());
}
