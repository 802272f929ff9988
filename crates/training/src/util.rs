//! The training loop: pretrained checkpoint in, best/last checkpoints out.

use burn::backend::Autodiff;
use burn::module::Module;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use clap::{Parser, ValueEnum};
use data_contracts::DatasetManifest;
use detect_dataset::{load_split, DatasetSample};
use models::{MultiboxDetector, MultiboxDetectorConfig};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::{collate, CollatedBatch};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train the multibox detector from a pretrained checkpoint"
)]
pub struct TrainArgs {
    /// Dataset manifest (data.yaml).
    #[arg(long, default_value = "data/data.yaml")]
    pub manifest: PathBuf,
    /// Pretrained checkpoint to start from; omitted means fresh weights.
    #[arg(long)]
    pub pretrained: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Number of epochs.
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,
    /// Letterbox side length fed to collation.
    #[arg(long, default_value_t = 640)]
    pub imgsz: u32,
    /// Batch size.
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
    /// Learning rate.
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,
    /// Fraction of samples held out for validation.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f32,
    /// Seed for the split and epoch shuffles.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Maximum boxes per image (pads/truncates for collation).
    #[arg(long, default_value_t = 64)]
    pub max_boxes: usize,
    /// Hidden width of the detector.
    #[arg(long, default_value_t = 128)]
    pub hidden: usize,
    /// Number of hidden blocks.
    #[arg(long, default_value_t = 2)]
    pub depth: usize,
    /// Loss weight for box regression.
    #[arg(long, default_value_t = 1.0)]
    pub lambda_box: f32,
    /// Loss weight for objectness.
    #[arg(long, default_value_t = 1.0)]
    pub lambda_obj: f32,
    /// Loss weight for classification.
    #[arg(long, default_value_t = 1.0)]
    pub lambda_cls: f32,
    /// Directory receiving best.bin and last.bin.
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct LossWeights {
    pub bbox: f32,
    pub objectness: f32,
    pub class: f32,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            warn!("built with backend-wgpu; training uses the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

/// Detector config implied by the CLI arguments and the manifest.
pub fn detector_config(args: &TrainArgs, num_classes: usize) -> MultiboxDetectorConfig {
    MultiboxDetectorConfig {
        hidden: args.hidden,
        depth: args.depth,
        max_boxes: args.max_boxes,
        num_classes,
        input_dim: 8,
    }
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let manifest = DatasetManifest::load(&args.manifest)?;
    let images_dir = manifest.train_images_dir(&args.manifest);
    let mut samples = load_split(&images_dir, manifest.label_format, manifest.num_classes())?;
    if samples.is_empty() {
        anyhow::bail!("no samples found under {}", images_dir.display());
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
    samples.shuffle(&mut rng);
    let val_len = ((samples.len() as f32) * args.val_ratio.clamp(0.0, 0.9)).round() as usize;
    let val_len = val_len.min(samples.len().saturating_sub(1));
    let (val_samples, train_samples) = samples.split_at(val_len);
    let mut train_samples: Vec<DatasetSample> = train_samples.to_vec();
    if train_samples.is_empty() {
        anyhow::bail!("train split is empty after holding out validation samples");
    }
    if val_samples.is_empty() {
        warn!("no validation samples; best.bin tracks training loss instead");
    }
    info!(
        train = train_samples.len(),
        val = val_samples.len(),
        classes = manifest.num_classes(),
        "dataset loaded"
    );

    let device = <ADBackend as Backend>::Device::default();
    let cfg = detector_config(&args, manifest.num_classes());
    let mut model = MultiboxDetector::<ADBackend>::new(cfg, &device);

    if let Some(pretrained) = &args.pretrained {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model = model
            .load_file(pretrained.as_path(), &recorder, &device)
            .map_err(|e| {
                anyhow::anyhow!(
                    "failed to load pretrained checkpoint {}: {e}",
                    pretrained.display()
                )
            })?;
        info!(checkpoint = %pretrained.display(), "loaded pretrained weights");
    }

    fs::create_dir_all(&args.checkpoint_dir)?;
    let best_path = args.checkpoint_dir.join("best.bin");
    let last_path = args.checkpoint_dir.join("last.bin");

    let weights = LossWeights {
        bbox: args.lambda_box,
        objectness: args.lambda_obj,
        class: args.lambda_cls,
    };
    let mut optim = AdamConfig::new().init();
    let batch_size = args.batch_size.max(1);
    let mut best_loss = f32::INFINITY;

    for epoch in 0..args.epochs {
        train_samples.shuffle(&mut rng);

        let mut losses = Vec::new();
        for chunk in train_samples.chunks(batch_size) {
            let batch = collate::<ADBackend>(chunk, args.imgsz, args.max_boxes, &device)?;
            let loss = batch_loss(&model, &batch, &weights);
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(args.lr, model, grads);
            losses.push(scalar(&loss_detached));
        }
        let train_loss = mean(&losses);

        let val_loss = if val_samples.is_empty() {
            train_loss
        } else {
            let mut val_losses = Vec::new();
            for chunk in val_samples.chunks(batch_size) {
                let batch = collate::<ADBackend>(chunk, args.imgsz, args.max_boxes, &device)?;
                let loss = batch_loss(&model, &batch, &weights).detach();
                val_losses.push(scalar(&loss));
            }
            mean(&val_losses)
        };

        info!(epoch, train_loss, val_loss, "epoch complete");
        if val_loss < best_loss {
            best_loss = val_loss;
            save_checkpoint(&model, &best_path)?;
            info!(val_loss, checkpoint = %best_path.display(), "new best");
        }
    }

    save_checkpoint(&model, &last_path)?;
    info!(
        best = %best_path.display(),
        last = %last_path.display(),
        "training finished"
    );
    Ok(())
}

/// Combined loss over one batch: box L1 on matched slots, objectness BCE,
/// class cross-entropy on matched slots.
pub fn batch_loss<B: Backend>(
    model: &MultiboxDetector<B>,
    batch: &CollatedBatch<B>,
    weights: &LossWeights,
) -> Tensor<B, 1> {
    let (pred_boxes, pred_scores, class_logits) = model.forward(batch.features.clone());
    let device = pred_boxes.device();
    let batch_size = pred_boxes.dims()[0];
    let max_pred = pred_boxes.dims()[1];

    let (obj_targets, box_targets, box_weights, class_targets, class_weights) =
        build_greedy_targets(
            pred_boxes.clone(),
            batch.boxes.clone(),
            batch.box_mask.clone(),
            batch.classes.clone(),
        );

    // Objectness: BCE with targets; unassigned predictions stay at 0.0.
    let eps = 1e-6;
    let scores_clamped = pred_scores.clamp(eps, 1.0 - eps);
    let obj_targets_inv = Tensor::<B, 2>::ones(obj_targets.dims(), &device) - obj_targets.clone();
    let obj_loss = -((obj_targets * scores_clamped.clone().log())
        + (obj_targets_inv
            * (Tensor::<B, 2>::ones(scores_clamped.dims(), &device) - scores_clamped).log()))
    .sum()
    .div_scalar((batch_size * max_pred) as f32);

    // Box regression: L1 on matched slots only.
    let box_err = (pred_boxes - box_targets).abs() * box_weights.clone();
    let matched = scalar(&box_weights.sum().div_scalar(4.0));
    let box_loss = if matched > 0.0 {
        box_err.sum().div_scalar(matched)
    } else {
        Tensor::<B, 1>::from_data(TensorData::new(vec![0.0f32; 1], [1]), &device)
    };

    // Classification: cross-entropy on matched slots.
    let log_probs = log_softmax(class_logits, 2);
    let idx: Tensor<B, 3, Int> = class_targets.unsqueeze_dim(2);
    let picked = log_probs.gather(2, idx).reshape([batch_size, max_pred]);
    let cls_matched = scalar(&class_weights.clone().sum()).max(1.0);
    let cls_loss = -(picked * class_weights).sum().div_scalar(cls_matched);

    box_loss * weights.bbox + obj_loss * weights.objectness + cls_loss * weights.class
}

/// Greedy matching per ground-truth box: each GT claims its best prediction
/// by IoU. Deterministic and cheap; finer matching can slot in here later.
pub fn build_greedy_targets<B: Backend>(
    pred_boxes: Tensor<B, 3>,
    gt_boxes: Tensor<B, 3>,
    gt_mask: Tensor<B, 2>,
    gt_classes: Tensor<B, 2, Int>,
) -> (
    Tensor<B, 2>,
    Tensor<B, 3>,
    Tensor<B, 3>,
    Tensor<B, 2, Int>,
    Tensor<B, 2>,
) {
    let device = pred_boxes.device();
    let batch = pred_boxes.dims()[0];
    let max_pred = pred_boxes.dims()[1];
    let max_gt = gt_boxes.dims()[1];

    let gt_mask_vec = gt_mask.into_data().to_vec::<f32>().unwrap_or_default();
    let gt_boxes_vec = gt_boxes.into_data().to_vec::<f32>().unwrap_or_default();
    let gt_class_vec = gt_classes.into_data().to_vec::<i64>().unwrap_or_default();
    let pred_boxes_vec = pred_boxes.into_data().to_vec::<f32>().unwrap_or_default();

    let mut obj_targets = vec![0.0f32; batch * max_pred];
    let mut box_targets = vec![0.0f32; batch * max_pred * 4];
    let mut box_weights = vec![0.0f32; batch * max_pred * 4];
    let mut class_targets = vec![0i64; batch * max_pred];
    let mut class_weights = vec![0.0f32; batch * max_pred];

    for b in 0..batch {
        for g in 0..max_gt {
            let mask_idx = b * max_gt + g;
            if gt_mask_vec.get(mask_idx).copied().unwrap_or(0.0) < 0.5 {
                continue;
            }
            let gb = [
                gt_boxes_vec[(b * max_gt + g) * 4],
                gt_boxes_vec[(b * max_gt + g) * 4 + 1],
                gt_boxes_vec[(b * max_gt + g) * 4 + 2],
                gt_boxes_vec[(b * max_gt + g) * 4 + 3],
            ];

            let mut best_iou = -1.0f32;
            let mut best_p = 0usize;
            for p in 0..max_pred {
                let pb = [
                    pred_boxes_vec[(b * max_pred + p) * 4],
                    pred_boxes_vec[(b * max_pred + p) * 4 + 1],
                    pred_boxes_vec[(b * max_pred + p) * 4 + 2],
                    pred_boxes_vec[(b * max_pred + p) * 4 + 3],
                ];
                let iou = iou_xyxy(pb, gb);
                if iou > best_iou {
                    best_iou = iou;
                    best_p = p;
                }
            }

            let obj_idx = b * max_pred + best_p;
            obj_targets[obj_idx] = 1.0;
            class_targets[obj_idx] = gt_class_vec.get(mask_idx).copied().unwrap_or(0);
            class_weights[obj_idx] = 1.0;
            let bt_base = obj_idx * 4;
            box_targets[bt_base..bt_base + 4].copy_from_slice(&gb);
            box_weights[bt_base..bt_base + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        }
    }

    (
        Tensor::from_data(TensorData::new(obj_targets, [batch, max_pred]), &device),
        Tensor::from_data(TensorData::new(box_targets, [batch, max_pred, 4]), &device),
        Tensor::from_data(TensorData::new(box_weights, [batch, max_pred, 4]), &device),
        Tensor::from_data(TensorData::new(class_targets, [batch, max_pred]), &device),
        Tensor::from_data(TensorData::new(class_weights, [batch, max_pred]), &device),
    )
}

pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ax0 = a[0].min(a[2]);
    let ay0 = a[1].min(a[3]);
    let ax1 = a[0].max(a[2]);
    let ay1 = a[1].max(a[3]);
    let bx0 = b[0].min(b[2]);
    let by0 = b[1].min(b[3]);
    let bx1 = b[0].max(b[2]);
    let by1 = b[1].max(b[3]);

    let inter_x0 = ax0.max(bx0);
    let inter_y0 = ay0.max(by0);
    let inter_x1 = ax1.min(bx1);
    let inter_y1 = ay1.min(by1);

    let inter_w = (inter_x1 - inter_x0).max(0.0);
    let inter_h = (inter_y1 - inter_y0).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (ax1 - ax0).max(0.0) * (ay1 - ay0).max(0.0);
    let area_b = (bx1 - bx0).max(0.0) * (by1 - by0).max(0.0);
    let denom = area_a + area_b - inter_area;
    if denom <= 0.0 {
        0.0
    } else {
        inter_area / denom
    }
}

/// Load a checkpoint into a fresh detector on the inference backend.
pub fn load_detector_from_checkpoint<P: AsRef<Path>>(
    path: P,
    cfg: MultiboxDetectorConfig,
    device: &<TrainBackend as Backend>::Device,
) -> Result<MultiboxDetector<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    MultiboxDetector::<TrainBackend>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

fn save_checkpoint(model: &MultiboxDetector<ADBackend>, path: &Path) -> anyhow::Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.1, 0.1, 0.5, 0.5];
        assert!((iou_xyxy(b, b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou_xyxy([0.0, 0.0, 0.2, 0.2], [0.5, 0.5, 0.9, 0.9]), 0.0);
    }

    #[test]
    fn greedy_targets_assign_each_gt_once() {
        type B = crate::TrainBackend;
        let device = Default::default();
        // One sample, two preds, one GT overlapping the second pred.
        let pred = Tensor::<B, 3>::from_data(
            TensorData::new(vec![0.0f32, 0.0, 0.1, 0.1, 0.4, 0.4, 0.8, 0.8], [1, 2, 4]),
            &device,
        );
        let gt = Tensor::<B, 3>::from_data(
            TensorData::new(
                vec![0.45f32, 0.45, 0.75, 0.75, 0.0, 0.0, 0.0, 0.0],
                [1, 2, 4],
            ),
            &device,
        );
        let mask = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [1, 2]), &device);
        let classes =
            Tensor::<B, 2, Int>::from_data(TensorData::new(vec![1i64, 0], [1, 2]), &device);

        let (obj, _boxes, box_w, cls, cls_w) = build_greedy_targets(pred, gt, mask, classes);
        let obj = obj.into_data().to_vec::<f32>().unwrap();
        assert_eq!(obj, vec![0.0, 1.0]);
        let cls = cls.into_data().to_vec::<i64>().unwrap();
        assert_eq!(cls, vec![0, 1]);
        let cls_w = cls_w.into_data().to_vec::<f32>().unwrap();
        assert_eq!(cls_w, vec![0.0, 1.0]);
        let box_w = box_w.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&box_w[4..8], &[1.0, 1.0, 1.0, 1.0]);
    }
}
