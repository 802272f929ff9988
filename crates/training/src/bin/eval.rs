use clap::Parser;
use data_contracts::DatasetManifest;
use detect_dataset::load_split;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use training::util::{iou_xyxy, load_detector_from_checkpoint, validate_backend_choice, BackendKind};
use training::{collate, MultiboxDetectorConfig, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a detector checkpoint on a dataset split (precision/recall by IoU)"
)]
struct Args {
    /// Dataset manifest (data.yaml).
    #[arg(long, default_value = "data/data.yaml")]
    manifest: PathBuf,
    /// Checkpoint to load.
    #[arg(long, default_value = "checkpoints/best.bin")]
    checkpoint: PathBuf,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Letterbox side length fed to collation.
    #[arg(long, default_value_t = 640)]
    imgsz: u32,
    /// Maximum boxes per image (must match training).
    #[arg(long, default_value_t = 64)]
    max_boxes: usize,
    /// Hidden width of the detector (must match training).
    #[arg(long, default_value_t = 128)]
    hidden: usize,
    /// Number of hidden blocks (must match training).
    #[arg(long, default_value_t = 2)]
    depth: usize,
    /// Objectness threshold for counting a prediction.
    #[arg(long, default_value_t = 0.5)]
    score_thresh: f32,
    /// IoU threshold for a true positive.
    #[arg(long, default_value_t = 0.5)]
    iou_thresh: f32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let manifest = DatasetManifest::load(&args.manifest)?;
    let images_dir = match manifest.val_images_dir(&args.manifest) {
        Some(dir) => dir,
        None => {
            warn!("manifest has no val split; evaluating on train");
            manifest.train_images_dir(&args.manifest)
        }
    };
    let samples = load_split(&images_dir, manifest.label_format, manifest.num_classes())?;
    if samples.is_empty() {
        anyhow::bail!("no samples found under {}", images_dir.display());
    }
    info!(samples = samples.len(), split = %images_dir.display(), "evaluating");

    let device = Default::default();
    let cfg = MultiboxDetectorConfig {
        hidden: args.hidden,
        depth: args.depth,
        max_boxes: args.max_boxes,
        num_classes: manifest.num_classes(),
        input_dim: 8,
    };
    let model = load_detector_from_checkpoint(&args.checkpoint, cfg, &device).map_err(|e| {
        anyhow::anyhow!(
            "failed to load checkpoint {}: {e}",
            args.checkpoint.display()
        )
    })?;

    let num_classes = manifest.num_classes();
    let mut total_tp = 0usize;
    let mut total_fp = 0usize;
    let mut total_fn = 0usize;
    let mut tp_per_class = vec![0usize; num_classes];
    let mut gt_per_class = vec![0usize; num_classes];

    let batch_size = 8usize;
    for chunk in samples.chunks(batch_size) {
        let batch = collate::<TrainBackend>(chunk, args.imgsz, args.max_boxes, &device)?;
        let (pred_boxes, pred_scores, class_logits) = model.forward(batch.features.clone());

        let pb = pred_boxes.into_data().to_vec::<f32>().unwrap_or_default();
        let ps = pred_scores.into_data().to_vec::<f32>().unwrap_or_default();
        let cl = class_logits.into_data().to_vec::<f32>().unwrap_or_default();
        let gb = batch.boxes.into_data().to_vec::<f32>().unwrap_or_default();
        let gm = batch.box_mask.into_data().to_vec::<f32>().unwrap_or_default();
        let gc = batch.classes.into_data().to_vec::<i64>().unwrap_or_default();

        for b in 0..chunk.len() {
            let mut gt_list = Vec::new();
            for g in 0..args.max_boxes {
                let idx = b * args.max_boxes + g;
                if gm[idx] > 0.5 {
                    let bbox = [
                        gb[idx * 4],
                        gb[idx * 4 + 1],
                        gb[idx * 4 + 2],
                        gb[idx * 4 + 3],
                    ];
                    let class = gc[idx] as usize;
                    gt_list.push((bbox, class));
                    if class < num_classes {
                        gt_per_class[class] += 1;
                    }
                }
            }
            let mut gt_matched = vec![false; gt_list.len()];

            for p in 0..args.max_boxes {
                let idx = b * args.max_boxes + p;
                if ps[idx] <= args.score_thresh {
                    continue;
                }
                let pb_box = [
                    pb[idx * 4],
                    pb[idx * 4 + 1],
                    pb[idx * 4 + 2],
                    pb[idx * 4 + 3],
                ];
                let logits = &cl[idx * num_classes..(idx + 1) * num_classes];
                let pred_class = logits
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0);

                let mut matched = false;
                for (i, (gt_box, gt_class)) in gt_list.iter().enumerate() {
                    if gt_matched[i] || *gt_class != pred_class {
                        continue;
                    }
                    if iou_xyxy(pb_box, *gt_box) >= args.iou_thresh {
                        matched = true;
                        gt_matched[i] = true;
                        if pred_class < num_classes {
                            tp_per_class[pred_class] += 1;
                        }
                        break;
                    }
                }
                if matched {
                    total_tp += 1;
                } else {
                    total_fp += 1;
                }
            }
            total_fn += gt_matched.iter().filter(|m| !**m).count();
        }
    }

    let precision = if total_tp + total_fp > 0 {
        total_tp as f32 / (total_tp + total_fp) as f32
    } else {
        0.0
    };
    let recall = if total_tp + total_fn > 0 {
        total_tp as f32 / (total_tp + total_fn) as f32
    } else {
        0.0
    };

    println!(
        "Eval complete: precision={:.3}, recall={:.3} (tp={}, fp={}, fn={}, iou_thresh={})",
        precision, recall, total_tp, total_fp, total_fn, args.iou_thresh
    );
    for (class, name) in manifest.names.iter().enumerate() {
        println!(
            "  {name}: tp={} gt={}",
            tp_per_class[class], gt_per_class[class]
        );
    }

    Ok(())
}
