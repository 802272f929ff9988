use anyhow::Context;
use clap::Parser;
use data_contracts::DatasetManifest;
use detect_dataset::index::{load_image, load_split};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Per-class box colors, cycled when a dataset has more classes.
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([64, 128, 255]),
    Rgb([255, 200, 0]),
    Rgb([200, 0, 255]),
    Rgb([0, 220, 220]),
];

#[derive(Parser, Debug)]
#[command(
    name = "preview",
    about = "Draw label boxes onto dataset images for spot-checking"
)]
struct Args {
    /// Dataset manifest (data.yaml).
    #[arg(long, default_value = "data/data.yaml")]
    manifest: PathBuf,
    /// Split to preview.
    #[arg(long, default_value = "train")]
    split: String,
    /// Output directory for the annotated copies.
    #[arg(long, default_value = "previews")]
    out: PathBuf,
    /// Maximum number of images to write.
    #[arg(long, default_value_t = 16)]
    limit: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let manifest = DatasetManifest::load(&args.manifest)?;
    let images_dir = match args.split.as_str() {
        "train" => manifest.train_images_dir(&args.manifest),
        "val" => manifest
            .val_images_dir(&args.manifest)
            .context("manifest has no val split")?,
        other => anyhow::bail!("unknown split {other:?} (expected train or val)"),
    };

    let samples = load_split(&images_dir, manifest.label_format, manifest.num_classes())?;
    std::fs::create_dir_all(&args.out)?;

    for sample in samples.iter().take(args.limit) {
        let mut img = load_image(&sample.index.image_path)?;
        let (w, h) = img.dimensions();
        for annotation in &sample.annotations {
            let [x0, y0, x1, y1] = annotation.bbox;
            let px = (x0 * w as f32).round() as i32;
            let py = (y0 * h as f32).round() as i32;
            let pw = ((x1 - x0) * w as f32).round().max(1.0) as u32;
            let ph = ((y1 - y0) * h as f32).round().max(1.0) as u32;
            let color = PALETTE[annotation.class_id as usize % PALETTE.len()];
            draw_hollow_rect_mut(&mut img, Rect::at(px, py).of_size(pw, ph), color);
        }
        let stem = sample
            .index
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("non-utf8 file name")?;
        let out_path = args.out.join(format!("{stem}_preview.png"));
        img.save(&out_path)?;
        info!(
            image = %sample.index.image_path.display(),
            boxes = sample.annotations.len(),
            out = %out_path.display(),
            "preview written"
        );
    }
    Ok(())
}
