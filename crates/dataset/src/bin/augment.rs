use clap::{Parser, ValueEnum};
use data_contracts::LabelFormat;
use detect_dataset::aug::TransformPipelineBuilder;
use detect_dataset::export::{run_augment, AugmentOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LabelFormatArg {
    Corners,
    CenterSize,
}

impl From<LabelFormatArg> for LabelFormat {
    fn from(value: LabelFormatArg) -> Self {
        match value {
            LabelFormatArg::Corners => LabelFormat::Corners,
            LabelFormatArg::CenterSize => LabelFormat::CenterSize,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "augment",
    about = "Apply the augmentation pipeline to a dataset and re-export it"
)]
struct Args {
    /// Dataset manifest (data.yaml).
    #[arg(long, default_value = "data/data.yaml")]
    manifest: PathBuf,
    /// Root directory of the exported dataset.
    #[arg(long, default_value = "augmented_dataset")]
    out: PathBuf,
    /// Label schema for the export (defaults to the input schema).
    #[arg(long, value_enum)]
    label_format: Option<LabelFormatArg>,
    /// Also copy the unaugmented samples into the export.
    #[arg(long, default_value_t = false)]
    copy_originals: bool,
    /// Crop size as WxH (e.g. 640x640), or "none" to disable the crop.
    #[arg(long, default_value = "640x640")]
    crop: String,
    /// RNG seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_crop(raw: &str) -> anyhow::Result<Option<(u32, u32)>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let (w, h) = raw
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("crop must be WxH or \"none\", got {raw:?}"))?;
    Ok(Some((w.parse()?, h.parse()?)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let crop = parse_crop(&args.crop)?;
    let pipeline = TransformPipelineBuilder::new()
        .crop(crop, 1.0)
        .seed(args.seed)
        .build();

    let opts = AugmentOptions {
        manifest_path: args.manifest,
        output_root: args.out,
        output_format: args.label_format.map(Into::into),
        copy_originals: args.copy_originals,
    };
    run_augment(&opts, &pipeline)?;
    Ok(())
}
