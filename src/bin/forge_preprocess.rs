use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use forge_api::preprocess::{DEFAULT_IMAGE_SIZE, Preprocessor};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "forge-preprocess")]
#[command(about = "Resize scraped NFT images into a square training set")]
#[command(version)]
struct Args {
    #[arg(long, default_value = "data/raw", env = "FORGE_RAW_DIR")]
    raw_dir: PathBuf,

    #[arg(long, default_value = "data/processed", env = "FORGE_PROCESSED_DIR")]
    processed_dir: PathBuf,

    /// Edge length of the square output images
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
    image_size: u32,
}

fn main() -> Result<()> {
    forge_api::init_tracing();
    let args = Args::parse();
    if args.image_size == 0 {
        bail!("--image-size must be positive");
    }

    let preprocessor = Preprocessor::new(&args.raw_dir, &args.processed_dir, args.image_size)
        .context("Failed to prepare output directory")?;
    let report = preprocessor
        .process_images()
        .context("Preprocessing failed")?;

    info!(
        processed = report.processed.len(),
        failed = report.failed.len(),
        metadata = %report.metadata_path.display(),
        "Done"
    );
    Ok(())
}
