//! Scrapes NFT collections from OpenSea and Magic Eden into a local image set.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use forge_api::scraper::{
    self, ImageDownloader, Marketplace, MarketplaceClient, MarketplaceEndpoints,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "forge-scrape")]
#[command(about = "Download NFT collection images and listings")]
#[command(version)]
struct Args {
    /// OpenSea collection slugs
    #[arg(long = "opensea", value_name = "SLUG")]
    opensea: Vec<String>,

    /// Magic Eden collection symbols
    #[arg(long = "magiceden", value_name = "SYMBOL")]
    magiceden: Vec<String>,

    /// Items to collect per collection
    #[arg(long, default_value_t = 100)]
    limit: usize,

    /// Directory for images and listing JSON
    #[arg(long = "out", default_value = "data/raw", env = "FORGE_RAW_DIR")]
    save_dir: PathBuf,

    /// Concurrent downloads
    #[arg(long, default_value_t = scraper::DEFAULT_WORKERS)]
    workers: usize,

    #[arg(long, env = "OPENSEA_API_KEY", hide_env_values = true)]
    opensea_api_key: Option<String>,

    #[arg(long, env = "MAGICEDEN_API_KEY", hide_env_values = true)]
    magiceden_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    forge_api::init_tracing();
    let args = Args::parse();

    if args.opensea.is_empty() && args.magiceden.is_empty() {
        bail!("Provide at least one --opensea or --magiceden collection");
    }
    if args.limit == 0 || args.workers == 0 {
        bail!("--limit and --workers must be positive");
    }

    let endpoints = MarketplaceEndpoints {
        opensea_api_key: args.opensea_api_key.filter(|key| !key.is_empty()),
        magiceden_api_key: args.magiceden_api_key.filter(|key| !key.is_empty()),
        ..MarketplaceEndpoints::default()
    };
    let client = MarketplaceClient::new(endpoints).context("Failed to build marketplace client")?;
    let downloader = ImageDownloader::new(&args.save_dir, args.workers)
        .context("Failed to build image downloader")?;

    let jobs = args
        .opensea
        .iter()
        .map(|slug| (Marketplace::OpenSea, slug))
        .chain(args.magiceden.iter().map(|symbol| (Marketplace::MagicEden, symbol)));

    let (mut saved, mut failed) = (0usize, 0usize);
    for (marketplace, collection) in jobs {
        let report = scraper::download_collection_images(
            &client,
            &downloader,
            marketplace,
            collection,
            args.limit,
        )
        .await;
        info!(
            marketplace = %report.marketplace,
            collection = %report.collection,
            items = report.items,
            saved = report.downloads.saved.len(),
            failed = report.downloads.failed.len(),
            "Collection finished"
        );
        saved += report.downloads.saved.len();
        failed += report.downloads.failed.len();
    }

    info!(
        saved,
        failed,
        dir = %args.save_dir.display(),
        "Scraping complete"
    );
    Ok(())
}
