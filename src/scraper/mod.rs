//! Marketplace scraping: collection listings plus their images.
//!
//! [`MarketplaceClient`] pages through a collection on OpenSea or Magic Eden
//! and returns the raw item JSON. [`extract_image_refs`] turns those items
//! into download jobs, and [`ImageDownloader`] runs the jobs on a bounded
//! pool where every download finishes or fails on its own.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::anyhow;
use serde_json::Value;
use thiserror::Error;

mod download;
mod marketplace;

pub use download::{DEFAULT_WORKERS, DownloadReport, ImageDownloader};
pub use marketplace::{MarketplaceClient, MarketplaceEndpoints};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not an image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marketplace {
    OpenSea,
    MagicEden,
}

impl Marketplace {
    pub const fn slug(self) -> &'static str {
        match self {
            Self::OpenSea => "opensea",
            Self::MagicEden => "magiceden",
        }
    }

    /// Largest page the marketplace API serves.
    pub const fn max_page_size(self) -> usize {
        match self {
            Self::OpenSea => 50,
            Self::MagicEden => 20,
        }
    }

    const fn image_field(self) -> &'static str {
        match self {
            Self::OpenSea => "image_url",
            Self::MagicEden => "image",
        }
    }

    const fn token_field(self) -> &'static str {
        match self {
            Self::OpenSea => "token_id",
            Self::MagicEden => "tokenMint",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Marketplace {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "opensea" => Ok(Self::OpenSea),
            "magiceden" | "magic-eden" => Ok(Self::MagicEden),
            other => Err(anyhow!("Unknown marketplace: {other}")),
        }
    }
}

/// One image to fetch, with the file name it is saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub file_name: String,
}

/// Builds download jobs for the items that carry an image URL.
pub fn extract_image_refs(marketplace: Marketplace, items: &[Value]) -> Vec<ImageRef> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let url = item
                .get(marketplace.image_field())
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())?;
            let token = match item.get(marketplace.token_field()) {
                Some(Value::String(token)) if !token.trim().is_empty() => token.trim().to_string(),
                Some(Value::Number(number)) => number.to_string(),
                _ => format!("item{index}"),
            };
            Some(ImageRef {
                url: url.to_string(),
                file_name: format!("{}_{}.png", marketplace.slug(), sanitize_file_stem(&token)),
            })
        })
        .collect()
}

/// Keeps file names portable: anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes the raw listing JSON next to the images.
pub async fn write_collection_metadata(
    save_dir: &Path,
    marketplace: Marketplace,
    collection: &str,
    items: &[Value],
) -> Result<PathBuf, ScrapeError> {
    tokio::fs::create_dir_all(save_dir).await?;
    let path = save_dir.join(format!(
        "{}_{}.json",
        marketplace.slug(),
        sanitize_file_stem(collection)
    ));
    let body = serde_json::to_vec_pretty(items).map_err(|err| ScrapeError::Parse(err.to_string()))?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

/// Outcome of scraping one collection end to end.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub marketplace: Marketplace,
    pub collection: String,
    pub items: usize,
    pub metadata_path: Option<PathBuf>,
    pub downloads: DownloadReport,
}

/// Scrapes a collection, stores its listing JSON and downloads its images.
pub async fn download_collection_images(
    client: &MarketplaceClient,
    downloader: &ImageDownloader,
    marketplace: Marketplace,
    collection: &str,
    limit: usize,
) -> CollectionReport {
    let items = client.scrape_collection(marketplace, collection, limit).await;

    let metadata_path = if items.is_empty() {
        None
    } else {
        match write_collection_metadata(downloader.save_dir(), marketplace, collection, &items).await
        {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::error!("Error saving {marketplace} metadata for {collection}: {err}");
                None
            }
        }
    };

    let downloads = downloader
        .download_all(extract_image_refs(marketplace, &items))
        .await;

    CollectionReport {
        marketplace,
        collection: collection.to_string(),
        items: items.len(),
        metadata_path,
        downloads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opensea_refs_use_token_id() {
        let items = vec![
            json!({"token_id": "42", "image_url": "https://img/42.png"}),
            json!({"token_id": 7, "image_url": "https://img/7.png"}),
            json!({"token_id": "8", "image_url": null}),
        ];
        let refs = extract_image_refs(Marketplace::OpenSea, &items);
        assert_eq!(
            refs,
            vec![
                ImageRef {
                    url: "https://img/42.png".to_string(),
                    file_name: "opensea_42.png".to_string(),
                },
                ImageRef {
                    url: "https://img/7.png".to_string(),
                    file_name: "opensea_7.png".to_string(),
                },
            ]
        );
    }

    #[test]
    fn magiceden_refs_use_token_mint() {
        let items = vec![
            json!({"tokenMint": "Mint/../1", "image": "https://img/a"}),
            json!({"image": "https://img/b"}),
        ];
        let refs = extract_image_refs(Marketplace::MagicEden, &items);
        assert_eq!(refs[0].file_name, "magiceden_Mint_.._1.png");
        assert_eq!(refs[1].file_name, "magiceden_item1.png");
    }

    #[test]
    fn marketplace_parsing() {
        assert_eq!("OpenSea".parse::<Marketplace>().unwrap(), Marketplace::OpenSea);
        assert_eq!("magic-eden".parse::<Marketplace>().unwrap(), Marketplace::MagicEden);
        assert!("rarible".parse::<Marketplace>().is_err());
    }

    #[tokio::test]
    async fn collection_metadata_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![json!({"token_id": "1"})];
        let path = write_collection_metadata(dir.path(), Marketplace::OpenSea, "doodles-official", &items)
            .await
            .unwrap();
        assert!(path.ends_with("opensea_doodles-official.json"));
        let stored: Vec<Value> = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(stored, items);
    }
}
