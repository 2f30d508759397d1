use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use image::ImageFormat;
use tracing::{debug, error, info};

use super::{ImageRef, ScrapeError};

pub const DEFAULT_WORKERS: usize = 5;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<String>,
}

impl DownloadReport {
    pub fn attempted(&self) -> usize {
        self.saved.len() + self.failed.len()
    }
}

/// Fetches images with at most `workers` downloads in flight.
#[derive(Clone)]
pub struct ImageDownloader {
    http: reqwest::Client,
    save_dir: PathBuf,
    workers: usize,
}

impl ImageDownloader {
    pub fn new(save_dir: impl Into<PathBuf>, workers: usize) -> Result<Self, ScrapeError> {
        assert!(workers > 0, "Download pool needs at least one worker");
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            save_dir: save_dir.into(),
            workers,
        })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Runs every job to completion. Failures are logged and reported, never fatal.
    pub async fn download_all(&self, images: Vec<ImageRef>) -> DownloadReport {
        if let Err(err) = tokio::fs::create_dir_all(&self.save_dir).await {
            error!(
                "Cannot create {}: {err}; skipping {} downloads",
                self.save_dir.display(),
                images.len()
            );
            return DownloadReport {
                saved: Vec::new(),
                failed: images.into_iter().map(|image| image.url).collect(),
            };
        }

        let outcomes: Vec<(ImageRef, Result<PathBuf, ScrapeError>)> = stream::iter(images)
            .map(|image| async move {
                let outcome = self.download_one(&image).await;
                (image, outcome)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = DownloadReport::default();
        for (image, outcome) in outcomes {
            match outcome {
                Ok(path) => report.saved.push(path),
                Err(err) => {
                    error!("Error downloading {}: {err}", image.url);
                    report.failed.push(image.url);
                }
            }
        }
        report.saved.sort();

        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            dir = %self.save_dir.display(),
            "Image downloads finished"
        );
        report
    }

    async fn download_one(&self, image: &ImageRef) -> Result<PathBuf, ScrapeError> {
        let response = self.http.get(&image.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: image.url.clone(),
            });
        }
        let bytes = response.bytes().await?;
        debug!(url = %image.url, bytes = bytes.len(), "Fetched image");

        let path = self.save_dir.join(&image.file_name);
        let target = path.clone();
        // Decoding proves the payload is an image; it is re-encoded as PNG
        tokio::task::spawn_blocking(move || -> Result<(), ScrapeError> {
            let decoded = image::load_from_memory(&bytes)?;
            decoded.save_with_format(&target, ImageFormat::Png)?;
            Ok(())
        })
        .await
        .map_err(|err| ScrapeError::Task(err.to_string()))??;

        Ok(path)
    }
}
