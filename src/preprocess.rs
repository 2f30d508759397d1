//! Training-set preprocessing: every raw PNG becomes a square RGB image.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_IMAGE_SIZE: u32 = 512;
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedImage {
    pub original_path: String,
    pub processed_path: String,
    pub size: [u32; 2],
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessReport {
    pub processed: Vec<ProcessedImage>,
    pub failed: Vec<PathBuf>,
    pub metadata_path: PathBuf,
}

pub struct Preprocessor {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    image_size: u32,
}

impl Preprocessor {
    pub fn new(
        raw_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        image_size: u32,
    ) -> Result<Self, PreprocessError> {
        assert!(image_size > 0, "Target image size must be positive");
        let processed_dir = processed_dir.into();
        fs::create_dir_all(&processed_dir).map_err(|source| PreprocessError::Io {
            path: processed_dir.clone(),
            source,
        })?;
        Ok(Self {
            raw_dir: raw_dir.into(),
            processed_dir,
            image_size,
        })
    }

    /// Processes every PNG in the raw directory and writes `metadata.json`.
    ///
    /// Images that fail to load or save are logged and left out.
    pub fn process_images(&self) -> Result<PreprocessReport, PreprocessError> {
        let sources = self.list_sources()?;
        info!(
            count = sources.len(),
            dir = %self.raw_dir.display(),
            "Processing images"
        );

        let mut report = PreprocessReport::default();
        for source in sources {
            match self.process_file(&source) {
                Ok(entry) => report.processed.push(entry),
                Err(err) => {
                    error!("Error processing {}: {err}", source.display());
                    report.failed.push(source);
                }
            }
        }

        let metadata_path = self.processed_dir.join(METADATA_FILE);
        let body = serde_json::to_vec_pretty(&report.processed)?;
        fs::write(&metadata_path, body).map_err(|source| PreprocessError::Io {
            path: metadata_path.clone(),
            source,
        })?;
        report.metadata_path = metadata_path;

        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Preprocessing finished"
        );
        Ok(report)
    }

    fn list_sources(&self) -> Result<Vec<PathBuf>, PreprocessError> {
        let entries = fs::read_dir(&self.raw_dir).map_err(|source| PreprocessError::Io {
            path: self.raw_dir.clone(),
            source,
        })?;
        let mut sources: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_png(path))
            .collect();
        sources.sort();
        Ok(sources)
    }

    fn process_file(&self, source: &Path) -> Result<ProcessedImage, PreprocessError> {
        let decoded = image::open(source)?;
        let processed = fit_to_square(&decoded, self.image_size);

        let file_name = source.file_name().unwrap_or_default();
        let output = self.processed_dir.join(file_name);
        processed.save_with_format(&output, ImageFormat::Png)?;

        Ok(ProcessedImage {
            original_path: source.display().to_string(),
            processed_path: output.display().to_string(),
            size: [processed.width(), processed.height()],
        })
    }
}

/// Scales the image to fit a `size`×`size` square, keeping its aspect ratio,
/// and centres it on a black canvas of exactly that size.
pub fn fit_to_square(source: &DynamicImage, size: u32) -> RgbImage {
    assert!(size > 0, "Target size must be positive");
    let rgb = source.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (new_width, new_height) = fitted_dimensions(width, height, size);

    let resized = imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3);
    if new_width == size && new_height == size {
        return resized;
    }

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    let x = centre_offset(new_width, size);
    let y = centre_offset(new_height, size);
    imageops::overlay(&mut canvas, &resized, x, y);
    canvas
}

/// Dimensions after scaling the longer side to `size`.
pub fn fitted_dimensions(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (size, size);
    }
    let aspect_ratio = f64::from(width) / f64::from(height);
    let (new_width, new_height) = if aspect_ratio > 1.0 {
        (size, (f64::from(size) / aspect_ratio) as u32)
    } else {
        ((f64::from(size) * aspect_ratio) as u32, size)
    };
    (new_width.max(1), new_height.max(1))
}

/// Offset of the resized image inside the canvas; rounds toward the
/// bottom/right like a floor-divided centre crop.
fn centre_offset(extent: u32, size: u32) -> i64 {
    -(i64::from(extent) - i64::from(size)).div_euclid(2)
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}
