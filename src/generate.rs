//! Prompt-driven NFT image generation on top of an [`ImageBackend`].

use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::llm::{ImageBackend, LlmError};

pub const GENERATION_METADATA_FILE: &str = "generation_metadata.json";

const STYLE_PREFIX: &str = "high quality NFT art piece, digital art, ";
const STYLE_SUFFIX: &str =
    ", trending on artstation, detailed, vibrant colors, professional, collectible";
const BASE_NEGATIVE_PROMPT: &str =
    "blurry, low quality, low resolution, pixelated, watermark, signature, poorly drawn, ";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Generation API error: {0}")]
    Llm(#[from] LlmError),

    #[error("Generated payload is not an image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

pub fn enhance_prompt(prompt: &str) -> String {
    format!("{STYLE_PREFIX}{prompt}{STYLE_SUFFIX}")
}

pub fn enhance_negative_prompt(negative_prompt: Option<&str>) -> String {
    match negative_prompt.filter(|text| !text.is_empty()) {
        Some(extra) => format!("{BASE_NEGATIVE_PROMPT}, {extra}"),
        None => BASE_NEGATIVE_PROMPT.to_string(),
    }
}

/// Image APIs take a single prompt, so the negative list rides along in it.
fn compose_prompt(prompt: &str, negative_prompt: Option<&str>) -> String {
    format!(
        "{}\n\nAvoid: {}",
        enhance_prompt(prompt),
        enhance_negative_prompt(negative_prompt)
    )
}

/// Reads a batch file: one prompt per non-blank line, trimmed.
pub fn parse_prompts(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub status: GenerationStatus,
}

pub struct BatchGenerator<B> {
    backend: B,
    output_dir: PathBuf,
}

impl<B: ImageBackend> BatchGenerator<B> {
    pub fn new(backend: B, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generates `num_images` images for one prompt as `generated_<n>.png`.
    pub async fn generate(
        &self,
        prompt: &str,
        negative_prompt: Option<&str>,
        num_images: usize,
    ) -> Result<Vec<PathBuf>, GenerateError> {
        self.prepare_output_dir().await?;
        self.generate_into(prompt, negative_prompt, num_images, |img_idx| {
            format!("generated_{img_idx}.png")
        })
        .await
    }

    /// Generates images for every prompt, recording per-prompt outcomes in
    /// `generation_metadata.json`. A failed prompt never stops the batch.
    pub async fn batch_generate(
        &self,
        prompts: &[String],
        num_images: usize,
    ) -> Result<Vec<GenerationRecord>, GenerateError> {
        self.prepare_output_dir().await?;
        info!(prompts = prompts.len(), num_images, "Generating NFTs");

        let mut records = Vec::with_capacity(prompts.len());
        for (idx, prompt) in prompts.iter().enumerate() {
            let outcome = self
                .generate_into(prompt, None, num_images, |img_idx| {
                    format!("{idx}_{img_idx}.png")
                })
                .await;
            let record = match outcome {
                Ok(paths) => GenerationRecord {
                    prompt: prompt.clone(),
                    images: Some(paths.iter().map(|path| path.display().to_string()).collect()),
                    error: None,
                    status: GenerationStatus::Success,
                },
                Err(err) => {
                    error!("Error generating NFT for prompt '{prompt}': {err}");
                    GenerationRecord {
                        prompt: prompt.clone(),
                        images: None,
                        error: Some(err.to_string()),
                        status: GenerationStatus::Failed,
                    }
                }
            };
            records.push(record);
        }

        let metadata_path = self.output_dir.join(GENERATION_METADATA_FILE);
        let body = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(&metadata_path, body)
            .await
            .map_err(|source| GenerateError::Io {
                path: metadata_path,
                source,
            })?;

        Ok(records)
    }

    async fn generate_into(
        &self,
        prompt: &str,
        negative_prompt: Option<&str>,
        num_images: usize,
        file_name: impl Fn(usize) -> String,
    ) -> Result<Vec<PathBuf>, GenerateError> {
        assert!(num_images > 0, "At least one image per prompt");
        let full_prompt = compose_prompt(prompt, negative_prompt);
        info!("Generating image(s) with prompt: {}", enhance_prompt(prompt));

        let mut paths = Vec::with_capacity(num_images);
        for img_idx in 0..num_images {
            let bytes = self.backend.generate_image(&full_prompt).await?;
            let path = self.output_dir.join(file_name(img_idx));
            save_png(bytes, path.clone()).await?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn prepare_output_dir(&self) -> Result<(), GenerateError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| GenerateError::Io {
                path: self.output_dir.clone(),
                source,
            })
    }
}

async fn save_png(bytes: Vec<u8>, path: PathBuf) -> Result<(), GenerateError> {
    tokio::task::spawn_blocking(move || -> Result<(), GenerateError> {
        let decoded = image::load_from_memory(&bytes)?;
        decoded.save_with_format(&path, ImageFormat::Png)?;
        Ok(())
    })
    .await
    .map_err(|err| GenerateError::Task(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use image::{DynamicImage, Rgb, RgbImage};

    use super::*;

    struct FakeBackend {
        prompts: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImageBackend for FakeBackend {
        async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("broken") {
                return Err(LlmError::Api {
                    status: 500,
                    body: "upstream down".to_string(),
                });
            }
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
            let mut bytes = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .unwrap();
            Ok(bytes)
        }
    }

    #[test]
    fn prompts_get_nft_styling() {
        assert_eq!(
            enhance_prompt("a cosmic whale"),
            "high quality NFT art piece, digital art, a cosmic whale, trending on artstation, \
             detailed, vibrant colors, professional, collectible"
        );
        assert_eq!(enhance_negative_prompt(None), BASE_NEGATIVE_PROMPT);
        assert!(enhance_negative_prompt(Some("text")).ends_with("poorly drawn, , text"));
    }

    #[test]
    fn batch_file_skips_blank_lines() {
        let prompts = parse_prompts("  a dragon \n\n\t\nphoenix\n");
        assert_eq!(prompts, vec!["a dragon".to_string(), "phoenix".to_string()]);
    }

    #[tokio::test]
    async fn batch_records_successes_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let generator = BatchGenerator::new(FakeBackend::new(), dir.path());
        let prompts = vec!["a whale".to_string(), "broken dragon".to_string()];

        let records = generator.batch_generate(&prompts, 2).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, GenerationStatus::Success);
        assert_eq!(records[0].images.as_ref().map(Vec::len), Some(2));
        assert!(dir.path().join("0_0.png").exists());
        assert!(dir.path().join("0_1.png").exists());
        assert_eq!(records[1].status, GenerationStatus::Failed);
        assert!(records[1].error.as_deref().unwrap().contains("upstream down"));
        assert!(!dir.path().join("1_0.png").exists());

        let stored: Vec<GenerationRecord> = serde_json::from_slice(
            &std::fs::read(dir.path().join(GENERATION_METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(stored, records);

        let sent = generator.backend.prompts.lock().unwrap().clone();
        assert!(sent[0].starts_with(STYLE_PREFIX));
        assert!(sent[0].contains("\n\nAvoid: blurry"));
    }

    #[tokio::test]
    async fn single_prompt_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let generator = BatchGenerator::new(FakeBackend::new(), dir.path().join("out"));

        let paths = generator
            .generate("a golden dragon", Some("text"), 1)
            .await
            .unwrap();

        assert_eq!(paths, vec![dir.path().join("out").join("generated_0.png")]);
        let sent = generator.backend.prompts.lock().unwrap().clone();
        assert!(sent[0].ends_with(", text"));
    }
}
