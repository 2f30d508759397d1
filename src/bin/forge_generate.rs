//! Generates NFT-style images for one prompt or a batch file of prompts.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use forge_api::config::LlmConfig;
use forge_api::generate::{BatchGenerator, GenerationStatus, parse_prompts};
use forge_api::llm::LlmClient;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "forge-generate")]
#[command(about = "Generate NFT-style images through the image API")]
#[command(version)]
#[command(group(ArgGroup::new("input").required(true).args(["prompt", "batch_file"])))]
struct Args {
    /// Prompt for a single generation
    #[arg(long)]
    prompt: Option<String>,

    /// File with one prompt per line
    #[arg(long)]
    batch_file: Option<PathBuf>,

    /// Things the image should avoid (single prompt only)
    #[arg(long)]
    negative_prompt: Option<String>,

    #[arg(long, default_value = "data/generated")]
    output_dir: PathBuf,

    /// Images per prompt
    #[arg(long, default_value_t = 1)]
    num_images: usize,

    #[arg(long, env = "FORGE_LLM_BASE_URL", default_value = "https://api.x.ai/v1")]
    base_url: String,

    #[arg(long, env = "FORGE_LLM_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    #[arg(long, env = "FORGE_IMAGE_MODEL", default_value = "grok-2-vision-1212")]
    image_model: String,

    #[arg(long, env = "FORGE_IMAGE_SIZE", default_value = "256x256")]
    image_size: String,

    /// Minimum spacing between API calls
    #[arg(long, default_value_t = 1_000)]
    min_request_interval_ms: u64,
}

impl Args {
    fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            chat_model: String::new(),
            image_model: self.image_model.clone(),
            image_size: self.image_size.clone(),
            request_timeout_ms: 120_000,
            min_request_interval_ms: self.min_request_interval_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    forge_api::init_tracing();
    let args = Args::parse();
    if args.num_images == 0 {
        bail!("--num-images must be positive");
    }
    if args.base_url.trim().is_empty() {
        bail!("An image API base URL is required");
    }

    let client = LlmClient::new(&args.llm_config()).context("Failed to build image API client")?;
    let generator = BatchGenerator::new(client, &args.output_dir);

    if let Some(prompt) = args.prompt.as_deref() {
        let paths = generator
            .generate(prompt, args.negative_prompt.as_deref(), args.num_images)
            .await
            .context("Image generation failed")?;
        info!(images = paths.len(), dir = %generator.output_dir().display(), "Saved images");
        return Ok(());
    }

    let Some(batch_file) = args.batch_file.as_ref() else {
        bail!("Provide either --prompt or --batch-file");
    };
    let contents = tokio::fs::read_to_string(batch_file)
        .await
        .with_context(|| format!("Failed to read {}", batch_file.display()))?;
    let prompts = parse_prompts(&contents);
    if prompts.is_empty() {
        bail!("{} contains no prompts", batch_file.display());
    }

    let records = generator
        .batch_generate(&prompts, args.num_images)
        .await
        .context("Batch generation failed")?;
    let succeeded = records
        .iter()
        .filter(|record| record.status == GenerationStatus::Success)
        .count();
    info!(
        prompts = records.len(),
        succeeded,
        failed = records.len() - succeeded,
        "Batch generation finished"
    );
    Ok(())
}
