//! Pinata IPFS pinning client.

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::PinataConfig;

const PIN_FILE_PATH: &str = "pinning/pinFileToIPFS";
pub const MAX_PIN_FILE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PinataError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Pinata error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// A file received from a client, ready to be forwarded.
#[derive(Debug, Clone)]
pub struct PinFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PinataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl PinataClient {
    pub fn new(config: &PinataConfig) -> Result<Self, PinataError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Pins one file and returns Pinata's JSON response untouched.
    pub async fn pin_file(&self, file: PinFile) -> Result<Value, PinataError> {
        if file.bytes.is_empty() {
            return Err(PinataError::InvalidUpload("file is empty".to_string()));
        }
        if file.bytes.len() > MAX_PIN_FILE_BYTES {
            return Err(PinataError::InvalidUpload(format!(
                "file exceeds {MAX_PIN_FILE_BYTES} bytes"
            )));
        }

        let size = file.bytes.len();
        let file_name = file.file_name.clone();
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|err| PinataError::InvalidUpload(err.to_string()))?;
        }
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, PIN_FILE_PATH))
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.api_secret)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PinataError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let pinned: Value =
            serde_json::from_slice(&body).map_err(|err| PinataError::Parse(err.to_string()))?;
        let cid = pinned
            .get("IpfsHash")
            .and_then(|hash| hash.as_str())
            .unwrap_or("unknown");
        info!(
            file = %file_name,
            bytes = size,
            cid = %cid,
            "Pinned file to IPFS"
        );
        Ok(pinned)
    }
}
