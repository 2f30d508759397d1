use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;

use crate::metadata::{self, DEFAULT_COLLECTION_SIZE, MAX_COLLECTION_SIZE};
use crate::models::generation::{GenerateImageRequest, ModelListResponse, NftMetadataRequest};
use crate::state::{AppState, MODELS_CACHE_KEY};

use super::{ApiJson, HttpError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate-image", post(generate_image))
        .route("/list-models", get(list_models))
        .route("/generate-nft/metadata", post(generate_nft_metadata))
}

async fn generate_image(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateImageRequest>,
) -> Result<Response, HttpError> {
    let prompt = non_blank(request.prompt).ok_or_else(|| HttpError::bad_request("Prompt missing"))?;

    let image = state
        .llm
        .generate_image(&prompt)
        .await
        .map_err(|err| HttpError::internal(format!("Error while generating the image: {err}")))?;

    Ok(([(CONTENT_TYPE, "image/png")], image).into_response())
}

async fn list_models(State(state): State<AppState>) -> Result<Json<ModelListResponse>, HttpError> {
    if let Some(cached) = state.cache.models.get(MODELS_CACHE_KEY).await {
        return Ok(Json(ModelListResponse {
            models: (*cached).clone(),
        }));
    }

    let models = state
        .llm
        .list_models()
        .await
        .map_err(|err| HttpError::internal(format!("Error while getting models: {err}")))?;

    state
        .cache
        .models
        .insert(MODELS_CACHE_KEY.to_string(), Arc::new(models.clone()))
        .await;

    Ok(Json(ModelListResponse { models }))
}

async fn generate_nft_metadata(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NftMetadataRequest>,
) -> Result<Json<Vec<Value>>, HttpError> {
    let prompt =
        non_blank(request.prompt).ok_or_else(|| HttpError::bad_request("Prompt is required"))?;
    let number = request.number.unwrap_or(DEFAULT_COLLECTION_SIZE);
    if number == 0 || number > MAX_COLLECTION_SIZE {
        return Err(HttpError::bad_request(format!(
            "number must be between 1 and {MAX_COLLECTION_SIZE}"
        )));
    }

    let collection = metadata::generate_collection(&state.llm, &prompt, number)
        .await
        .map_err(HttpError::internal)?;

    info!(
        requested = number,
        generated = collection.len(),
        "Generated NFT metadata collection"
    );
    Ok(Json(collection))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
