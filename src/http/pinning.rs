use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::pinata::{MAX_PIN_FILE_BYTES, PinFile, PinataError};
use crate::state::AppState;

use super::HttpError;

const FILE_FIELD: &str = "file";
const DEFAULT_FILE_NAME: &str = "upload";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-to-pinata", post(upload_to_pinata))
        // Room for the multipart framing around the largest accepted file
        .layer(DefaultBodyLimit::max(MAX_PIN_FILE_BYTES + 64 * 1024))
}

async fn upload_to_pinata(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, HttpError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| HttpError::bad_request(err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| HttpError::bad_request(err.body_text()))?;
        upload = Some(PinFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let file = upload.ok_or_else(|| HttpError::bad_request("No file uploaded"))?;
    let pinned = state.pinata.pin_file(file).await.map_err(|err| match err {
        PinataError::InvalidUpload(message) => HttpError::bad_request(message),
        other => HttpError::internal(other),
    })?;

    Ok(Json(pinned))
}
