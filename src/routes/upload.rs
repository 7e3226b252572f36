use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use image::ImageFormat;

use crate::app_state::AppState;
use crate::models::diagnosis::UploadResponse;
use crate::routes::ApiError;
use crate::services::storage::object_key;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// POST /api/v1/upload: store an image and return its public URL.
///
/// The declared content type is checked before the body is read, and the
/// bytes must also sniff as JPEG or PNG.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let limit = state.max_upload_bytes;
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some("file") {
            continue;
        }

        let original_filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::UnsupportedMediaType(format!(
                "unsupported file type '{content_type}'; allowed: {}",
                ALLOWED_CONTENT_TYPES.join(", ")
            )));
        }

        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if data.is_empty() {
            return Err(ApiError::EmptyPayload);
        }
        if data.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        match image::guess_format(&data) {
            Ok(ImageFormat::Jpeg | ImageFormat::Png) => {}
            _ => {
                return Err(ApiError::UnsupportedMediaType(
                    "file content is not a JPEG or PNG image".to_string(),
                ))
            }
        }

        let key = object_key(&original_filename);
        state
            .storage
            .put(&key, &data, &content_type)
            .await
            .map_err(|e| ApiError::StorageUnavailable(e.to_string()))?;

        metrics::counter!("image_uploads_total").increment(1);
        tracing::info!(
            key = %key,
            bytes = data.len(),
            content_type = %content_type,
            "Image uploaded"
        );

        return Ok(Json(UploadResponse {
            url: state.storage.public_url(&key),
            filename: key,
            original_filename,
            content_type,
        }));
    }

    Err(ApiError::BadRequest("missing multipart field 'file'".to_string()))
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
