use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{is_unique_violation, ApiError},
    state::AppState,
};

use super::{dto::ImageResponse, repo::ProfileImage};

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/user/self/pic",
            post(upload_pic).get(get_pic).delete(delete_pic),
        )
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

fn has_allowed_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Blob key: one directory per user, original file name underneath.
fn object_key(user_id: Uuid, file_name: &str) -> String {
    format!("{}/{}", user_id, file_name)
}

fn reject_request_body(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_length = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if content_length > 0 {
        return Err(ApiError::UnexpectedBody);
    }
    Ok(())
}

struct UploadedFile {
    file_name: String,
    content_type: String,
    body: Bytes,
}

async fn read_profile_pic_field(mp: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("malformed multipart body"))?
    {
        if field.name() != Some("profilePic") {
            continue;
        }
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field
            .bytes()
            .await
            .map_err(|_| ApiError::Validation("malformed multipart body"))?;
        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            body,
        }));
    }
    Ok(None)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn upload_pic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<ImageResponse>), ApiError> {
    let file = read_profile_pic_field(&mut mp)
        .await?
        .ok_or(ApiError::Validation("profilePic file is required"))?;

    if !has_allowed_extension(&file.file_name) {
        warn!(file_name = %file.file_name, "rejected file type");
        return Err(ApiError::InvalidFileType);
    }

    if ProfileImage::find_by_user(&state.db, user.id).await?.is_some() {
        return Err(ApiError::ImageAlreadyExists);
    }

    let key = object_key(user.id, &file.file_name);
    state
        .storage
        .put_object(&key, file.body, &file.content_type)
        .await?;
    let url = state.storage.object_url(&key);

    // The UNIQUE(user_id) constraint closes the check-then-act window when
    // two uploads race; the loser's blob stays behind, same as a failed
    // insert after upload would.
    let image = match ProfileImage::create(&state.db, user.id, &file.file_name, &url).await {
        Ok(img) => img,
        Err(e) if is_unique_violation(&e) => return Err(ApiError::ImageAlreadyExists),
        Err(e) => return Err(ApiError::Internal(e)),
    };

    info!(user_id = %user.id, image_id = %image.id, "profile picture uploaded");
    Ok((StatusCode::CREATED, Json(image.into())))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_pic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
) -> Result<Json<ImageResponse>, ApiError> {
    reject_request_body(&headers)?;

    let image = ProfileImage::find_by_user(&state.db, user.id)
        .await?
        .ok_or(ApiError::NotFound("image"))?;
    Ok(Json(image.into()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn delete_pic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    reject_request_body(&headers)?;

    let image = ProfileImage::find_by_user(&state.db, user.id)
        .await?
        .ok_or(ApiError::NotFound("image"))?;

    // Blob first. When this fails the row stays, so retrying the delete
    // still sees the image instead of orphaning the blob silently.
    let key = object_key(user.id, &image.file_name);
    state.storage.delete_object(&key).await?;
    ProfileImage::delete(&state.db, image.id).await?;

    info!(user_id = %user.id, image_id = %image.id, "profile picture deleted");
    Ok(StatusCode::NO_CONTENT)
}
