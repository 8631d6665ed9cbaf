use axum::{
    extract::{multipart::MultipartError, FromRequestParts, Multipart, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use futures::TryStreamExt;
use serde::Serialize;
use uuid::Uuid;

use crate::app::videos::{UploadError, VideoService};
use crate::domain::video::Video;
use crate::http::{AppError, AuthUser};
use crate::AppState;

/// Multipart field carrying the uploaded file.
pub const VIDEO_FIELD: &str = "video";

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

/// `:video_id` path segment, rejected with a JSON 400 when it is not a UUID.
pub struct VideoIdParam(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for VideoIdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::from(&UploadError::InvalidVideoId))?;
        Uuid::parse_str(&raw)
            .map(VideoIdParam)
            .map_err(|_| AppError::from(&UploadError::InvalidVideoId))
    }
}

fn video_service(state: &AppState) -> VideoService {
    VideoService::new(
        state.videos.clone(),
        state.storage.clone(),
        state.media.clone(),
        state.public_urls.clone(),
        state.upload_tmp_dir.clone(),
    )
}

fn reject(err: UploadError, video_id: Uuid, user_id: Uuid) -> AppError {
    let app_error = AppError::from(&err);
    if app_error.status().is_server_error() {
        tracing::error!(error = ?err, %video_id, %user_id, "video upload failed");
    } else {
        tracing::warn!(error = %err, %video_id, %user_id, "video upload rejected");
    }
    app_error
}

fn form_error(err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::PayloadTooLarge
    } else {
        UploadError::MalformedForm(err.body_text())
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.videos.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

pub async fn get_video(
    VideoIdParam(video_id): VideoIdParam,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Video>, AppError> {
    let video = video_service(&state)
        .owned_video(video_id, auth.user_id)
        .await
        .map_err(|err| reject(err, video_id, auth.user_id))?;

    Ok(Json(video))
}

pub async fn upload_video(
    VideoIdParam(video_id): VideoIdParam,
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let service = video_service(&state);

    let video = service
        .owned_video(video_id, auth.user_id)
        .await
        .map_err(|err| reject(err, video_id, auth.user_id))?;

    let video = upload_from_form(&service, video, &mut multipart)
        .await
        .map_err(|err| reject(err, video_id, auth.user_id))?;

    Ok(Json(video))
}

async fn upload_from_form(
    service: &VideoService,
    video: Video,
    multipart: &mut Multipart,
) -> Result<Video, UploadError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(form_error)?
            .ok_or(UploadError::MissingVideoField)?;
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        return service
            .upload(video, &content_type, field.map_err(form_error))
            .await;
    }
}
