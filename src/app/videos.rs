use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::storage_key::StorageKey;
use crate::domain::video::Video;
use crate::infra::db::VideoStore;
use crate::infra::media::{fast_start_path, MediaTools};
use crate::infra::storage::{ObjectStore, PublicUrls};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid video id")]
    InvalidVideoId,
    #[error("video not found")]
    VideoNotFound,
    #[error("user not authorized")]
    Unauthorized,
    #[error("unsupported content type {0:?}, only video/mp4 is allowed")]
    UnsupportedContentType(String),
    #[error("malformed multipart form: {0}")]
    MalformedForm(String),
    #[error("missing video file field")]
    MissingVideoField,
    #[error("upload exceeds max size")]
    PayloadTooLarge,
    #[error("failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
    #[error("failed to generate storage key: {0}")]
    KeyGeneration(#[source] rand::Error),
    #[error("failed to probe video: {0:#}")]
    Probe(anyhow::Error),
    #[error("failed to rewrite video for fast start: {0:#}")]
    FastStart(anyhow::Error),
    #[error("failed to upload video: {0:#}")]
    Storage(anyhow::Error),
    #[error("failed to load video: {0:#}")]
    Lookup(anyhow::Error),
    #[error("failed to persist video: {0:#}")]
    Persistence(anyhow::Error),
}

#[derive(Clone)]
pub struct VideoService {
    videos: Arc<dyn VideoStore>,
    storage: Arc<dyn ObjectStore>,
    media: Arc<dyn MediaTools>,
    public_urls: PublicUrls,
    tmp_dir: PathBuf,
}

impl VideoService {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        storage: Arc<dyn ObjectStore>,
        media: Arc<dyn MediaTools>,
        public_urls: PublicUrls,
        tmp_dir: PathBuf,
    ) -> Self {
        Self {
            videos,
            storage,
            media,
            public_urls,
            tmp_dir,
        }
    }

    /// Loads a video and checks that `user_id` owns it.
    pub async fn owned_video(&self, video_id: Uuid, user_id: Uuid) -> Result<Video, UploadError> {
        let video = self
            .videos
            .get_video(video_id)
            .await
            .map_err(UploadError::Lookup)?
            .ok_or(UploadError::VideoNotFound)?;

        if !video.is_owned_by(user_id) {
            return Err(UploadError::Unauthorized);
        }
        Ok(video)
    }

    /// Stages `body`, derives its storage key from the probed geometry,
    /// rewrites it for fast start, stores it and records the public URL on
    /// `video`.
    ///
    /// Nothing is rolled back on failure: if persisting the URL fails the
    /// stored object is left behind.
    pub async fn upload<S>(
        &self,
        mut video: Video,
        content_type: &str,
        body: S,
    ) -> Result<Video, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>>,
    {
        let extension = mp4_extension(content_type)?;

        let staged = self.stage(body).await?;

        let geometry = self
            .media
            .probe(staged.path())
            .await
            .map_err(UploadError::Probe)?;
        let orientation = geometry.orientation();
        let key =
            StorageKey::generate(orientation, extension).map_err(UploadError::KeyGeneration)?;
        debug!(
            video_id = %video.id,
            width = geometry.width(),
            height = geometry.height(),
            %orientation,
            object_key = %key,
            "derived storage key"
        );

        // Guard the output path before ffmpeg runs so a partial file from a
        // failed rewrite is removed too.
        let pending = TempPath::from_path(fast_start_path(staged.path()));
        let processed = self
            .media
            .rewrite_fast_start(staged.path())
            .await
            .map_err(UploadError::FastStart)?;
        let processed = if processed.as_path() == &*pending {
            pending
        } else {
            TempPath::from_path(processed)
        };

        self.storage
            .put_object(key.as_str(), &processed, content_type)
            .await
            .map_err(UploadError::Storage)?;

        video.video_url = Some(self.public_urls.url_for(key.as_str()));
        let updated = self.videos.update_video(&video).await.map_err(|err| {
            warn!(video_id = %video.id, object_key = %key, "stored object left without a record");
            UploadError::Persistence(err)
        })?;

        info!(
            video_id = %updated.id,
            user_id = %updated.user_id,
            object_key = %key,
            "video uploaded"
        );
        Ok(updated)
    }

    async fn stage<S>(&self, body: S) -> Result<NamedTempFile, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>>,
    {
        pin_mut!(body);

        let tmp_dir = self.tmp_dir.clone();
        let (staged, handle) = tokio::task::spawn_blocking(move || {
            let staged = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(".mp4")
                .tempfile_in(&tmp_dir)?;
            let handle = staged.as_file().try_clone()?;
            Ok::<_, std::io::Error>((staged, handle))
        })
        .await
        .map_err(|err| UploadError::Staging(std::io::Error::other(err)))?
        .map_err(UploadError::Staging)?;
        let mut file = tokio::fs::File::from_std(handle);

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(UploadError::Staging)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(UploadError::Staging)?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(UploadError::Staging)?;

        debug!(path = %staged.path().display(), bytes = written, "staged upload");
        Ok(staged)
    }
}

/// Media type of a `Content-Type` value with parameters stripped, lowercased.
pub fn media_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    Some(essence)
}

fn mp4_extension(content_type: &str) -> Result<&'static str, UploadError> {
    match media_type(content_type).as_deref() {
        Some(VIDEO_CONTENT_TYPE) => Ok("mp4"),
        _ => Err(UploadError::UnsupportedContentType(content_type.to_string())),
    }
}
