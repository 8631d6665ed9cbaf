#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use tubely::app::auth::TokenService;
use tubely::domain::aspect::VideoGeometry;
use tubely::domain::video::Video;
use tubely::infra::db::VideoStore;
use tubely::infra::media::{fast_start_path, MediaTools};
use tubely::infra::storage::{ObjectStore, PublicUrls};
use tubely::http::VIDEO_FIELD;
use tubely::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (test-only key)
const TEST_TOKEN_SECRET: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
pub const TEST_BUCKET: &str = "tubely-test";
pub const TEST_REGION: &str = "us-east-1";
pub const FAST_START_MARKER: &[u8] = b"faststart:";
pub const MULTIPART_BOUNDARY: &str = "tubely-test-boundary";

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeVideoStore {
    pub videos: Mutex<HashMap<Uuid, Video>>,
    pub fail_reads: bool,
    pub fail_updates: bool,
}

impl FakeVideoStore {
    pub fn insert(&self, owner_id: Uuid) -> Video {
        let now = OffsetDateTime::now_utc();
        let video = Video {
            id: Uuid::new_v4(),
            user_id: owner_id,
            title: "boots".to_string(),
            description: Some("a video about boots".to_string()),
            video_url: None,
            created_at: now,
            updated_at: now,
        };
        self.videos
            .lock()
            .unwrap()
            .insert(video.id, video.clone());
        video
    }

    pub fn get(&self, id: Uuid) -> Option<Video> {
        self.videos.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl VideoStore for FakeVideoStore {
    async fn get_video(&self, id: Uuid) -> Result<Option<Video>> {
        if self.fail_reads {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.get(id))
    }

    async fn update_video(&self, video: &Video) -> Result<Video> {
        if self.fail_updates {
            return Err(anyhow!("connection reset"));
        }
        let mut videos = self.videos.lock().unwrap();
        let stored = videos
            .get_mut(&video.id)
            .ok_or_else(|| anyhow!("no rows returned"))?;
        stored.title = video.title.clone();
        stored.description = video.description.clone();
        stored.video_url = video.video_url.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_reads {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct FakeObjectStore {
    pub objects: Mutex<Vec<StoredObject>>,
    pub fail_puts: bool,
}

impl FakeObjectStore {
    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_object(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        if self.fail_puts {
            return Err(anyhow!("service unavailable"));
        }
        let bytes = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(())
    }
}

/// Stands in for ffprobe/ffmpeg. The "rewrite" prefixes the staged bytes
/// with [`FAST_START_MARKER`].
pub struct FakeMediaTools {
    pub geometry: Option<(u32, u32)>,
    pub fail_rewrite: bool,
    pub probed: Mutex<Vec<PathBuf>>,
    pub rewritten: Mutex<Vec<PathBuf>>,
}

impl FakeMediaTools {
    pub fn with_geometry(width: u32, height: u32) -> Self {
        Self {
            geometry: Some((width, height)),
            fail_rewrite: false,
            probed: Mutex::new(Vec::new()),
            rewritten: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_probe() -> Self {
        Self {
            geometry: None,
            ..Self::with_geometry(1, 1)
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaTools for FakeMediaTools {
    async fn probe(&self, path: &Path) -> Result<VideoGeometry> {
        assert!(path.exists(), "probe ran against a missing file");
        self.probed.lock().unwrap().push(path.to_path_buf());
        let (width, height) = self
            .geometry
            .ok_or_else(|| anyhow!("ffprobe exited with exit status: 1: moov atom not found"))?;
        VideoGeometry::new(width, height).ok_or_else(|| anyhow!("no usable geometry"))
    }

    async fn rewrite_fast_start(&self, path: &Path) -> Result<PathBuf> {
        let output = fast_start_path(path);
        self.rewritten.lock().unwrap().push(output.clone());
        if self.fail_rewrite {
            // ffmpeg leaves a truncated output behind when it dies mid-write
            tokio::fs::write(&output, b"partial").await?;
            return Err(anyhow!("ffmpeg exited with exit status: 1, output: Invalid data"));
        }
        let mut data = FAST_START_MARKER.to_vec();
        data.extend(tokio::fs::read(path).await?);
        tokio::fs::write(&output, data).await?;
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// TestApp
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub videos: Arc<FakeVideoStore>,
    pub storage: Arc<FakeObjectStore>,
    pub media: Arc<FakeMediaTools>,
    pub tmp_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub access_token: String,
}

/// A fresh app whose media tools report a 1280x720 stream.
pub fn app() -> TestApp {
    TestAppBuilder::default().build()
}

pub struct TestAppBuilder {
    pub videos: FakeVideoStore,
    pub storage: FakeObjectStore,
    pub media: FakeMediaTools,
    pub public_urls: Option<PublicUrls>,
    pub upload_max_bytes: usize,
    /// Overrides the per-test staging directory.
    pub staging_dir: Option<PathBuf>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            videos: FakeVideoStore::default(),
            storage: FakeObjectStore::default(),
            media: FakeMediaTools::with_geometry(1280, 720),
            public_urls: None,
            upload_max_bytes: 1 << 30,
            staging_dir: None,
        }
    }
}

impl TestAppBuilder {
    pub fn build(self) -> TestApp {
        let tmp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let videos = Arc::new(self.videos);
        let storage = Arc::new(self.storage);
        let media = Arc::new(self.media);

        let state = AppState {
            videos: videos.clone(),
            storage: storage.clone(),
            media: media.clone(),
            tokens: TokenService::new(TEST_TOKEN_SECRET, 15),
            public_urls: self.public_urls.unwrap_or(PublicUrls::VirtualHosted {
                bucket: TEST_BUCKET.to_string(),
                region: TEST_REGION.to_string(),
            }),
            upload_max_bytes: self.upload_max_bytes,
            upload_tmp_dir: self
                .staging_dir
                .unwrap_or_else(|| tmp_dir.path().to_path_buf()),
        };

        let router = tubely::http::router(state.clone());

        TestApp {
            router,
            state,
            videos,
            storage,
            media,
            tmp_dir,
        }
    }
}

impl TestApp {
    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    /// POST a single-file multipart form to the upload endpoint.
    pub async fn upload(
        &self,
        video_id: &str,
        form: MultipartForm,
        token: Option<&str>,
    ) -> TestResponse {
        let body = form.encode();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/video_upload/{}", video_id))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .header("content-length", body.len().to_string());
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        self.request(builder.body(Body::from(body)).unwrap()).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    pub fn create_user(&self) -> TestUser {
        let id = Uuid::new_v4();
        let access_token = self
            .state
            .tokens
            .issue_access_token(id)
            .expect("issue_access_token failed")
            .token;
        TestUser { id, access_token }
    }

    pub fn create_video(&self, owner_id: Uuid) -> Video {
        self.videos.insert(owner_id)
    }

    /// Files left in the staging directory.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.tmp_dir.path())
            .expect("cannot read temp dir")
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Multipart bodies
// ---------------------------------------------------------------------------

pub struct MultipartForm {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartForm {
    pub fn mp4(data: &[u8]) -> Self {
        Self {
            field: VIDEO_FIELD.to_string(),
            file_name: "boots.mp4".to_string(),
            content_type: Some("video/mp4".to_string()),
            data: data.to_vec(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                self.field, self.file_name
            )
            .as_bytes(),
        );
        if let Some(content_type) = &self.content_type {
            body.extend(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend(b"\r\n");
        body.extend(&self.data);
        body.extend(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
        body
    }
}
