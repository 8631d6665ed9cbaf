pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::path::PathBuf;
use std::sync::Arc;

use crate::app::auth::TokenService;
use crate::infra::{db::VideoStore, media::MediaTools, storage::ObjectStore, storage::PublicUrls};

#[derive(Clone)]
pub struct AppState {
    pub videos: Arc<dyn VideoStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub media: Arc<dyn MediaTools>,
    pub tokens: TokenService,
    pub public_urls: PublicUrls,
    pub upload_max_bytes: usize,
    pub upload_tmp_dir: PathBuf,
}
