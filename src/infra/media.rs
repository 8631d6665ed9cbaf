use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::AppConfig;
use crate::domain::aspect::VideoGeometry;

pub const FAST_START_SUFFIX: &str = ".processing";

/// External media tooling the upload pipeline depends on.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Frame size of the first stream in the file.
    async fn probe(&self, path: &Path) -> Result<VideoGeometry>;

    /// Copies `path` to `path` + [`FAST_START_SUFFIX`] with the moov atom
    /// moved to the front. The caller owns (and must remove) the new file.
    async fn rewrite_fast_start(&self, path: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: u32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub display_aspect_ratio: Option<String>,
    pub duration: Option<String>,
}

impl ProbeOutput {
    pub fn parse(stdout: &[u8]) -> Result<Self> {
        serde_json::from_slice(stdout).context("failed to parse ffprobe output")
    }

    pub fn first_stream_geometry(&self) -> Result<VideoGeometry> {
        let stream = self
            .streams
            .first()
            .ok_or_else(|| anyhow!("ffprobe reported no streams"))?;

        let width = stream.width.unwrap_or_default();
        let height = stream.height.unwrap_or_default();
        VideoGeometry::new(width, height).ok_or_else(|| {
            anyhow!(
                "stream {} has no usable geometry ({}x{})",
                stream.index,
                width,
                height
            )
        })
    }
}

/// [`MediaTools`] backed by the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffprobe_bin: String,
    ffmpeg_bin: String,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(ffprobe_bin: impl Into<String>, ffmpeg_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
            ffmpeg_bin: ffmpeg_bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ffprobe_bin.clone(),
            config.ffmpeg_bin.clone(),
            Duration::from_secs(config.media_tool_timeout_seconds),
        )
    }

    async fn run(&self, program: &str, mut command: Command) -> Result<Output> {
        // Dropping the request future must not leave the child running.
        command.kill_on_drop(true);
        tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("{} timed out after {}s", program, self.timeout.as_secs()))?
            .with_context(|| format!("failed to execute {}", program))
    }
}

#[async_trait]
impl MediaTools for Ffmpeg {
    async fn probe(&self, path: &Path) -> Result<VideoGeometry> {
        let mut command = Command::new(&self.ffprobe_bin);
        command
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path);

        let output = self.run(&self.ffprobe_bin, command).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let geometry = ProbeOutput::parse(&output.stdout)?.first_stream_geometry()?;
        debug!(
            path = %path.display(),
            width = geometry.width(),
            height = geometry.height(),
            "probed video"
        );
        Ok(geometry)
    }

    async fn rewrite_fast_start(&self, path: &Path) -> Result<PathBuf> {
        let output_path = fast_start_path(path);

        let mut command = Command::new(&self.ffmpeg_bin);
        command
            .arg("-i")
            .arg(path)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(&output_path);

        let output = self.run(&self.ffmpeg_bin, command).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg exited with {}, output: {}{}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        Ok(output_path)
    }
}

pub fn fast_start_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(FAST_START_SUFFIX);
    PathBuf::from(name)
}
