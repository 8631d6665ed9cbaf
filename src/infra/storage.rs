use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use url::Url;

use crate::config::AppConfig;

/// Write side of the object store used by the upload pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the local file at `path` to `key`.
    async fn put_object(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder =
            aws_sdk_s3::config::Builder::from(&shared_config).region(shared_config.region().cloned());
        if let Some(endpoint) = &config.s3_endpoint {
            s3_builder = s3_builder
                .endpoint_url(endpoint.clone())
                .force_path_style(true);
        }
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for ObjectStorage {
    async fn put_object(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| anyhow!("failed to open {}: {}", path.display(), err))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await?;

        Ok(())
    }
}

/// How the public URL of a stored object is derived from its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicUrls {
    /// `{base}/{key}` behind a CDN distribution.
    Cdn { base: String },
    /// `{endpoint}/{bucket}/{key}` for path-style S3-compatible providers.
    Endpoint { endpoint: String, bucket: String },
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted { bucket: String, region: String },
}

impl PublicUrls {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        if let Some(cdn) = &config.cdn_base_url {
            return Ok(Self::Cdn {
                base: normalize_base(cdn)?,
            });
        }
        if let Some(endpoint) = &config.s3_public_endpoint {
            return Ok(Self::Endpoint {
                endpoint: normalize_base(endpoint)?,
                bucket: config.s3_bucket.clone(),
            });
        }
        Ok(Self::VirtualHosted {
            bucket: config.s3_bucket.clone(),
            region: config.s3_region.clone(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        match self {
            Self::Cdn { base } => format!("{}/{}", base, key),
            Self::Endpoint { endpoint, bucket } => format!("{}/{}/{}", endpoint, bucket, key),
            Self::VirtualHosted { bucket, region } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
            }
        }
    }
}

fn normalize_base(raw: &str) -> Result<String> {
    let url = if raw.contains("://") {
        Url::parse(raw)?
    } else {
        Url::parse(&format!("https://{}", raw))?
    };
    if url.host_str().is_none() {
        return Err(anyhow!("invalid public base url: {}", raw));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
