//! Lazy resolution of file descriptors to bytes.

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::config::MediaConfig;
use super::types::FileDescriptor;
use crate::surface::NativeFile;

/// Errors from fetching a single asset.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("unsupported content reference: {0}")]
    UnsupportedScheme(String),

    #[error("invalid content reference: {0}")]
    InvalidReference(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read file: {0}")]
    Io(String),
}

/// Materializes a [`FileDescriptor`] into a [`NativeFile`].
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &FileDescriptor) -> Result<NativeFile, FetchError>;
}

/// Fetcher for `http(s)://`, `data:` and `file://` references.
pub struct HttpFileFetcher {
    client: reqwest::Client,
}

impl HttpFileFetcher {
    pub fn new(config: &MediaConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_file(url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::InvalidReference(url.to_string()))?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {}", path.display(), e)))
    }
}

/// Decode a `data:` URL, returning the declared MIME type and the payload.
pub fn decode_data_url(reference: &str) -> Result<(Option<String>, Vec<u8>), FetchError> {
    let rest = reference
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidReference(reference.to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidReference("data URL without payload".to_string()))?;

    let is_base64 = meta.ends_with(";base64");
    let mime = meta.trim_end_matches(";base64").split(';').next().unwrap_or("");
    let mime = (!mime.is_empty()).then(|| mime.to_string());

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| FetchError::InvalidReference(format!("bad base64 payload: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok((mime, bytes))
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn fetch(&self, descriptor: &FileDescriptor) -> Result<NativeFile, FetchError> {
        let reference = descriptor.content_ref.as_str();
        debug!(name = %descriptor.name, "Fetching asset");

        let mut mime_type = descriptor.mime_type.clone();
        let bytes = if reference.starts_with("data:") {
            let (declared, bytes) = decode_data_url(reference)?;
            if let Some(declared) = declared {
                if mime_type == "application/octet-stream" {
                    mime_type = declared;
                }
            }
            bytes
        } else {
            let url = Url::parse(reference)
                .map_err(|e| FetchError::InvalidReference(format!("{}: {}", reference, e)))?;
            match url.scheme() {
                "http" | "https" => self.fetch_http(reference).await?,
                "file" => Self::fetch_file(&url).await?,
                other => return Err(FetchError::UnsupportedScheme(other.to_string())),
            }
        };

        Ok(NativeFile {
            name: descriptor.name.clone(),
            mime_type,
            bytes,
        })
    }
}
