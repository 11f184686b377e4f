//! Remote texture source abstraction.
//!
//! The trait boundary exists for dependency injection: production code
//! talks to the game's resource server over HTTP, tests substitute a mock
//! that never touches the network.

use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from texture resolution.
///
/// These are degraded-mode errors: the rasterizer renders unresolved
/// tilesets as gray, so no variant here is fatal to an import.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// HTTP request failed or returned a non-2xx status
    #[error("http error fetching {name}: {message}")]
    Http { name: String, message: String },

    /// Response body did not carry the PNG magic bytes
    #[error("response for {name} is not a PNG image")]
    NotAnImage { name: String },

    /// Valid-looking bytes that the decoder rejected
    #[error("decode failed for {name}: {message}")]
    Decode { name: String, message: String },

    /// Local disk cache I/O failure
    #[error("disk cache error for {name}: {message}")]
    Io { name: String, message: String },
}

impl FetchError {
    /// Whether this failure came from the network rather than local state.
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Http { .. } | FetchError::NotAnImage { .. })
    }
}

/// Trait for remote texture sources.
///
/// Implementors return the raw response bytes for a resource name; the
/// fetcher validates and decodes them.
pub trait TextureSource: Send + Sync {
    /// Fetches the raw bytes for a tileset resource.
    fn fetch(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// HTTP texture source backed by reqwest.
#[derive(Clone)]
pub struct HttpTextureSource {
    client: reqwest::Client,
    base_url: String,
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("hearthmap/", env!("CARGO_PKG_VERSION"));

impl HttpTextureSource {
    /// Creates a source rooted at `base_url`.
    ///
    /// Resource names are appended to the base URL, so
    /// `https://render.example.com/res/` plus `gfx/tiles/grass` requests
    /// `https://render.example.com/res/gfx/tiles/grass`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Http {
                name: String::new(),
                message: format!("failed to create http client: {e}"),
            })?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }
}

impl TextureSource for HttpTextureSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, name);
        debug!(url = %url, "fetching texture");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "texture request failed");
            FetchError::Http {
                name: name.to_string(),
                message: format!("request failed: {e}"),
            }
        })?;

        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "texture http error status");
            return Err(FetchError::Http {
                name: name.to_string(),
                message: format!("HTTP {} from {}", response.status(), url),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Http {
                name: name.to_string(),
                message: format!("failed to read response: {e}"),
            })
    }
}
