//! Reference resolution and asset download.
//!
//! The `Fetch` trait is the network seam: a header-only existence probe and
//! a streamed body retrieval. The `Resolver` walks one reference's variant
//! sequence through that seam, preferring format-upgraded siblings when they
//! exist, and persists the first variant that resolves. Exhausting every
//! variant is not an error; the reference is skipped and the job continues.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::services::extractor::sanitize_filename;
use crate::services::variants::{lossless_siblings, variant_urls};

/// Some origin servers reject default client identifiers, so retrieval uses
/// a realistic browser User-Agent.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unusable reference URL: {0}")]
    Url(String),

    #[error("failed to write asset: {0}")]
    Io(#[from] std::io::Error),
}

/// Chunked asset body. Bodies are piped to disk as they arrive, never
/// buffered whole.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Network capability consumed by the resolver.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Lightweight header-only existence check.
    async fn probe(&self, url: &str) -> bool;

    /// Open a body stream. `Ok(None)` for a non-success response; transport
    /// failures surface as errors and are treated as a miss by the caller.
    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError>;
}

/// reqwest-backed `Fetch` implementation.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn probe(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(
            response.bytes_stream().map_err(FetchError::from).boxed(),
        ))
    }
}

/// Resolves one raw reference to its best retrievable variant and writes it
/// into the job's output directory.
pub struct Resolver {
    fetch: Arc<dyn Fetch>,
}

impl Resolver {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self { fetch }
    }

    /// Download the best available variant of `reference`, resolved against
    /// `base_url`. Returns the written filename, or `Ok(None)` when no
    /// variant was retrievable.
    pub async fn download(
        &self,
        reference: &str,
        base_url: &str,
        dir: &Path,
    ) -> Result<Option<String>, FetchError> {
        let absolute = resolve_absolute(reference, base_url)?;

        for candidate in variant_urls(absolute.as_str()) {
            // Format upgrade last: for each structurally-cleaned candidate,
            // a probed lossless sibling wins over the candidate itself.
            for sibling in lossless_siblings(&candidate) {
                if !self.fetch.probe(&sibling).await {
                    continue;
                }
                if let Some(name) = self.try_retrieve(&sibling, dir).await? {
                    return Ok(Some(name));
                }
            }

            if let Some(name) = self.try_retrieve(&candidate, dir).await? {
                return Ok(Some(name));
            }
        }

        Ok(None)
    }

    async fn try_retrieve(&self, url: &str, dir: &Path) -> Result<Option<String>, FetchError> {
        let mut stream = match self.fetch.fetch(url).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::debug!(url, error = %e, "Variant fetch failed, trying next");
                return Ok(None);
            }
        };

        let filename = output_filename(url, dir);
        let path = dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await?;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => file.write_all(&chunk).await?,
                Err(e) => {
                    // A body that breaks mid-transfer is a miss like any
                    // other; the partial file must not count as a download.
                    tracing::debug!(url, error = %e, "Body stream broke, trying next variant");
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Ok(None);
                }
            }
        }
        file.flush().await?;
        Ok(Some(filename))
    }
}

fn resolve_absolute(reference: &str, base_url: &str) -> Result<Url, FetchError> {
    if let Ok(url) = Url::parse(reference) {
        return Ok(url);
    }
    let base = Url::parse(base_url)
        .map_err(|e| FetchError::Url(format!("invalid base URL {base_url}: {e}")))?;
    base.join(reference)
        .map_err(|e| FetchError::Url(format!("cannot resolve {reference}: {e}")))
}

/// Filename for a winning variant: the sanitized final path segment, with a
/// synthesized fallback when the segment is empty or already taken. The
/// fallback is itself re-checked against the directory, so same-named
/// references landing in the same millisecond still get distinct files.
fn output_filename(url: &str, dir: &Path) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back())
                .map(str::to_string)
        })
        .unwrap_or_default();
    let name = sanitize_filename(&segment);

    if !name.trim().is_empty() && !dir.join(&name).exists() {
        return name;
    }

    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_else(|| ".jpg".to_string());
    let stamp = chrono::Utc::now().timestamp_millis();
    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            format!("image_{stamp}{extension}")
        } else {
            format!("image_{stamp}_{attempt}{extension}")
        };
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        attempt += 1;
    }
}
