//! Lazy loading of `@require` and `@resource` dependencies.
//!
//! Bodies are fetched on first use, checked against an optional
//! `#sha256=` integrity fragment and cached in the database. A dependency
//! that cannot be loaded is logged and left unloaded; the script still runs.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::future::join_all;
use futures_util::{Stream, StreamExt};
use ring::digest;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::database::Database;
use crate::types::errors::DependencyError;
use crate::types::script::ScriptMetadata;
use crate::types::settings::DependencySettings;

/// A fetched dependency body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedBody {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// `data:` URL for `GM_getResourceURL`.
    pub fn data_url(&self) -> String {
        let content_type = self
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        format!("data:{};base64,{}", content_type, BASE64.encode(&self.bytes))
    }
}

#[async_trait]
pub trait DependencyFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, DependencyError>;
}

/// Fetches over HTTP(S) with a timeout and a size cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(settings: &DependencySettings) -> Result<Self, DependencyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("scriptbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()
            .map_err(|e| DependencyError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }
}

#[async_trait]
impl DependencyFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, DependencyError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DependencyError::Network(format!("{url}: {e}")))?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DependencyError::TooLarge {
                    url: url.to_string(),
                    bytes: length,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = read_capped(response.bytes_stream(), self.max_bytes, url).await?;

        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }
}

/// Collects a body stream, giving up as soon as it grows past `max_bytes`.
pub async fn read_capped<S, B, E>(
    stream: S,
    max_bytes: u64,
    url: &str,
) -> Result<Vec<u8>, DependencyError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DependencyError::Network(format!("{url}: {e}")))?;
        let received = body.len() as u64 + chunk.as_ref().len() as u64;
        if received > max_bytes {
            return Err(DependencyError::TooLarge {
                url: url.to_string(),
                bytes: received,
            });
        }
        body.extend_from_slice(chunk.as_ref());
    }
    Ok(body)
}

/// Splits `url#sha256=<digest>` into the fetchable URL and the expected digest.
/// The SRI spelling `#sha256-<digest>` is accepted too.
pub fn split_integrity(url: &str) -> (&str, Option<&str>) {
    let Some((base, fragment)) = url.split_once('#') else {
        return (url, None);
    };
    let expected = fragment
        .split([',', ';'])
        .find_map(|part| part.strip_prefix("sha256=").or_else(|| part.strip_prefix("sha256-")))
        .filter(|d| !d.is_empty());
    match expected {
        Some(digest) => (base, Some(digest)),
        None => (url, None),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    digest::digest(&digest::SHA256, bytes)
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Checks `bytes` against a hex or base64 SHA-256 digest.
pub fn verify_integrity(bytes: &[u8], expected: &str) -> bool {
    let actual = digest::digest(&digest::SHA256, bytes);
    if expected.len() == 64 && expected.chars().all(|c| c.is_ascii_hexdigit()) {
        return sha256_hex(bytes) == expected.to_ascii_lowercase();
    }
    match BASE64.decode(expected) {
        Ok(decoded) => decoded.as_slice() == actual.as_ref(),
        Err(_) => false,
    }
}

/// Dependency bodies persisted in the `dependency_cache` table.
pub struct DependencyCache {
    db: Arc<Database>,
}

impl DependencyCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, url: &str) -> Result<Option<FetchedBody>, DependencyError> {
        self.db
            .connection()
            .query_row(
                "SELECT body, content_type FROM dependency_cache WHERE url = ?1",
                params![url],
                |row| {
                    Ok(FetchedBody {
                        bytes: row.get(0)?,
                        content_type: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DependencyError::Cache(e.to_string()))
    }

    pub fn put(&self, url: &str, body: &FetchedBody) -> Result<(), DependencyError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO dependency_cache (url, body, content_type, sha256, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![url, body.bytes, body.content_type, sha256_hex(&body.bytes), now],
            )
            .map_err(|e| DependencyError::Cache(e.to_string()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), DependencyError> {
        self.db
            .connection()
            .execute("DELETE FROM dependency_cache", [])
            .map_err(|e| DependencyError::Cache(e.to_string()))?;
        Ok(())
    }
}

pub struct DependencyLoader {
    fetcher: Arc<dyn DependencyFetcher>,
    cache: DependencyCache,
}

impl DependencyLoader {
    pub fn new(fetcher: Arc<dyn DependencyFetcher>, cache: DependencyCache) -> Self {
        Self { fetcher, cache }
    }

    /// Returns the body for `url`, from cache when possible.
    pub async fn load(&self, url: &str) -> Result<FetchedBody, DependencyError> {
        let (fetch_url, expected) = split_integrity(url);

        match self.cache.get(fetch_url) {
            Ok(Some(body)) if expected.map_or(true, |e| verify_integrity(&body.bytes, e)) => {
                debug!("dependency cache hit: {fetch_url}");
                return Ok(body);
            }
            Ok(Some(_)) => debug!("cached body for {fetch_url} fails integrity, refetching"),
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }

        let body = self.fetcher.fetch(fetch_url).await?;
        if let Some(expected) = expected {
            if !verify_integrity(&body.bytes, expected) {
                return Err(DependencyError::IntegrityMismatch {
                    url: url.to_string(),
                });
            }
        }
        if let Err(e) = self.cache.put(fetch_url, &body) {
            warn!("{e}");
        }
        Ok(body)
    }

    /// Loads every pending require and resource of `metadata` in place.
    ///
    /// Returns the number of dependencies that could not be loaded.
    pub async fn resolve(&self, metadata: &mut ScriptMetadata) -> usize {
        let require_urls: Vec<String> = metadata
            .require
            .iter()
            .filter(|r| !r.loaded)
            .map(|r| r.url.clone())
            .collect();
        let resource_urls: Vec<String> = metadata
            .resource
            .iter()
            .filter(|r| !r.loaded)
            .map(|r| r.url.clone())
            .collect();

        let (requires, resources) = tokio::join!(
            join_all(require_urls.iter().map(|url| self.load(url))),
            join_all(resource_urls.iter().map(|url| self.load(url))),
        );

        let mut failed = 0;
        let pending_requires = metadata.require.iter_mut().filter(|r| !r.loaded);
        for (entry, result) in pending_requires.zip(requires) {
            match result {
                Ok(body) => {
                    entry.text_content = Some(body.text());
                    entry.loaded = true;
                }
                Err(e) => {
                    warn!("@require {} not loaded for {}: {e}", entry.url, metadata.name);
                    failed += 1;
                }
            }
        }

        let pending_resources = metadata.resource.iter_mut().filter(|r| !r.loaded);
        for (entry, result) in pending_resources.zip(resources) {
            match result {
                Ok(body) => {
                    entry.res_text = Some(body.text());
                    entry.res_url = Some(body.data_url());
                    entry.loaded = true;
                }
                Err(e) => {
                    warn!("@resource {} not loaded for {}: {e}", entry.name, metadata.name);
                    failed += 1;
                }
            }
        }
        failed
    }
}
