//! Offline cache for the station's shell assets
//!
//! Responses are stored on disk under `<dir>/<version>/`, one body file and one JSON
//! metadata file per URL. Installing a version is all-or-nothing: everything is
//! fetched into a staging directory first and only renamed into place when every
//! URL succeeded.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("fetching {url} returned HTTP {status}")]
    BadStatus { url: String, status: u16 },

    #[error("cache IO failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no URLs to install into cache {version}")]
    NothingToInstall { version: String },

    #[error("corrupt cache metadata at {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// On-disk metadata next to each cached body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
    /// RFC 3339, UTC
    stored_at: String,
}

/// Where a fetched response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}

/// Network capability behind the cache
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<CachedResponse, CacheError>;
}

pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Result<Self, CacheError> {
        let client = reqwest::Client::builder().build().map_err(|e| CacheError::Fetch {
            url: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<CachedResponse, CacheError> {
        let fetch_err = |e: reqwest::Error| CacheError::Fetch { url: url.to_string(), message: e.to_string() };

        let response = self.client.get(url).send().await.map_err(fetch_err)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(fetch_err)?.to_vec();

        Ok(CachedResponse { status, content_type, body })
    }
}

pub struct ShellCache {
    root: PathBuf,
    version: String,
    network: Arc<dyn NetworkFetch>,
}

impl ShellCache {
    pub fn new(root: impl Into<PathBuf>, version: &str, network: Arc<dyn NetworkFetch>) -> Self {
        Self { root: root.into(), version: version.to_string(), network }
    }

    pub fn version_dir(&self) -> PathBuf {
        self.root.join(&self.version)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(format!(".{}.staging", self.version))
    }

    fn entry_paths(dir: &Path, url: &str) -> (PathBuf, PathBuf) {
        let key = URL_SAFE_NO_PAD.encode(url.as_bytes());
        (dir.join(format!("{key}.body")), dir.join(format!("{key}.meta.json")))
    }

    async fn write_entry(dir: &Path, url: &str, response: &CachedResponse) -> Result<(), CacheError> {
        let (body_path, meta_path) = Self::entry_paths(dir, url);
        let stored_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let meta = EntryMeta {
            url: url.to_string(),
            status: response.status,
            content_type: response.content_type.clone(),
            stored_at,
        };
        let meta = serde_json::to_vec(&meta)
            .map_err(|source| CacheError::Metadata { path: meta_path.clone(), source })?;
        tokio::fs::write(&body_path, &response.body).await.map_err(io_err(&body_path))?;
        tokio::fs::write(&meta_path, meta).await.map_err(io_err(&meta_path))?;
        Ok(())
    }

    /// Fetch every URL into a fresh copy of this version. Any failure leaves the
    /// previously installed copy (if any) untouched.
    pub async fn install(&self, urls: &[String]) -> Result<usize, CacheError> {
        // An empty version would pass `activate` and wipe the populated one
        if urls.is_empty() {
            return Err(CacheError::NothingToInstall { version: self.version.clone() });
        }

        let staging = self.staging_dir();
        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await.map_err(io_err(&staging))?;

        for url in urls {
            let result = match self.network.get(url).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    Self::write_entry(&staging, url, &response).await
                }
                Ok(response) => Err(CacheError::BadStatus { url: url.clone(), status: response.status }),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(version = %self.version, url = %url, error = %e, "cache_install_failed");
                let _ = remove_dir_if_exists(&staging).await;
                return Err(e);
            }
            debug!(url = %url, "cache_entry_stored");
        }

        let target = self.version_dir();
        remove_dir_if_exists(&target).await?;
        tokio::fs::rename(&staging, &target).await.map_err(io_err(&target))?;

        info!(version = %self.version, entries = %urls.len(), "cache_installed");
        Ok(urls.len())
    }

    /// Delete every cache version except the current one. Returns the removed names.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::Io { path: self.root.clone(), source: e }),
        };

        let mut removed = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.root))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.version || !entry.path().is_dir() {
                continue;
            }
            tokio::fs::remove_dir_all(entry.path()).await.map_err(io_err(&entry.path()))?;
            info!(version = %name, "cache_version_deleted");
            removed.push(name);
        }
        removed.sort();
        Ok(removed)
    }

    /// Cached response for this exact URL, else pass through to the network.
    /// Network responses are not written back.
    pub async fn fetch(&self, url: &str) -> Result<(CachedResponse, FetchSource), CacheError> {
        if let Some(cached) = self.lookup(url).await? {
            debug!(url = %url, "cache_hit");
            return Ok((cached, FetchSource::Cache));
        }
        debug!(url = %url, "cache_miss");
        let response = self.network.get(url).await?;
        Ok((response, FetchSource::Network))
    }

    async fn lookup(&self, url: &str) -> Result<Option<CachedResponse>, CacheError> {
        let (body_path, meta_path) = Self::entry_paths(&self.version_dir(), url);
        let meta = match tokio::fs::read(&meta_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path: meta_path, source: e }),
        };
        let meta: EntryMeta = serde_json::from_slice(&meta)
            .map_err(|source| CacheError::Metadata { path: meta_path.clone(), source })?;
        let body = tokio::fs::read(&body_path).await.map_err(io_err(&body_path))?;
        debug!(url = %meta.url, stored_at = %meta.stored_at, "cache_entry_loaded");
        Ok(Some(CachedResponse { status: meta.status, content_type: meta.content_type, body }))
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io { path: path.to_path_buf(), source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rustc_hash::FxHashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeNetwork {
        pages: Mutex<FxHashMap<String, CachedResponse>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn serve(&self, url: &str, status: u16, body: &str) {
            self.pages.lock().insert(
                url.to_string(),
                CachedResponse {
                    status,
                    content_type: Some("text/html".to_string()),
                    body: body.as_bytes().to_vec(),
                },
            );
        }
    }

    #[async_trait]
    impl NetworkFetch for FakeNetwork {
        async fn get(&self, url: &str) -> Result<CachedResponse, CacheError> {
            self.calls.lock().push(url.to_string());
            self.pages.lock().get(url).cloned().ok_or_else(|| CacheError::Fetch {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_install_then_fetch_serves_from_cache() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/", 200, "<html>scanner</html>");
        network.serve("http://station/app.js", 200, "main()");
        let cache = ShellCache::new(dir.path(), "v1", network.clone());

        let stored = cache.install(&urls(&["http://station/", "http://station/app.js"])).await.unwrap();
        assert_eq!(stored, 2);

        // Network gone: cached copy still served
        network.pages.lock().clear();
        let (response, source) = cache.fetch("http://station/app.js").await.unwrap();
        assert_eq!(source, FetchSource::Cache);
        assert_eq!(response.body, b"main()");
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/", 200, "ok");
        let cache = ShellCache::new(dir.path(), "v1", network.clone());

        let err = cache.install(&urls(&["http://station/", "http://station/missing.css"])).await;

        assert!(matches!(err, Err(CacheError::Fetch { .. })));
        assert!(!cache.version_dir().exists());
        assert!(!cache.staging_dir().exists());
    }

    #[tokio::test]
    async fn test_empty_install_keeps_existing_version() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/", 200, "ok");
        ShellCache::new(dir.path(), "v1", network.clone())
            .install(&urls(&["http://station/"]))
            .await
            .unwrap();

        let next = ShellCache::new(dir.path(), "v2", network);
        assert!(matches!(next.install(&[]).await, Err(CacheError::NothingToInstall { .. })));
        assert!(!next.version_dir().exists());
        assert!(dir.path().join("v1").exists());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/", 500, "boom");
        let cache = ShellCache::new(dir.path(), "v1", network);

        assert!(matches!(
            cache.install(&urls(&["http://station/"])).await,
            Err(CacheError::BadStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_miss_passes_through_to_network() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/api", 200, "{}");
        let cache = ShellCache::new(dir.path(), "v1", network.clone());

        let (response, source) = cache.fetch("http://station/api").await.unwrap();

        assert_eq!(source, FetchSource::Network);
        assert_eq!(response.body, b"{}");
        assert!(!cache.version_dir().exists());
    }

    #[tokio::test]
    async fn test_activate_removes_other_versions() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.serve("http://station/", 200, "ok");

        ShellCache::new(dir.path(), "v0", network.clone()).install(&urls(&["http://station/"])).await.unwrap();
        let current = ShellCache::new(dir.path(), "v1", network.clone());
        current.install(&urls(&["http://station/"])).await.unwrap();

        let removed = current.activate().await.unwrap();

        assert_eq!(removed, vec!["v0".to_string()]);
        assert!(current.version_dir().exists());
        assert!(!dir.path().join("v0").exists());
    }

    #[tokio::test]
    async fn test_activate_without_cache_dir_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = ShellCache::new(dir.path().join("absent"), "v1", Arc::new(FakeNetwork::default()));
        assert!(cache.activate().await.unwrap().is_empty());
    }
}
