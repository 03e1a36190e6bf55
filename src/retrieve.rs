//! Fetching source bodies. The build driver only sees the [`Retrieve`] trait,
//! so tests can hand it canned bytes.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::constants::USER_AGENT;
use crate::error::IngestError;
use crate::storage::{file_present_nonempty, tmp_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Content differs from (or there was no) previous retrieval.
    Fresh,
    /// Upstream reported no change; `content` is the cached copy.
    Unchanged,
    Unavailable { status: u16 },
}

#[derive(Debug, Clone)]
pub struct Retrieved {
    pub url: String,
    pub content: Vec<u8>,
    pub freshness: Freshness,
}

impl Retrieved {
    pub fn fresh(url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            freshness: Freshness::Fresh,
        }
    }

    /// Turns an `Unavailable` result into a [`IngestError::RetrievalFailure`].
    pub fn into_content(self) -> Result<(Vec<u8>, Freshness), IngestError> {
        match self.freshness {
            Freshness::Unavailable { status } => Err(IngestError::RetrievalFailure {
                url: self.url,
                status,
            }),
            freshness => Ok((self.content, freshness)),
        }
    }
}

pub trait Retrieve {
    /// An `Err` means the request itself failed (DNS, TLS, local IO). A
    /// non-success HTTP status is reported as [`Freshness::Unavailable`].
    fn retrieve(&self, url: &str) -> impl Future<Output = Result<Retrieved>> + Send;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheMeta {
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
}

/// HTTP retrieval with a validator cache: the previous body and its
/// `ETag`/`Last-Modified` are kept under `cache_dir`, and a `304` replays the
/// stored body.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    cache_dir: PathBuf,
}

impl HttpRetriever {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed building HTTP client")?;
        Ok(Self::with_client(client, cache_dir))
    }

    pub fn with_client(client: Client, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    fn body_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.body", cache_key(url)))
    }

    fn meta_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", cache_key(url)))
    }

    fn load_meta(&self, url: &str) -> Option<CacheMeta> {
        let body = self.body_path(url);
        if !file_present_nonempty(&body) {
            return None;
        }
        let text = std::fs::read_to_string(self.meta_path(url)).ok()?;
        serde_json::from_str::<CacheMeta>(&text)
            .ok()
            .filter(|meta| meta.url == url)
    }

    fn store(&self, url: &str, meta: &CacheMeta, content: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed creating {}", self.cache_dir.display()))?;
        write_atomic(&self.body_path(url), content)?;
        let json = serde_json::to_vec_pretty(meta).context("Failed encoding cache metadata")?;
        write_atomic(&self.meta_path(url), &json)
    }
}

impl Retrieve for HttpRetriever {
    async fn retrieve(&self, url: &str) -> Result<Retrieved> {
        let cached = self.load_meta(url);

        let mut request = self.client.get(url);
        if let Some(meta) = &cached {
            if let Some(etag) = &meta.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = &meta.last_modified {
                request = request.header(IF_MODIFIED_SINCE, modified);
            }
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request failed for {url}"))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED && cached.is_some() {
            let body_path = self.body_path(url);
            let content = std::fs::read(&body_path)
                .with_context(|| format!("Failed reading cached {}", body_path.display()))?;
            tracing::debug!("{url} not modified; using cached copy");
            return Ok(Retrieved {
                url: url.to_string(),
                content,
                freshness: Freshness::Unchanged,
            });
        }

        if !status.is_success() {
            return Ok(Retrieved {
                url: url.to_string(),
                content: Vec::new(),
                freshness: Freshness::Unavailable {
                    status: status.as_u16(),
                },
            });
        }

        let meta = {
            let header = |name: HeaderName| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            CacheMeta {
                url: url.to_string(),
                etag: header(ETAG),
                last_modified: header(LAST_MODIFIED),
            }
        };

        let content = response
            .bytes()
            .await
            .with_context(|| format!("Failed reading body from {url}"))?
            .to_vec();

        // Servers that do not honour validators still let us skip unchanged work.
        let previous = cached
            .as_ref()
            .and_then(|_| std::fs::read(self.body_path(url)).ok());
        let freshness = if previous.as_deref() == Some(content.as_slice()) {
            Freshness::Unchanged
        } else {
            Freshness::Fresh
        };

        if let Err(err) = self.store(url, &meta, &content) {
            tracing::warn!("Could not cache {url}: {err:#}");
        }

        Ok(Retrieved {
            url: url.to_string(),
            content,
            freshness,
        })
    }
}

fn cache_key(url: &str) -> String {
    let trimmed = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, content).with_context(|| format!("Failed writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        format!("Failed moving {} to {}", tmp.display(), path.display())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_file_safe() {
        assert_eq!(
            cache_key("http://weather.noaa.gov/data/nsd_cccc.txt"),
            "weather.noaa.gov_data_nsd_cccc.txt"
        );
        assert_eq!(
            cache_key("https://example.com/a?b=c"),
            "example.com_a_b_c"
        );
    }

    #[test]
    fn unavailable_becomes_retrieval_failure() {
        let retrieved = Retrieved {
            url: "http://example.com/x".into(),
            content: Vec::new(),
            freshness: Freshness::Unavailable { status: 404 },
        };
        let err = retrieved.into_content().unwrap_err();
        assert!(matches!(
            err,
            IngestError::RetrievalFailure { status: 404, .. }
        ));

        let (body, freshness) = Retrieved::fresh("u", b"abc".to_vec()).into_content().unwrap();
        assert_eq!(body, b"abc");
        assert_eq!(freshness, Freshness::Fresh);
    }

    #[test]
    fn cached_meta_requires_body_and_matching_url() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = HttpRetriever::new(dir.path()).unwrap();
        let url = "http://example.com/list.txt";
        assert!(retriever.load_meta(url).is_none());

        let meta = CacheMeta {
            url: url.to_string(),
            etag: Some("\"abc\"".into()),
            last_modified: None,
        };
        retriever.store(url, &meta, b"body").unwrap();
        let loaded = retriever.load_meta(url).unwrap();
        assert_eq!(loaded.etag.as_deref(), Some("\"abc\""));

        std::fs::write(retriever.body_path(url), b"").unwrap();
        assert!(retriever.load_meta(url).is_none());
    }
}
