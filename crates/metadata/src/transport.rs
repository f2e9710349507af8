//! Page transports.
//!
//! The engine only needs "URL in, final URL + status + body out". Retries,
//! challenge handling and connection reuse are the transport's business.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use henmeta_core::{FetchedPage, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::HttpConfig;

/// Fetches one URL, following redirects, and reports where it ended up.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        (**self).fetch(url).await
    }
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| TransportError::Network(format!("invalid user agent: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| TransportError::Network(format!("build client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        debug!(url = %url, "HTTP request");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("read body of {final_url}: {e}")))?;

        debug!(url = %url, final_url = %final_url, status, bytes = body.len(), "HTTP response");
        Ok(FetchedPage {
            final_url,
            body,
            status,
        })
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// One entry of a fixture directory's `index.json`.
#[derive(Debug, Clone, serde::Deserialize)]
struct FixtureEntry {
    url: String,
    #[serde(default)]
    final_url: Option<String>,
    file: String,
    #[serde(default = "default_status")]
    status: u16,
}

fn default_status() -> u16 {
    200
}

/// Replays captured pages instead of touching the network. URLs match
/// case-insensitively. Unknown URLs fail with a 404 status error so that the
/// dispatcher treats them like any other bad response.
#[derive(Default)]
pub struct FixtureTransport {
    pages: Mutex<HashMap<String, Result<FetchedPage, TransportError>>>,
    requests: Mutex<Vec<String>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `index.json` plus the HTML files it references from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, TransportError> {
        let index_path = dir.join("index.json");
        let raw = std::fs::read_to_string(&index_path)
            .map_err(|e| TransportError::Fixture(format!("{}: {e}", index_path.display())))?;
        let entries: Vec<FixtureEntry> = serde_json::from_str(&raw)
            .map_err(|e| TransportError::Fixture(format!("{}: {e}", index_path.display())))?;

        let transport = Self::new();
        for entry in entries {
            let html_path = dir.join(&entry.file);
            let body = std::fs::read_to_string(&html_path)
                .map_err(|e| TransportError::Fixture(format!("{}: {e}", html_path.display())))?;
            let final_url = entry.final_url.unwrap_or_else(|| entry.url.clone());
            transport.insert_page(
                &entry.url,
                FetchedPage {
                    final_url,
                    body,
                    status: entry.status,
                },
            );
        }
        debug!(dir = %dir.display(), pages = transport.len(), "loaded fixtures");
        Ok(transport)
    }

    /// Serve `body` with status 200 for `url`, without a redirect.
    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with_redirect(url, url, body)
    }

    /// Serve `body` for `url` as if the site redirected to `final_url`.
    pub fn with_redirect(self, url: &str, final_url: &str, body: &str) -> Self {
        self.insert_page(
            url,
            FetchedPage {
                final_url: final_url.to_string(),
                body: body.to_string(),
                status: 200,
            },
        );
        self
    }

    /// Fail every request for `url` with `error`.
    pub fn with_error(self, url: &str, error: TransportError) -> Self {
        self.lock_pages().insert(url.to_lowercase(), Err(error));
        self
    }

    pub fn insert_page(&self, url: &str, page: FetchedPage) {
        self.lock_pages().insert(url.to_lowercase(), Ok(page));
    }

    pub fn len(&self) -> usize {
        self.lock_pages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every URL requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_pages(&self) -> std::sync::MutexGuard<'_, HashMap<String, Result<FetchedPage, TransportError>>> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Transport for FixtureTransport {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        match self.lock_pages().get(&url.to_lowercase()) {
            Some(entry) => entry.clone(),
            None => Ok(FetchedPage {
                final_url: url.to_string(),
                body: String::new(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_matches_case_insensitively_and_records_requests() {
        let transport = FixtureTransport::new().with_redirect(
            "http://site.test/en/vl_searchbyid.php?keyword=ABC-001",
            "http://site.test/en/?v=abc",
            "<html>entry</html>",
        );

        let page = transport
            .fetch("http://site.test/en/vl_searchbyid.php?keyword=abc-001")
            .await
            .unwrap();
        assert_eq!(page.final_url, "http://site.test/en/?v=abc");
        assert_eq!(page.status, 200);

        let missing = transport.fetch("http://site.test/en/other").await.unwrap();
        assert_eq!(missing.status, 404);

        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn fixture_errors_are_replayed() {
        let transport = FixtureTransport::new()
            .with_error("http://site.test/ja/", TransportError::Network("reset".into()));
        let err = transport.fetch("http://site.test/ja/").await.unwrap_err();
        assert_eq!(err, TransportError::Network("reset".into()));
    }

    #[tokio::test]
    async fn fixture_dir_is_loaded_from_index() {
        let dir = std::env::temp_dir().join(format!("henmeta_fixture_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("love049_en.html"), "<html>en</html>").unwrap();
        std::fs::write(
            dir.join("index.json"),
            r#"[{"url": "http://site.test/en/vl_searchbyid.php?keyword=LOVE-049",
                 "final_url": "http://site.test/en/?v=javli",
                 "file": "love049_en.html"}]"#,
        )
        .unwrap();

        let transport = FixtureTransport::from_dir(&dir).unwrap();
        assert_eq!(transport.len(), 1);
        let page = transport
            .fetch("http://site.test/en/vl_searchbyid.php?keyword=LOVE-049")
            .await
            .unwrap();
        assert_eq!(page.body, "<html>en</html>");
        assert_eq!(page.final_url, "http://site.test/en/?v=javli");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn http_transport_rejects_unprintable_user_agent() {
        assert!(HttpTransport::new(&HttpConfig::default()).is_ok());

        let config = HttpConfig {
            user_agent: "bad\nagent".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpTransport::new(&config),
            Err(TransportError::Network(_))
        ));
    }

    #[test]
    fn missing_fixture_dir_is_an_error() {
        let err = FixtureTransport::from_dir(Path::new("/nonexistent/henmeta")).err();
        assert!(matches!(err, Some(TransportError::Fixture(_))));
    }
}
