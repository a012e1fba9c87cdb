// src/services/session.rs

//! Page sessions: the capability to open a URL and read the resulting
//! document.
//!
//! One session is acquired per run and closed when the run ends.
//! [`HttpSession`] talks to the live site, [`ReplaySession`] serves pages
//! saved by an earlier run, and [`MemorySession`] serves scripted responses.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};

use crate::error::{AppError, FetchError, Result};
use crate::models::SessionConfig;
use crate::services::throttle::Identity;

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub html: String,
}

impl Page {
    pub fn ok(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            html: html.into(),
        }
    }
}

/// Markers of an interstitial challenge instead of real content.
const CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "cf-challenge",
    "challenge-platform",
    "are you a robot",
    "unusual traffic",
];

/// Map a loaded page onto success or a [`FetchError`].
pub fn classify(page: Page) -> std::result::Result<Page, FetchError> {
    match page.status {
        200..=299 => {
            let lower = page.html.to_lowercase();
            match CHALLENGE_MARKERS.iter().find(|m| lower.contains(*m)) {
                Some(marker) => Err(FetchError::blocked(
                    &page.url,
                    format!("challenge page ({marker})"),
                )),
                None => Ok(page),
            }
        }
        401 | 403 | 429 => Err(FetchError::blocked(
            &page.url,
            format!("HTTP {}", page.status),
        )),
        400..=499 => Err(FetchError::malformed(
            &page.url,
            format!("HTTP {}", page.status),
        )),
        _ => Err(FetchError::network(
            &page.url,
            format!("HTTP {}", page.status),
        )),
    }
}

/// Capability to open pages.
#[async_trait]
pub trait Session: Send {
    /// Navigate to `url` presenting `identity` and return the document.
    ///
    /// Status codes are not interpreted here; see [`classify`].
    async fn open(&mut self, url: &str, identity: &Identity)
    -> std::result::Result<Page, FetchError>;

    /// Release the session. Called exactly once, at the end of a run.
    async fn close(&mut self) -> Result<()>;
}

/// File name under which a page for `url` is saved.
pub fn snapshot_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}.html", hex::encode(&digest[..16]))
}

/// Live session over HTTP.
pub struct HttpSession {
    client: Client,
    snapshot_dir: Option<PathBuf>,
    requests: usize,
}

impl HttpSession {
    /// Build the client. Failure here is fatal for the run.
    pub fn acquire(config: &SessionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs));

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::session(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(AppError::session)?;

        if !config.headless {
            log::info!("Visible mode requested; HTTP sessions have no window to show");
        }

        Ok(Self {
            client,
            snapshot_dir: config.snapshot_dir.as_ref().map(PathBuf::from),
            requests: 0,
        })
    }

    async fn save_snapshot(&self, url: &str, html: &str) {
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        let path = dir.join(snapshot_name(url));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, html).await
        }
        .await;
        if let Err(e) = result {
            log::warn!("Failed to save snapshot {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn open(
        &mut self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<Page, FetchError> {
        self.requests += 1;
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &identity.user_agent)
            .header(ACCEPT_LANGUAGE, &identity.accept_language)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        self.save_snapshot(url, &html).await;

        Ok(Page {
            url: final_url,
            status,
            html,
        })
    }

    async fn close(&mut self) -> Result<()> {
        log::debug!("HTTP session closed after {} request(s)", self.requests);
        Ok(())
    }
}

/// Offline session serving pages saved with `snapshot_dir`.
pub struct ReplaySession {
    dir: PathBuf,
}

impl ReplaySession {
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AppError::session(format!(
                "replay directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

#[async_trait]
impl Session for ReplaySession {
    async fn open(
        &mut self,
        url: &str,
        _identity: &Identity,
    ) -> std::result::Result<Page, FetchError> {
        let path = self.dir.join(snapshot_name(url));
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => Ok(Page::ok(url, html)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Page {
                url: url.to_string(),
                status: 404,
                html: String::new(),
            }),
            Err(e) => Err(FetchError::network(url, e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Scripted session.
///
/// Each URL holds a queue of responses; the last one repeats once the queue
/// is down to a single entry. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemorySession {
    routes: HashMap<String, VecDeque<std::result::Result<Page, FetchError>>>,
    visits: Vec<(String, String)>,
    closed: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with status 200 for `url`.
    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.push(url, Ok(Page::ok(url, html)));
        self
    }

    /// Queue a response for `url`.
    pub fn push(&mut self, url: &str, response: std::result::Result<Page, FetchError>) {
        self.routes
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a bare status code for `url`.
    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.push(
            url,
            Ok(Page {
                url: url.to_string(),
                status,
                html: String::new(),
            }),
        );
        self
    }

    /// Visited URLs with the user agent presented, in order.
    pub fn visits(&self) -> &[(String, String)] {
        &self.visits
    }

    pub fn visit_count(&self, url: &str) -> usize {
        self.visits.iter().filter(|(u, _)| u == url).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn open(
        &mut self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<Page, FetchError> {
        self.visits
            .push((url.to_string(), identity.user_agent.clone()));

        match self.routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| {
                Err(FetchError::network(url, "empty response queue"))
            }),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::network(url, "empty response queue"))),
            None => Ok(Page {
                url: url.to_string(),
                status: 404,
                html: String::new(),
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            user_agent: "test-agent".into(),
            accept_language: "en-US,en;q=0.9".into(),
            viewport: (1280, 800),
        }
    }

    #[test]
    fn test_classify_statuses() {
        let page = |status| Page {
            url: "https://example.com".into(),
            status,
            html: "<html></html>".into(),
        };
        assert!(classify(page(200)).is_ok());
        assert_eq!(classify(page(403)).unwrap_err().kind, crate::error::FetchErrorKind::Blocked);
        assert_eq!(classify(page(429)).unwrap_err().kind, crate::error::FetchErrorKind::Blocked);
        assert_eq!(classify(page(404)).unwrap_err().kind, crate::error::FetchErrorKind::Malformed);
        assert_eq!(classify(page(503)).unwrap_err().kind, crate::error::FetchErrorKind::Network);
    }

    #[test]
    fn test_classify_challenge_page() {
        let page = Page::ok("https://example.com", "<div id='captcha-box'>Verify</div>");
        assert_eq!(
            classify(page).unwrap_err().kind,
            crate::error::FetchErrorKind::Blocked
        );
    }

    #[test]
    fn test_snapshot_name_is_stable() {
        let a = snapshot_name("https://example.com/a");
        assert_eq!(a, snapshot_name("https://example.com/a"));
        assert_ne!(a, snapshot_name("https://example.com/b"));
        assert!(a.ends_with(".html"));
        assert_eq!(a.len(), 32 + 5);
    }

    #[tokio::test]
    async fn test_memory_session_queue_then_repeat() {
        let mut session = MemorySession::new().status("https://x/1", 503).page("https://x/1", "ok");
        let id = identity();
        assert_eq!(session.open("https://x/1", &id).await.unwrap().status, 503);
        assert_eq!(session.open("https://x/1", &id).await.unwrap().html, "ok");
        assert_eq!(session.open("https://x/1", &id).await.unwrap().html, "ok");
        assert_eq!(session.open("https://x/2", &id).await.unwrap().status, 404);
        assert_eq!(session.visit_count("https://x/1"), 3);
        session.close().await.unwrap();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_replay_serves_saved_pages() {
        let tmp = tempfile::TempDir::new().unwrap();
        let url = "https://example.com/vol/1";
        std::fs::write(tmp.path().join(snapshot_name(url)), "<p>saved</p>").unwrap();

        let mut session = ReplaySession::acquire(tmp.path()).unwrap();
        let page = session.open(url, &identity()).await.unwrap();
        assert_eq!(page.html, "<p>saved</p>");

        let missing = session.open("https://example.com/other", &identity()).await.unwrap();
        assert_eq!(missing.status, 404);
    }

    #[test]
    fn test_replay_requires_directory() {
        assert!(matches!(
            ReplaySession::acquire("/definitely/not/here"),
            Err(AppError::Session(_))
        ));
    }
}
