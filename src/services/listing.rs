// src/services/listing.rs

//! Archive index and per-volume listing pages.
//!
//! [`VolumeIndex`] reads the journal's issues index into [`VolumeRef`]s.
//! [`ListingWalker`] then pages through one volume's article list and hands
//! out [`ArticleReference`]s one at a time.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{FetchError, PageError, Result};
use crate::models::{ArticleReference, ScopeConfig, SelectorConfig, SiteConfig, VolumeRef};
use crate::services::document::parse_selector;
use crate::services::retry::{RetryPolicy, fetch_page_with_retry};
use crate::services::session::{Page, Session};
use crate::services::throttle::Throttle;
use crate::utils::{extract_article_id, extract_volume, normalize_whitespace, resolve_url};

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid regex"));

static ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s*\d{4}",
    )
    .expect("valid regex")
});

/// Compiled selectors for index and listing pages.
#[derive(Debug)]
pub struct ListingSelectors {
    year_section: Selector,
    year_header: Selector,
    volume_link: Selector,
    next_page: Selector,
    article_list: Selector,
    article_item: Selector,
    article_link: Selector,
}

impl ListingSelectors {
    pub fn compile(config: &SelectorConfig, journal_slug: &str) -> Result<Self> {
        Ok(Self {
            year_section: parse_selector(&config.year_section)?,
            year_header: parse_selector(&config.year_header)?,
            volume_link: parse_selector(&format!(r#"a[href*="/journal/{journal_slug}/vol/"]"#))?,
            next_page: parse_selector(&config.next_page)?,
            article_list: parse_selector(&config.article_list)?,
            article_item: parse_selector(&config.article_item)?,
            article_link: parse_selector(&config.article_link)?,
        })
    }
}

/// One page of the issues index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    pub volumes: Vec<VolumeRef>,
    pub next: Option<String>,
}

/// One page of a volume's article list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    pub next: Option<String>,
}

/// An article as shown in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub url: String,
    pub article_id: Option<String>,
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn next_link(document: &Html, base: &Url, selectors: &ListingSelectors) -> Option<String> {
    document
        .select(&selectors.next_page)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
        .find_map(|href| resolve_url(base, href))
}

fn volume_from_link(
    link: &ElementRef<'_>,
    base: &Url,
    year: Option<i32>,
) -> Option<VolumeRef> {
    let href = link.value().attr("href")?;
    let number = extract_volume(href)?;

    let context = link
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| matches!(el.value().name(), "li" | "div"))
        .map(|el| element_text(&el))
        .unwrap_or_else(|| element_text(link));

    let year = year.or_else(|| {
        YEAR.captures(&context)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    });
    let issue = ISSUE.find(&context).map(|m| normalize_whitespace(m.as_str()));

    Some(VolumeRef {
        number,
        year,
        issue,
        url: resolve_url(base, href)?,
    })
}

/// Parse an issues index page.
///
/// Year sections are preferred; without them every volume link in the
/// document is used and its year read from the surrounding list item.
pub fn parse_index(
    html: &str,
    page_url: &str,
    selectors: &ListingSelectors,
) -> std::result::Result<IndexPage, FetchError> {
    let base = Url::parse(page_url).map_err(|e| FetchError::malformed(page_url, e))?;
    let document = Html::parse_document(html);
    let mut volumes = Vec::new();

    for section in document.select(&selectors.year_section) {
        let Some(year) = section
            .select(&selectors.year_header)
            .map(|h| element_text(&h))
            .find_map(|text| {
                YEAR.captures(&text)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<i32>().ok())
            })
        else {
            continue;
        };

        volumes.extend(
            section
                .select(&selectors.volume_link)
                .filter_map(|link| volume_from_link(&link, &base, Some(year))),
        );
    }

    if volumes.is_empty() {
        volumes.extend(
            document
                .select(&selectors.volume_link)
                .filter_map(|link| volume_from_link(&link, &base, None)),
        );
    }

    if volumes.is_empty() {
        return Err(FetchError::malformed(page_url, "no volume links on index page"));
    }

    Ok(IndexPage {
        volumes,
        next: next_link(&document, &base, selectors),
    })
}

/// Parse one page of a volume's article list.
pub fn parse_listing(
    html: &str,
    page_url: &str,
    selectors: &ListingSelectors,
) -> std::result::Result<ListingPage, FetchError> {
    let base = Url::parse(page_url).map_err(|e| FetchError::malformed(page_url, e))?;
    let document = Html::parse_document(html);

    if document.select(&selectors.article_list).next().is_none() {
        return Err(FetchError::malformed(page_url, "no article list on page"));
    }

    let entries = document
        .select(&selectors.article_item)
        .filter_map(|item| {
            let link = item.select(&selectors.article_link).next()?;
            let href = link.value().attr("href")?.trim();
            let title = element_text(&link);
            if href.is_empty() || title.is_empty() {
                return None;
            }
            let url = resolve_url(&base, href)?;
            Some(ListingEntry {
                title,
                article_id: extract_article_id(&url),
                url,
            })
        })
        .collect();

    Ok(ListingPage {
        entries,
        next: next_link(&document, &base, selectors),
    })
}

/// Result of reading the issues index.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    /// In-scope volumes, newest first
    pub volumes: Vec<VolumeRef>,
    pub pages: usize,
    /// Set when an index page stayed unusable
    pub failure: Option<PageError>,
}

/// Reader for the journal's volume/issue index.
pub struct VolumeIndex<'a> {
    site: &'a SiteConfig,
    scope: &'a ScopeConfig,
    selectors: &'a ListingSelectors,
    policy: &'a RetryPolicy,
}

impl<'a> VolumeIndex<'a> {
    pub fn new(
        site: &'a SiteConfig,
        scope: &'a ScopeConfig,
        selectors: &'a ListingSelectors,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            site,
            scope,
            selectors,
            policy,
        }
    }

    /// Walk every index page and collect in-scope volumes.
    pub async fn discover(
        &self,
        session: &mut dyn Session,
        throttle: &mut Throttle,
    ) -> IndexOutcome {
        let mut outcome = IndexOutcome::default();
        let mut visited = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut next = Some(self.site.issues_url.clone());

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                log::warn!("Index pagination loops back to {}; stopping", url);
                break;
            }

            let parsed = fetch_page_with_retry(self.policy, session, throttle, &url, |page: Page| {
                parse_index(&page.html, &page.url, self.selectors)
            })
            .await;

            match parsed {
                Ok(page) => {
                    outcome.pages += 1;
                    for volume in page.volumes {
                        if !self.scope.includes_volume(volume.number) {
                            continue;
                        }
                        if !self.scope.includes_year(volume.year) {
                            log::debug!(
                                "Skipping volume {} ({:?}): outside year range",
                                volume.number,
                                volume.year
                            );
                            continue;
                        }
                        if seen_urls.insert(volume.url.clone()) {
                            outcome.volumes.push(volume);
                        }
                    }
                    next = page.next;
                }
                Err(error) => {
                    log::error!("Failed to load index page: {}", error);
                    outcome.failure = Some(error);
                }
            }
        }

        outcome
            .volumes
            .sort_by(|a, b| b.number.cmp(&a.number));
        log::info!(
            "Found {} volume(s) in scope across {} index page(s)",
            outcome.volumes.len(),
            outcome.pages
        );
        outcome
    }
}

/// Walker position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkState {
    Start,
    FetchingPage(String),
    HasPage,
    Exhausted,
    Failed(PageError),
}

/// Lazy, single-use iteration over one volume's article references.
///
/// Once `Exhausted` or `Failed` the walker only returns `None`; a new walk
/// needs a new walker.
pub struct ListingWalker<'a> {
    volume: VolumeRef,
    scope: &'a ScopeConfig,
    selectors: &'a ListingSelectors,
    policy: &'a RetryPolicy,
    budget: Option<usize>,
    state: WalkState,
    buffer: VecDeque<ArticleReference>,
    next: Option<String>,
    visited: HashSet<String>,
    yielded: usize,
    pages: usize,
}

impl<'a> ListingWalker<'a> {
    /// `budget` caps how many references this walker may yield.
    pub fn new(
        volume: VolumeRef,
        scope: &'a ScopeConfig,
        selectors: &'a ListingSelectors,
        policy: &'a RetryPolicy,
        budget: Option<usize>,
    ) -> Self {
        Self {
            volume,
            scope,
            selectors,
            policy,
            budget,
            state: WalkState::Start,
            buffer: VecDeque::new(),
            next: None,
            visited: HashSet::new(),
            yielded: 0,
            pages: 0,
        }
    }

    pub fn state(&self) -> &WalkState {
        &self.state
    }

    pub fn failure(&self) -> Option<&PageError> {
        match &self.state {
            WalkState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn volume(&self) -> &VolumeRef {
        &self.volume
    }

    /// Next in-scope reference, fetching listing pages as needed.
    pub async fn next_reference(
        &mut self,
        session: &mut dyn Session,
        throttle: &mut Throttle,
    ) -> Option<ArticleReference> {
        loop {
            if self.budget.is_some_and(|b| self.yielded >= b)
                && !matches!(self.state, WalkState::Failed(_))
            {
                self.state = WalkState::Exhausted;
            }

            let state = std::mem::replace(&mut self.state, WalkState::Exhausted);
            let next = match state {
                WalkState::Start if !self.in_scope() => {
                    log::debug!("Volume {} is out of scope; not fetched", self.volume.number);
                    WalkState::Exhausted
                }
                WalkState::Start => WalkState::FetchingPage(self.volume.url.clone()),
                WalkState::FetchingPage(url) => self.load_page(session, throttle, url).await,
                WalkState::HasPage => {
                    if let Some(reference) = self.buffer.pop_front() {
                        self.state = WalkState::HasPage;
                        self.yielded += 1;
                        return Some(reference);
                    }
                    match self.next.take() {
                        Some(url) => WalkState::FetchingPage(url),
                        None => WalkState::Exhausted,
                    }
                }
                terminal @ (WalkState::Exhausted | WalkState::Failed(_)) => {
                    self.state = terminal;
                    return None;
                }
            };
            self.state = next;
        }
    }

    fn in_scope(&self) -> bool {
        self.scope.includes_volume(self.volume.number) && self.scope.includes_year(self.volume.year)
    }

    async fn load_page(
        &mut self,
        session: &mut dyn Session,
        throttle: &mut Throttle,
        url: String,
    ) -> WalkState {
        if !self.visited.insert(url.clone()) {
            log::warn!(
                "Volume {} pagination loops back to {}; stopping",
                self.volume.number,
                url
            );
            return WalkState::Exhausted;
        }

        let selectors = self.selectors;
        let parsed = fetch_page_with_retry(self.policy, session, throttle, &url, |page: Page| {
            parse_listing(&page.html, &page.url, selectors)
        })
        .await;

        match parsed {
            Ok(page) => {
                self.pages += 1;
                log::info!(
                    "Volume {} page {}: {} article(s)",
                    self.volume.number,
                    self.pages,
                    page.entries.len()
                );
                let volume = &self.volume;
                self.buffer.extend(page.entries.into_iter().map(|entry| ArticleReference {
                    title: entry.title,
                    url: entry.url,
                    volume: volume.number,
                    year: volume.year,
                    issue: volume.issue.clone(),
                    article_id: entry.article_id,
                }));
                self.next = page.next;
                WalkState::HasPage
            }
            Err(error) => {
                log::error!(
                    "Volume {} listing failed, keeping earlier pages: {}",
                    self.volume.number,
                    error
                );
                WalkState::Failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use crate::models::ThrottleConfig;
    use crate::services::session::MemorySession;
    use crate::services::throttle::InstantSleeper;
    use std::time::Duration;

    const ISSUES: &str = r#"
        <div class="accordion-panel">
          <button class="accordion-panel-header">2025 - Volumes 248-263</button>
          <ul>
            <li><a href="/journal/catena/vol/263/suppl/C">Volume 263</a> December 2025</li>
            <li><a href="/journal/catena/vol/262/suppl/C">Volume 262</a> November 2025</li>
          </ul>
        </div>
        <div class="accordion-panel">
          <button class="accordion-panel-header">2024</button>
          <ul><li><a href="/journal/catena/vol/247/suppl/C">Volume 247</a> December 2024</li></ul>
        </div>
    "#;

    fn listing(urls: &[&str], next: Option<&str>) -> String {
        let items: String = urls
            .iter()
            .map(|u| {
                format!(
                    r#"<li class="js-article-list-item"><h3><a class="article-content-title" href="{u}">Title {u}</a></h3></li>"#
                )
            })
            .collect();
        let next = next
            .map(|n| format!(r#"<a class="next-link" href="{n}">Next</a>"#))
            .unwrap_or_default();
        format!(r#"<ol class="article-list">{items}</ol>{next}"#)
    }

    fn selectors() -> ListingSelectors {
        ListingSelectors::compile(&SelectorConfig::default(), "catena").unwrap()
    }

    fn throttle() -> Throttle {
        let config = ThrottleConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            seed: Some(3),
            ..ThrottleConfig::default()
        };
        Throttle::new(config, Box::new(InstantSleeper::new()))
    }

    fn volume(url: &str) -> VolumeRef {
        VolumeRef {
            number: 263,
            year: Some(2025),
            issue: None,
            url: url.to_string(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1))
    }

    #[test]
    fn test_parse_index_year_sections() {
        let page = parse_index(ISSUES, "https://www.sciencedirect.com/journal/catena/issues", &selectors())
            .unwrap();
        assert_eq!(page.volumes.len(), 3);
        assert_eq!(page.volumes[0].number, 263);
        assert_eq!(page.volumes[0].year, Some(2025));
        assert_eq!(page.volumes[0].issue.as_deref(), Some("December 2025"));
        assert_eq!(
            page.volumes[0].url,
            "https://www.sciencedirect.com/journal/catena/vol/263/suppl/C"
        );
        assert_eq!(page.volumes[2].year, Some(2024));
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_parse_index_fallback_links() {
        let html = r#"<ul><li><a href="/journal/catena/vol/200">Volume 200</a> (2021)</li></ul>
            <a rel="next" href="?page=2">Next</a>"#;
        let page = parse_index(html, "https://www.sciencedirect.com/journal/catena/issues", &selectors())
            .unwrap();
        assert_eq!(page.volumes.len(), 1);
        assert_eq!(page.volumes[0].year, Some(2021));
        assert_eq!(
            page.next.as_deref(),
            Some("https://www.sciencedirect.com/journal/catena/issues?page=2")
        );
    }

    #[test]
    fn test_parse_index_without_volumes_is_malformed() {
        let err = parse_index("<p>maintenance</p>", "https://example.com/issues", &selectors())
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Malformed);
    }

    #[test]
    fn test_parse_listing() {
        let html = listing(
            &["/science/article/pii/S0341816225000011", "/science/article/pii/S0341816225000023"],
            Some("/journal/catena/vol/263/suppl/C?page=2"),
        );
        let page = parse_listing(&html, "https://www.sciencedirect.com/journal/catena/vol/263/suppl/C", &selectors())
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].article_id.as_deref(), Some("S0341816225000011"));
        assert!(page.entries[0].url.starts_with("https://www.sciencedirect.com/science/article/pii/"));
        assert!(page.next.unwrap().ends_with("?page=2"));
    }

    #[test]
    fn test_parse_listing_drops_unresolvable_links() {
        let html = listing(
            &["https://[::1/science/article/pii/S1", "/science/article/pii/S0341816225000035"],
            Some("http://"),
        );
        let page = parse_listing(&html, "https://www.sciencedirect.com/journal/catena/vol/263/suppl/C", &selectors())
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(
            page.entries[0].url,
            "https://www.sciencedirect.com/science/article/pii/S0341816225000035"
        );
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_parse_listing_without_list_is_malformed() {
        let err = parse_listing("<p>empty</p>", "https://example.com/vol/1", &selectors()).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_walker_follows_pages() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let p2 = "https://example.com/journal/catena/vol/263?page=2";
        let mut session = MemorySession::new()
            .page(p1, listing(&["/a/1", "/a/2"], Some(p2)))
            .page(p2, listing(&["/a/3"], None));
        let mut throttle = throttle();
        let (scope, sel, policy) = (ScopeConfig::default(), selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, None);
        let mut urls = Vec::new();
        while let Some(r) = walker.next_reference(&mut session, &mut throttle).await {
            assert_eq!(r.volume, 263);
            urls.push(r.url);
        }
        assert_eq!(urls.len(), 3);
        assert_eq!(walker.state(), &WalkState::Exhausted);
        assert_eq!(walker.pages(), 2);
        // Not restartable.
        assert!(walker.next_reference(&mut session, &mut throttle).await.is_none());
        assert_eq!(session.visits().len(), 2);
    }

    #[tokio::test]
    async fn test_walker_respects_budget() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let p2 = "https://example.com/journal/catena/vol/263?page=2";
        let mut session = MemorySession::new()
            .page(p1, listing(&["/a/1", "/a/2"], Some(p2)))
            .page(p2, listing(&["/a/3"], None));
        let mut throttle = throttle();
        let (scope, sel, policy) = (ScopeConfig::default(), selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, Some(2));
        let mut count = 0;
        while walker.next_reference(&mut session, &mut throttle).await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(session.visit_count(p2), 0);
    }

    #[tokio::test]
    async fn test_walker_failure_keeps_earlier_pages() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let p2 = "https://example.com/journal/catena/vol/263?page=2";
        let mut session = MemorySession::new()
            .page(p1, listing(&["/a/1"], Some(p2)))
            .status(p2, 403);
        let mut throttle = throttle();
        let (scope, sel, policy) = (ScopeConfig::default(), selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, None);
        assert!(walker.next_reference(&mut session, &mut throttle).await.is_some());
        assert!(walker.next_reference(&mut session, &mut throttle).await.is_none());
        let failure = walker.failure().unwrap();
        assert_eq!(failure.url, p2);
        assert_eq!(failure.source.kind, FetchErrorKind::Blocked);
        assert_eq!(session.visit_count(p2), 2);
    }

    #[tokio::test]
    async fn test_walker_stops_on_pagination_loop() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let mut session = MemorySession::new().page(p1, listing(&["/a/1"], Some(p1)));
        let mut throttle = throttle();
        let (scope, sel, policy) = (ScopeConfig::default(), selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, None);
        let mut count = 0;
        while walker.next_reference(&mut session, &mut throttle).await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
        assert_eq!(walker.state(), &WalkState::Exhausted);
    }

    #[tokio::test]
    async fn test_walker_filters_out_of_scope_volume() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let mut session = MemorySession::new().page(p1, listing(&["/a/1"], None));
        let mut throttle = throttle();
        let scope = ScopeConfig {
            year_range: Some([2020, 2021]),
            ..ScopeConfig::default()
        };
        let (sel, policy) = (selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, None);
        assert!(walker.next_reference(&mut session, &mut throttle).await.is_none());
        assert_eq!(walker.state(), &WalkState::Exhausted);
        assert_eq!(walker.pages(), 0);
        assert!(session.visits().is_empty());
        assert_eq!(throttle.requests(), 0);
    }

    #[tokio::test]
    async fn test_walker_skips_volume_outside_volume_range() {
        let p1 = "https://example.com/journal/catena/vol/263";
        let mut session = MemorySession::new().page(p1, listing(&["/a/1"], None));
        let mut throttle = throttle();
        let scope = ScopeConfig {
            volume_range: Some([200, 250]),
            ..ScopeConfig::default()
        };
        let (sel, policy) = (selectors(), policy());

        let mut walker = ListingWalker::new(volume(p1), &scope, &sel, &policy, None);
        assert!(walker.next_reference(&mut session, &mut throttle).await.is_none());
        assert_eq!(session.visit_count(p1), 0);
        assert!(walker.failure().is_none());
    }

    #[tokio::test]
    async fn test_volume_index_discovery_filters_and_sorts() {
        let url = "https://www.sciencedirect.com/journal/catena/issues";
        let mut session = MemorySession::new().page(url, ISSUES);
        let mut throttle = throttle();
        let site = SiteConfig::default();
        let scope = ScopeConfig {
            volume_range: Some([250, 263]),
            ..ScopeConfig::default()
        };
        let (sel, policy) = (selectors(), policy());

        let outcome = VolumeIndex::new(&site, &scope, &sel, &policy)
            .discover(&mut session, &mut throttle)
            .await;
        let numbers: Vec<u32> = outcome.volumes.iter().map(|v| v.number).collect();
        assert_eq!(numbers, vec![263, 262]);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.pages, 1);
    }
}
