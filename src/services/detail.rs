// src/services/detail.rs

//! Single-attempt detail page fetch.

use crate::error::{FetchError, Result};
use crate::models::{ArticleReference, RawFields, SelectorConfig};
use crate::services::document::{DetailSelectors, HtmlDetailPage};
use crate::services::retry::fetch_once;
use crate::services::session::{Page, Session};
use crate::services::throttle::Throttle;

/// Loads an article's detail page and extracts its raw fields.
///
/// Retrying is the caller's decision; each call is exactly one attempt.
#[derive(Debug)]
pub struct DetailFetcher {
    selectors: DetailSelectors,
}

impl DetailFetcher {
    pub fn new(config: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            selectors: DetailSelectors::compile(config)?,
        })
    }

    pub async fn fetch(
        &self,
        session: &mut dyn Session,
        throttle: &mut Throttle,
        reference: &ArticleReference,
    ) -> std::result::Result<RawFields, FetchError> {
        fetch_once(session, throttle, &reference.url, |page| self.extract(page)).await
    }

    /// Extract fields from an already loaded page.
    pub fn extract(&self, page: Page) -> std::result::Result<RawFields, FetchError> {
        let document = HtmlDetailPage::parse(&page.html, &self.selectors);
        let fields = RawFields::extract(&document);
        if fields.is_empty() {
            return Err(FetchError::malformed(
                page.url,
                "no recognizable article fields",
            ));
        }
        Ok(fields)
    }
}
