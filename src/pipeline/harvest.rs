// src/pipeline/harvest.rs

//! Harvest orchestration.
//!
//! One sequential flow per run: read the volume index, walk each volume's
//! listing, fetch every new article's detail page with retries, build the
//! record and keep it unless its key was already seen. The first record for
//! a key wins; later duplicates are counted and dropped without merging.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::error::{FetchError, Result};
use crate::models::{
    AggregatedResult, ArticleRecord, ArticleReference, Config, DedupKey, PageFailure, StopReason,
};
use crate::services::{
    DetailFetcher, ListingSelectors, ListingWalker, RetryDecision, RetryPolicy, Session, Sleeper,
    Throttle, VolumeIndex, fetch_once,
};
use crate::utils::truncate_title;

const LOG_TITLE_LEN: usize = 60;

/// Cooperative stop request, observed between articles.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns everything a run needs except the session.
pub struct Harvester {
    config: Config,
    throttle: Throttle,
    policy: RetryPolicy,
    listing: ListingSelectors,
    detail: DetailFetcher,
    stop: StopSignal,
}

impl Harvester {
    pub fn new(config: Config, sleeper: Box<dyn Sleeper>, stop: StopSignal) -> Result<Self> {
        let listing = ListingSelectors::compile(&config.selectors, &config.site.journal_slug)?;
        let detail = DetailFetcher::new(&config.selectors)?;
        let throttle = Throttle::new(config.throttle.clone(), sleeper);
        let policy = RetryPolicy::from_config(&config.retry);

        Ok(Self {
            config,
            throttle,
            policy,
            listing,
            detail,
            stop,
        })
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Run to completion, cutoff or stop.
    ///
    /// Nothing here is fatal: failed pages become shortfalls and failed
    /// articles are counted and skipped.
    pub async fn run(&mut self, session: &mut dyn Session) -> AggregatedResult {
        let Self {
            config,
            throttle,
            policy,
            listing,
            detail,
            stop,
        } = self;

        let mut result = AggregatedResult::empty(Utc::now());
        let limit = config.scope.article_limit();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_keys: HashSet<DedupKey> = HashSet::new();
        let mut yielded = 0usize;

        log::info!(
            "Harvesting {} (limit: {})",
            config.site.source_name,
            limit.map_or_else(|| "none".to_string(), |l| l.to_string())
        );

        if config.site.warm_up {
            let home = config.site.base_url.clone();
            match fetch_once(session, throttle, &home, |_| Ok(())).await {
                Ok(()) => log::debug!("Warm-up visit to {} done", home),
                Err(e) => log::warn!("Warm-up visit failed: {}", e),
            }
        }

        let index = VolumeIndex::new(&config.site, &config.scope, listing, policy)
            .discover(session, throttle)
            .await;
        result.stats.pages_scanned += index.pages;
        if let Some(error) = index.failure {
            result.stats.failed_pages += 1;
            result.shortfalls.push(PageFailure {
                volume: None,
                url: error.url.clone(),
                reason: error.to_string(),
            });
        }

        for volume in index.volumes {
            if stop.is_stopped() {
                result.stats.stopped = Some(StopReason::Cancelled);
                break;
            }
            if limit.is_some_and(|l| result.records.len() >= l || yielded >= l) {
                result.stats.stopped = Some(StopReason::Cutoff);
                break;
            }

            log::info!(
                "Volume {} ({})",
                volume.number,
                volume.issue.as_deref().unwrap_or("no issue label")
            );
            result.stats.volumes_scanned += 1;

            let budget = limit.map(|l| l.saturating_sub(yielded));
            let mut walker = ListingWalker::new(volume, &config.scope, listing, policy, budget);

            loop {
                // Checked before every pull so a stop never triggers another page load.
                if stop.is_stopped() {
                    result.stats.stopped = Some(StopReason::Cancelled);
                    break;
                }
                let Some(reference) = walker.next_reference(session, throttle).await else {
                    break;
                };
                yielded += 1;

                if !seen_urls.insert(reference.url.clone()) {
                    result.stats.duplicates += 1;
                    log::debug!("Duplicate locator {}", reference.url);
                    continue;
                }

                result.stats.attempted += 1;
                match fetch_article(detail, policy, session, throttle, &reference).await {
                    Ok(record) => {
                        let key = record.dedup_key();
                        if !seen_keys.insert(key.clone()) {
                            result.stats.duplicates += 1;
                            log::info!("Duplicate {}; keeping the first record", key);
                        } else {
                            if !record.is_complete() {
                                result.stats.incomplete += 1;
                            }
                            log::info!(
                                "[{}] {} (review days: {})",
                                result.records.len() + 1,
                                truncate_title(record.title(), LOG_TITLE_LEN),
                                record
                                    .review_days()
                                    .map_or_else(|| "n/a".to_string(), |d| d.to_string())
                            );
                            result.records.push(record);
                        }
                    }
                    Err(error) => {
                        result.stats.failed += 1;
                        log::warn!(
                            "Skipping '{}': {}",
                            truncate_title(&reference.title, LOG_TITLE_LEN),
                            error
                        );
                    }
                }

                if limit.is_some_and(|l| result.records.len() >= l) {
                    result.stats.stopped = Some(StopReason::Cutoff);
                    break;
                }
            }

            result.stats.pages_scanned += walker.pages();
            if let Some(error) = walker.failure() {
                result.stats.failed_pages += 1;
                result.shortfalls.push(PageFailure {
                    volume: Some(walker.volume().number),
                    url: error.url.clone(),
                    reason: error.to_string(),
                });
            }

            if result.stats.stopped.is_some() {
                break;
            }
        }

        if result.stats.stopped.is_none() && limit.is_some_and(|l| yielded >= l) {
            result.stats.stopped = Some(StopReason::Cutoff);
        }

        result.stats.succeeded = result.records.len();
        result.stats.finished_at = Utc::now();
        log::info!(
            "Harvest finished: {} record(s), {} failed, {} duplicate(s), {} page failure(s)",
            result.stats.succeeded,
            result.stats.failed,
            result.stats.duplicates,
            result.stats.failed_pages
        );
        result
    }
}

/// Fetch one article under the retry policy and build its record.
async fn fetch_article(
    detail: &DetailFetcher,
    policy: &RetryPolicy,
    session: &mut dyn Session,
    throttle: &mut Throttle,
    reference: &ArticleReference,
) -> std::result::Result<ArticleRecord, FetchError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match detail.fetch(session, throttle, reference).await {
            Ok(raw) => return Ok(ArticleRecord::build(reference, raw)),
            Err(error) => error,
        };

        match policy.decide(attempt, &error) {
            RetryDecision::GiveUp => return Err(error),
            RetryDecision::GiveUpBlocked => {
                log::warn!("Blocked on {}; giving up after {} attempts", reference.url, attempt);
                throttle.on_blocked().await;
                return Err(error);
            }
            RetryDecision::EscalateBlocked => {
                log::warn!(
                    "Blocked on {} (attempt {}/{})",
                    reference.url,
                    attempt,
                    policy.max_attempts
                );
                throttle.on_blocked().await;
            }
            RetryDecision::RetryAfter(delay) => {
                log::warn!(
                    "{} (attempt {}/{}); retrying in {:?}",
                    error,
                    attempt,
                    policy.max_attempts,
                    delay
                );
                throttle.pause(delay).await;
            }
        }
    }
}

/// Run a harvest on `session` and close it afterwards, whatever happened.
pub async fn harvest(
    config: &Config,
    session: &mut dyn Session,
    sleeper: Box<dyn Sleeper>,
    stop: StopSignal,
) -> Result<AggregatedResult> {
    let outcome = match Harvester::new(config.clone(), sleeper, stop) {
        Ok(mut harvester) => Ok(harvester.run(session).await),
        Err(e) => Err(e),
    };

    if let Err(e) = session.close().await {
        log::warn!("Failed to close session: {}", e);
    }
    outcome
}
