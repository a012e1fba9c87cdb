// src/services/throttle.rs

//! Request pacing, identity rotation and block backoff.
//!
//! The throttle is owned by the run and handed by `&mut` to every fetch.
//! Before each request it waits a random delay and, on the configured
//! cadence, switches to a new identity. A blocked response raises the
//! backoff level, waits, and forces a rotation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::ThrottleConfig;

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en-US,en;q=0.8"];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1680, 1050), (1440, 900), (1366, 768)];

/// Fingerprint-affecting parameters presented with each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub accept_language: String,
    pub viewport: (u32, u32),
}

/// Suspends the calling flow.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately and records what was requested.
#[derive(Debug, Default, Clone)]
pub struct InstantSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested delay, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Pacing state for one run.
pub struct Throttle {
    config: ThrottleConfig,
    sleeper: Box<dyn Sleeper>,
    rng: StdRng,
    identity: Identity,
    requests: u64,
    since_rotation: u32,
    backoff_level: u32,
    rotations: u64,
}

impl Throttle {
    pub fn new(config: ThrottleConfig, sleeper: Box<dyn Sleeper>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let identity = Self::pick_identity(&config, &mut rng, None);

        Self {
            config,
            sleeper,
            rng,
            identity,
            requests: 0,
            since_rotation: 0,
            backoff_level: 0,
            rotations: 0,
        }
    }

    /// Wait before a request and rotate identity on cadence.
    ///
    /// Returns the identity to present for this request.
    pub async fn before_request(&mut self) -> Identity {
        let low = self.config.min_delay_ms;
        let high = self.config.max_delay_ms.max(low);
        let delay = Duration::from_millis(self.rng.random_range(low..=high));
        self.sleeper.sleep(delay).await;

        if self.since_rotation >= self.config.rotate_every {
            self.rotate();
        }
        self.since_rotation += 1;
        self.requests += 1;

        self.identity.clone()
    }

    /// Escalate after a blocked response: wait out the backoff and rotate.
    pub async fn on_blocked(&mut self) {
        self.backoff_level = self.backoff_level.saturating_add(1);
        let delay = self.current_backoff();
        log::warn!(
            "Blocked response; backing off {:?} (level {})",
            delay,
            self.backoff_level
        );
        self.sleeper.sleep(delay).await;
        self.rotate();
    }

    /// A request went through; drop back to normal pacing.
    pub fn on_success(&mut self) {
        self.backoff_level = 0;
    }

    /// Suspend for a retry delay through the same sleeper.
    pub async fn pause(&self, delay: Duration) {
        self.sleeper.sleep(delay).await;
    }

    /// Backoff for the current level, capped.
    pub fn current_backoff(&self) -> Duration {
        if self.backoff_level == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64
            .checked_shl(self.backoff_level - 1)
            .unwrap_or(u64::MAX);
        let millis = self
            .config
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.config.backoff_max_ms);
        Duration::from_millis(millis)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn backoff_level(&self) -> u32 {
        self.backoff_level
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    fn rotate(&mut self) {
        self.identity = Self::pick_identity(&self.config, &mut self.rng, Some(&self.identity));
        self.since_rotation = 0;
        self.rotations += 1;
        log::debug!("Rotated identity to {}", self.identity.user_agent);
    }

    fn pick_identity(config: &ThrottleConfig, rng: &mut StdRng, current: Option<&Identity>) -> Identity {
        let agents: Vec<&String> = config
            .user_agents
            .iter()
            .filter(|ua| !ua.trim().is_empty())
            .collect();

        // Prefer a different agent when there is a choice.
        let candidates: Vec<&String> = match current {
            Some(cur) if agents.len() > 1 => agents
                .iter()
                .copied()
                .filter(|ua| **ua != cur.user_agent)
                .collect(),
            _ => agents,
        };

        let user_agent = if candidates.is_empty() {
            String::new()
        } else {
            candidates[rng.random_range(0..candidates.len())].clone()
        };

        Identity {
            user_agent,
            accept_language: ACCEPT_LANGUAGES[rng.random_range(0..ACCEPT_LANGUAGES.len())].into(),
            viewport: VIEWPORTS[rng.random_range(0..VIEWPORTS.len())],
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("identity", &self.identity)
            .field("requests", &self.requests)
            .field("backoff_level", &self.backoff_level)
            .field("rotations", &self.rotations)
            .finish()
    }
}
