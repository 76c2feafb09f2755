// src/core/service.rs

//! Front door for a full scan: cache lookup, rate limiting, then the
//! orchestrator. Cache and limiter are traits so callers can plug in
//! persistent backends; in-memory versions are provided.

use crate::config::Settings;
use crate::core::error::{ConfigError, ServiceError};
use crate::core::models::{ScanAggregate, ScannerId, ScannerResult};
use crate::core::orchestrator::{normalize_domain, Orchestrator};
use crate::core::probe::HttpTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        /// Scans left in the current window.
        remaining: u32,
    },
    Limited {
        retry_after: Duration,
    },
}

#[async_trait]
pub trait ScanCache: Send + Sync {
    async fn get(&self, domain: &str) -> Option<ScanAggregate>;
    async fn set(&self, domain: &str, aggregate: &ScanAggregate);
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self) -> RateLimitDecision;
}

/// Process-local cache keyed by normalized domain, with a fixed TTL.
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, ScanAggregate)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl ScanCache for MemoryCache {
    async fn get(&self, domain: &str) -> Option<ScanAggregate> {
        let mut entries = self.entries.lock().ok()?;
        let (stored, _) = entries.get(domain)?;
        if stored.elapsed() >= self.ttl {
            debug!(domain, "Cached scan expired.");
            entries.remove(domain);
            return None;
        }
        entries.get(domain).map(|(_, aggregate)| aggregate.clone())
    }

    async fn set(&self, domain: &str, aggregate: &ScanAggregate) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(domain.to_string(), (Instant::now(), aggregate.clone()));
        }
    }
}

/// Allows `max_scans` fresh scans per fixed window.
pub struct WindowRateLimiter {
    max_scans: u32,
    window: Duration,
    state: Mutex<(Instant, u32)>,
}

impl WindowRateLimiter {
    pub fn new(max_scans: u32, window: Duration) -> Self {
        Self { max_scans, window, state: Mutex::new((Instant::now(), 0)) }
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn check(&self) -> RateLimitDecision {
        let Ok(mut state) = self.state.lock() else {
            error!("Rate limiter state is poisoned, refusing scan.");
            return RateLimitDecision::Limited { retry_after: self.window };
        };
        let now = Instant::now();
        let (window_start, count) = &mut *state;
        if now.duration_since(*window_start) >= self.window {
            *window_start = now;
            *count = 0;
        }
        if *count >= self.max_scans {
            let retry_after = (*window_start + self.window).saturating_duration_since(now);
            return RateLimitDecision::Limited { retry_after };
        }
        *count += 1;
        RateLimitDecision::Allowed { remaining: self.max_scans - *count }
    }
}

pub struct ScanService {
    orchestrator: Orchestrator,
    cache: Arc<dyn ScanCache>,
    limiter: Arc<dyn RateLimiter>,
}

impl ScanService {
    pub fn new(orchestrator: Orchestrator, cache: Arc<dyn ScanCache>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { orchestrator, cache, limiter }
    }

    /// Built-in scanners with the in-memory cache and limiter from `settings`.
    pub fn from_settings(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Result<Self, ConfigError> {
        let orchestrator = Orchestrator::with_default_scanners(settings, transport)?;
        Ok(Self::new(
            orchestrator,
            Arc::new(MemoryCache::new(settings.cache_ttl)),
            Arc::new(WindowRateLimiter::new(settings.rate_limit_max_scans, settings.rate_limit_window)),
        ))
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    async fn check_rate_limit(&self, domain: &str) -> Result<(), ServiceError> {
        match self.limiter.check().await {
            RateLimitDecision::Limited { retry_after } => {
                warn!(target = %domain, retry_after_secs = retry_after.as_secs(), "Scan rate limited.");
                Err(ServiceError::RateLimited { retry_after })
            }
            RateLimitDecision::Allowed { remaining } => {
                debug!(target = %domain, remaining, "Rate limit check passed.");
                Ok(())
            }
        }
    }

    /// Returns a cached aggregate unless `force_refresh` is set; otherwise
    /// checks the rate limit, runs every scanner and caches the result.
    pub async fn scan<F>(&self, domain: &str, force_refresh: bool, on_progress: F) -> Result<ScanAggregate, ServiceError>
    where
        F: FnMut(&[ScannerResult]),
    {
        let domain = normalize_domain(domain);
        if !force_refresh {
            if let Some(cached) = self.cache.get(&domain).await {
                info!(target = %domain, "Serving scan from cache.");
                return Ok(cached);
            }
        }

        self.check_rate_limit(&domain).await?;

        let aggregate = self.orchestrator.run_all(&domain, on_progress).await;
        self.cache.set(&domain, &aggregate).await;
        Ok(aggregate)
    }

    /// Re-runs one scanner. Always a fresh run, so it is rate limited and
    /// never served from or written to the cache.
    pub async fn scan_one<F>(&self, id: &ScannerId, domain: &str, on_progress: F) -> Result<ScannerResult, ServiceError>
    where
        F: FnMut(&[ScannerResult]),
    {
        let domain = normalize_domain(domain);
        if self.orchestrator.descriptors().all(|d| &d.id != id) {
            return Err(ConfigError::UnknownScanner(id.to_string()).into());
        }
        self.check_rate_limit(&domain).await?;
        Ok(self.orchestrator.run_one(id, &domain, on_progress).await?)
    }
}
