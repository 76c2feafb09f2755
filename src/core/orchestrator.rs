// src/core/orchestrator.rs

//! Runs registered scanners concurrently against one domain.
//!
//! Every scanner races its own deadline. Progress is reported once up front
//! with every scanner `running`, then once per terminal transition in
//! completion order. The aggregate keeps registration order.

use crate::config::{timeout_from_secs, Settings};
use crate::core::error::ConfigError;
use crate::core::models::{ScanAggregate, ScanOutcome, ScannerId, ScannerResult};
use crate::core::probe::{HttpTransport, ProbeContext};
use crate::core::scanner::{default_scanners, Scanner, ScannerDescriptor};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    scanners: Vec<Arc<dyn Scanner>>,
    default_timeout: Duration,
}

/// Trims and lower-cases a domain once, before dispatch.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

impl Orchestrator {
    pub fn new(default_timeout: Duration) -> Self {
        Self { scanners: Vec::new(), default_timeout }
    }

    /// An orchestrator with the six built-in scanners registered.
    pub fn with_default_scanners(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Result<Self, ConfigError> {
        let mut orchestrator = Self::new(settings.default_timeout);
        for scanner in default_scanners(settings, transport) {
            orchestrator.register(scanner)?;
        }
        Ok(orchestrator)
    }

    /// Adds a scanner. Ids must be unique across the registry.
    pub fn register(&mut self, scanner: Arc<dyn Scanner>) -> Result<(), ConfigError> {
        let id = &scanner.descriptor().id;
        if self.scanners.iter().any(|s| &s.descriptor().id == id) {
            warn!(scanner = %id, "Rejected duplicate scanner registration.");
            return Err(ConfigError::DuplicateScanner(id.to_string()));
        }
        debug!(scanner = %id, "Scanner registered.");
        self.scanners.push(scanner);
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) -> Result<(), ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(format!("{:?}", timeout)));
        }
        self.default_timeout = timeout;
        Ok(())
    }

    /// Same as `set_default_timeout`, for fractional seconds from user input.
    pub fn set_default_timeout_secs(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.set_default_timeout(timeout_from_secs(secs)?)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ScannerDescriptor> {
        self.scanners.iter().map(|s| s.descriptor())
    }

    fn timeout_for(&self, descriptor: &ScannerDescriptor) -> Duration {
        descriptor.timeout.unwrap_or(self.default_timeout)
    }

    /// Runs one scanner under its deadline. On timeout the run's token is
    /// cancelled and the scanner future dropped.
    async fn execute(&self, scanner: &dyn Scanner, domain: &str) -> Result<ScanOutcome, String> {
        let descriptor = scanner.descriptor();
        let limit = self.timeout_for(descriptor);
        let ctx = ProbeContext::new(CancellationToken::new());
        let started = Instant::now();

        let settled = tokio::time::timeout(limit, scanner.run(domain, &ctx)).await;
        let elapsed_ms = started.elapsed().as_millis();
        match settled {
            Ok(Ok(outcome)) => {
                info!(scanner = %descriptor.id, elapsed_ms, "Scanner completed.");
                Ok(outcome)
            }
            Ok(Err(e)) => {
                warn!(scanner = %descriptor.id, error = %e, "Scanner failed.");
                Err(e.to_string())
            }
            Err(_) => {
                ctx.token().cancel();
                warn!(scanner = %descriptor.id, timeout_ms = limit.as_millis(), "Scanner timed out.");
                Err(format!("timed out after {}ms", limit.as_millis()))
            }
        }
    }

    /// Merges a settled run into its result. Returns `false` when the result
    /// was already terminal.
    fn apply(scanner: &dyn Scanner, result: &mut ScannerResult, settled: Result<ScanOutcome, String>, domain: &str) -> bool {
        match settled {
            Ok(outcome) => {
                let issues = outcome
                    .issues
                    .clone()
                    .or_else(|| scanner.derive_issues(&outcome, domain))
                    .unwrap_or_default();
                result.complete(outcome, issues)
            }
            Err(message) => result.fail(message),
        }
    }

    fn running_result(scanner: &dyn Scanner) -> ScannerResult {
        let descriptor = scanner.descriptor();
        ScannerResult::running(descriptor.id.clone(), &descriptor.label, descriptor.data_source.clone())
    }

    /// Runs every registered scanner and resolves once all have settled.
    ///
    /// # Arguments
    /// * `domain` - Target domain; trimmed and lower-cased before dispatch.
    /// * `on_progress` - Receives a snapshot of all results on every transition.
    pub async fn run_all<F>(&self, domain: &str, mut on_progress: F) -> ScanAggregate
    where
        F: FnMut(&[ScannerResult]),
    {
        let domain = normalize_domain(domain);
        info!(target = %domain, scanners = self.scanners.len(), "Starting scan run.");

        let mut results: Vec<ScannerResult> = self.scanners.iter().map(|s| Self::running_result(s.as_ref())).collect();
        on_progress(&results);

        {
            let target = domain.as_str();
            let mut pending: FuturesUnordered<_> = self
                .scanners
                .iter()
                .enumerate()
                .map(|(index, scanner)| async move { (index, self.execute(scanner.as_ref(), target).await) })
                .collect();

            while let Some((index, settled)) = pending.next().await {
                let scanner = self.scanners[index].as_ref();
                if Self::apply(scanner, &mut results[index], settled, target) {
                    on_progress(&results);
                }
            }
        }

        let aggregate = ScanAggregate::new(domain, results);
        info!(target = %aggregate.domain, issues = aggregate.issues.len(), "Scan run finished.");
        aggregate
    }

    /// Re-runs a single scanner with the same deadline and merge rules as
    /// `run_all`. Other scanners are not touched.
    pub async fn run_one<F>(&self, id: &ScannerId, domain: &str, mut on_progress: F) -> Result<ScannerResult, ConfigError>
    where
        F: FnMut(&[ScannerResult]),
    {
        let scanner: &dyn Scanner = self
            .scanners
            .iter()
            .find(|s| &s.descriptor().id == id)
            .ok_or_else(|| ConfigError::UnknownScanner(id.to_string()))?
            .as_ref();
        let domain = normalize_domain(domain);
        info!(target = %domain, scanner = %id, "Running single scanner.");

        let mut result = Self::running_result(scanner);
        on_progress(std::slice::from_ref(&result));
        let settled = self.execute(scanner, &domain).await;
        if Self::apply(scanner, &mut result, settled, &domain) {
            on_progress(std::slice::from_ref(&result));
        }
        Ok(result)
    }
}
