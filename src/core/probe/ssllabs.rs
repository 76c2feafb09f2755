// src/core/probe/ssllabs.rs

use super::{relayed, HttpTransport, ProbeContext, ProbeRequest};
use crate::core::error::ProbeError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
    pub status: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<GradedEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedEndpoint {
    #[serde(default)]
    pub ip_address: String,
    pub grade: Option<String>,
    pub status_message: Option<String>,
    pub details: Option<EndpointDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainInfo {
    pub issues: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HstsPolicy {
    pub status: Option<String>,
    pub max_age: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDetails {
    #[serde(default)]
    pub protocols: Vec<Protocol>,
    #[serde(default)]
    pub vuln_beast: bool,
    #[serde(default)]
    pub poodle: bool,
    #[serde(default)]
    pub heartbleed: bool,
    #[serde(default)]
    pub freak: bool,
    #[serde(default)]
    pub drown_vulnerable: bool,
    #[serde(default)]
    pub logjam: bool,
    /// 0 or missing: none; bit 1: some browsers; bit 2: modern browsers; bit 4: all.
    pub forward_secrecy: Option<u32>,
    pub hsts_policy: Option<HstsPolicy>,
    pub chain: Option<ChainInfo>,
    #[serde(default)]
    pub cert_chains: Vec<ChainInfo>,
}

/// Result of the submit-and-poll protocol.
#[derive(Debug, Clone)]
pub enum GradingOutcome {
    Ready(GradingReport),
    /// The service reported `ERROR`.
    Failed { message: String },
    /// Poll budget exhausted while the assessment was still running.
    Pending { status: String, polls: u32 },
}

#[derive(Clone)]
pub struct GradingClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    relay_url: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

impl GradingClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_url: &str,
        relay_url: Option<&str>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.to_string(),
            relay_url: relay_url.map(str::to_string),
            poll_interval,
            max_polls: max_polls.max(1),
        }
    }

    fn analyze_url(&self, domain: &str) -> Result<String, ProbeError> {
        let url = url::Url::parse_with_params(
            &self.api_url,
            &[("host", domain), ("fromCache", "on"), ("maxAge", "24"), ("all", "done")],
        )
        .map_err(|e| ProbeError::Transport { url: self.api_url.clone(), message: e.to_string() })?;
        Ok(relayed(self.relay_url.as_deref(), url.as_str()))
    }

    /// Requests a (cached-first) assessment and polls until it settles.
    pub async fn assess(&self, domain: &str, ctx: &ProbeContext) -> Result<GradingOutcome, ProbeError> {
        let url = self.analyze_url(domain)?;
        let mut status = String::new();

        for attempt in 1..=self.max_polls {
            let report: GradingReport = self
                .transport
                .get(ProbeRequest::json(url.clone()), ctx)
                .await?
                .ensure_success()?
                .json()?;
            debug!(domain, attempt, status = %report.status, "TLS grading poll.");

            match report.status.as_str() {
                "READY" => {
                    info!(domain, endpoints = report.endpoints.len(), "TLS grading ready.");
                    return Ok(GradingOutcome::Ready(report));
                }
                "ERROR" => {
                    let message = report
                        .status_message
                        .unwrap_or_else(|| "Assessment failed".to_string());
                    return Ok(GradingOutcome::Failed { message });
                }
                _ => status = report.status,
            }

            if attempt < self.max_polls {
                ctx.sleep(self.poll_interval).await?;
            }
        }

        info!(domain, polls = self.max_polls, "TLS grading poll budget exhausted.");
        Ok(GradingOutcome::Pending { status, polls: self.max_polls })
    }
}
