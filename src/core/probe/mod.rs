// src/core/probe/mod.rs

//! Probe clients: each issues one logical query against a public data source
//! and normalizes the response. All HTTP goes through [`HttpTransport`], so
//! scanners can be exercised against [`mock::MockTransport`].

pub mod ct;
pub mod dns;
pub mod mock;
pub mod rdap;
pub mod securityheaders;
pub mod ssllabs;

use crate::core::error::ProbeError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_DNS_JSON: &str = "application/dns-json";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml";

/// Per-run context handed to every probe call.
///
/// Cancellation is best-effort: requests in flight on the bundled transport
/// stop at their next await point, but a custom transport may ignore it.
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    token: CancellationToken,
}

impl ProbeContext {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleeps for `duration` unless the run is cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ProbeError> {
        tokio::select! {
            _ = self.token.cancelled() => Err(ProbeError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub url: String,
    pub accept: &'static str,
}

impl ProbeRequest {
    pub fn new(url: impl Into<String>, accept: &'static str) -> Self {
        Self { url: url.into(), accept }
    }

    pub fn json(url: impl Into<String>) -> Self {
        Self::new(url, ACCEPT_JSON)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with `ProbeError::Status` unless the response is 2xx.
    pub fn ensure_success(self) -> Result<Self, ProbeError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProbeError::Status { url: self.url, status: self.status })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProbeError> {
        serde_json::from_str(&self.body).map_err(|e| ProbeError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// Minimal GET-only HTTP seam used by every probe client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: ProbeRequest, ctx: &ProbeContext) -> Result<HttpResponse, ProbeError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProbeError::Transport {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: ProbeRequest, ctx: &ProbeContext) -> Result<HttpResponse, ProbeError> {
        let url = request.url;
        debug!(url = %url, "Sending probe request.");
        let fetch = async {
            let response = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, request.accept)
                .send()
                .await
                .map_err(|e| ProbeError::Transport { url: url.clone(), message: e.to_string() })?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| ProbeError::Transport { url: url.clone(), message: e.to_string() })?;
            Ok(HttpResponse { url: url.clone(), status, body })
        };

        tokio::select! {
            _ = ctx.token().cancelled() => {
                warn!(url = %url, "Probe request cancelled.");
                Err(ProbeError::Cancelled)
            }
            result = fetch => result,
        }
    }
}

/// Substitutes `{domain}` in an endpoint template.
pub fn fill_domain(template: &str, domain: &str) -> String {
    template.replace("{domain}", domain)
}

/// Routes `target` through the configured relay, if any.
pub fn relayed(relay_url: Option<&str>, target: &str) -> String {
    match relay_url {
        Some(relay) => {
            let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
            relay.replace("{url}", &encoded)
        }
        None => target.to_string(),
    }
}
