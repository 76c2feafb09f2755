// src/core/scanner/mod.rs

// Each scanner wraps one or more probe clients with its own analysis policy.
pub mod certificate_scanner;
pub mod dns_scanner;
pub mod email_scanner;
pub mod headers_scanner;
pub mod rdap_scanner;
pub mod tls_scanner;

use crate::config::Settings;
use crate::core::error::ScanError;
use crate::core::models::{DataSource, ScanOutcome, ScannerId};
use crate::core::probe::ct::CtClient;
use crate::core::probe::dns::DnsClient;
use crate::core::probe::rdap::RdapClient;
use crate::core::probe::securityheaders::HeaderGradingClient;
use crate::core::probe::ssllabs::GradingClient;
use crate::core::probe::{HttpTransport, ProbeContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::certificate_scanner::CertificateScanner;
pub use self::dns_scanner::DnsScanner;
pub use self::email_scanner::EmailAuthScanner;
pub use self::headers_scanner::SecurityHeadersScanner;
pub use self::rdap_scanner::RdapScanner;
pub use self::tls_scanner::TlsScanner;

/// Static metadata registered once per scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerDescriptor {
    pub id: ScannerId,
    pub label: String,
    pub description: String,
    /// Falls back to the orchestrator's default when `None`.
    pub timeout: Option<Duration>,
    pub data_source: DataSource,
}

impl ScannerDescriptor {
    pub fn new(id: ScannerId, label: &str, description: &str, timeout: Option<Duration>, data_source: DataSource) -> Self {
        Self {
            id,
            label: label.to_string(),
            description: description.to_string(),
            timeout,
            data_source,
        }
    }
}

/// A probe-plus-analysis unit run by the orchestrator.
///
/// `run` converts upstream failures into an outcome itself; an `Err` is
/// reserved for conditions the scanner cannot describe as a result.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn descriptor(&self) -> &ScannerDescriptor;

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError>;

    /// Fallback issue extraction for outcomes that carry no issue list.
    fn derive_issues(&self, _outcome: &ScanOutcome, _domain: &str) -> Option<Vec<String>> {
        None
    }
}

/// The six built-in scanners in registration order, sharing one transport.
pub fn default_scanners(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Vec<Arc<dyn Scanner>> {
    let endpoints = &settings.endpoints;
    let dns = DnsClient::new(transport.clone(), &endpoints.doh_url);
    vec![
        Arc::new(DnsScanner::new(dns.clone())),
        Arc::new(EmailAuthScanner::new(dns, settings.dkim_selectors.clone())),
        Arc::new(CertificateScanner::new(CtClient::new(transport.clone(), &endpoints.ct_url))),
        Arc::new(RdapScanner::new(RdapClient::new(transport.clone(), &endpoints.rdap_bootstrap_url))),
        Arc::new(TlsScanner::new(
            GradingClient::new(
                transport.clone(),
                &endpoints.ssllabs_api_url,
                endpoints.relay_url.as_deref(),
                settings.tls_poll_interval,
                settings.tls_max_polls,
            ),
            &endpoints.ssllabs_report_url,
        )),
        Arc::new(SecurityHeadersScanner::new(HeaderGradingClient::new(
            transport,
            &endpoints.headers_url,
            endpoints.relay_url.as_deref(),
        ))),
    ]
}

/// Strips a leading `www.` so registry-level lookups target the apex.
pub(crate) fn root_domain(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probe::mock::MockTransport;
    use std::collections::HashSet;

    #[test]
    fn default_registry_has_six_unique_ids() {
        let scanners = default_scanners(&Settings::default(), Arc::new(MockTransport::new()));
        let ids: Vec<ScannerId> = scanners.iter().map(|s| s.descriptor().id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                ScannerId::Dns,
                ScannerId::EmailAuth,
                ScannerId::Certificates,
                ScannerId::Rdap,
                ScannerId::Tls,
                ScannerId::SecurityHeaders
            ]
        );
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 6);
    }

    #[test]
    fn descriptor_timeouts_match_scanner_budgets() {
        let scanners = default_scanners(&Settings::default(), Arc::new(MockTransport::new()));
        let timeouts: Vec<u64> = scanners
            .iter()
            .map(|s| s.descriptor().timeout.map(|t| t.as_secs()).unwrap_or_default())
            .collect();
        assert_eq!(timeouts, vec![5, 10, 15, 10, 600, 15]);
    }
}
