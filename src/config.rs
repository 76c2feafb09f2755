// src/config.rs

//! Runtime settings. Every value has a default; `Settings::from_env` overlays
//! `<CRATE>_*` environment variables using the same prefix as the log level
//! variable.

use crate::core::error::ConfigError;
use crate::logging::PROJECT_NAME;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default per-scanner timeout used when a descriptor does not set its own.
pub const DEFAULT_SCANNER_TIMEOUT: Duration = Duration::from_secs(30);

/// Public endpoints queried by the probe clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    /// DNS-over-HTTPS JSON resolver (`?name=&type=`).
    pub doh_url: String,
    /// Certificate transparency search; `{domain}` is substituted.
    pub ct_url: String,
    pub rdap_bootstrap_url: String,
    pub ssllabs_api_url: String,
    /// Human-readable TLS report; `{domain}` is substituted.
    pub ssllabs_report_url: String,
    /// Header grading report page; `{domain}` is substituted.
    pub headers_url: String,
    /// Optional relay in front of the third-party grading services. `{url}`
    /// is replaced by the URL-encoded target request.
    pub relay_url: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            doh_url: "https://dns.google/resolve".to_string(),
            ct_url: "https://crt.sh/?q={domain}&output=json".to_string(),
            rdap_bootstrap_url: "https://data.iana.org/rdap/dns.json".to_string(),
            ssllabs_api_url: "https://api.ssllabs.com/api/v3/analyze".to_string(),
            ssllabs_report_url: "https://www.ssllabs.com/ssltest/analyze.html?d={domain}".to_string(),
            headers_url: "https://securityheaders.com/?q={domain}&hide=on&followRedirects=on".to_string(),
            relay_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub default_timeout: Duration,
    pub user_agent: String,
    /// Timeout applied to each individual HTTP request.
    pub request_timeout: Duration,
    pub endpoints: Endpoints,
    /// Overrides the built-in DKIM selector list when set.
    pub dkim_selectors: Option<Vec<String>>,
    pub tls_poll_interval: Duration,
    pub tls_max_polls: u32,
    pub cache_ttl: Duration,
    pub rate_limit_max_scans: u32,
    pub rate_limit_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_SCANNER_TIMEOUT,
            user_agent: "VanguardRS/0.1".to_string(),
            request_timeout: Duration::from_secs(20),
            endpoints: Endpoints::default(),
            dkim_selectors: None,
            tls_poll_interval: Duration::from_secs(30),
            tls_max_polls: 20,
            cache_ttl: Duration::from_secs(60 * 60),
            rate_limit_max_scans: 10,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

/// Validates a timeout expressed in (possibly fractional) seconds.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidTimeout(secs.to_string()));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs.to_string()))
}

fn env_name(suffix: &str) -> String {
    format!("{}_{}", PROJECT_NAME.as_str(), suffix)
}

fn env_var(suffix: &str) -> Option<(String, String)> {
    let name = env_name(suffix);
    std::env::var(&name).ok().map(|value| (name, value))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_env(name, value)?;
    timeout_from_secs(secs)
}

impl Settings {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Some((name, value)) = env_var("TIMEOUT_SECS") {
            self.default_timeout = parse_secs(&name, &value)?;
            debug!(timeout = ?self.default_timeout, "Default scanner timeout overridden from env.");
        }
        if let Some((name, value)) = env_var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout = parse_secs(&name, &value)?;
        }
        if let Some((_, value)) = env_var("USER_AGENT") {
            self.user_agent = value;
        }
        if let Some((_, value)) = env_var("DOH_URL") {
            self.endpoints.doh_url = value;
        }
        if let Some((_, value)) = env_var("RELAY_URL") {
            self.endpoints.relay_url = Some(value).filter(|v| !v.trim().is_empty());
        }
        if let Some((_, value)) = env_var("DKIM_SELECTORS") {
            let selectors: Vec<String> = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.dkim_selectors = Some(selectors).filter(|s| !s.is_empty());
        }
        if let Some((name, value)) = env_var("TLS_POLL_SECS") {
            self.tls_poll_interval = parse_secs(&name, &value)?;
        }
        if let Some((name, value)) = env_var("TLS_MAX_POLLS") {
            self.tls_max_polls = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = env_var("CACHE_TTL_SECS") {
            self.cache_ttl = parse_secs(&name, &value)?;
        }
        if let Some((name, value)) = env_var("RATE_LIMIT") {
            self.rate_limit_max_scans = parse_env(&name, &value)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_finite_and_non_positive_timeouts() {
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
        assert!(timeout_from_secs(0.0).is_err());
        assert!(timeout_from_secs(-3.0).is_err());
        assert_eq!(timeout_from_secs(1.5).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn defaults_match_grading_poll_budget() {
        let settings = Settings::default();
        assert_eq!(settings.tls_poll_interval, Duration::from_secs(30));
        assert_eq!(settings.tls_max_polls, 20);
        assert!(settings.endpoints.relay_url.is_none());
    }

    #[test]
    fn env_names_use_crate_prefix() {
        assert_eq!(env_name("TIMEOUT_SECS"), "VANGUARD_POSTURE_TIMEOUT_SECS");
    }
}
