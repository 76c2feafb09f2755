// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};

// --- Scanner Identity ---

/// Stable identifier of a scanner.
///
/// The string form is persisted inside exported aggregates, so the mapping in
/// `as_str` must never change for an existing variant. Identifiers that this
/// build does not know (e.g. from an aggregate produced by a newer release)
/// are preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScannerId {
    Dns,
    EmailAuth,
    Certificates,
    Rdap,
    Tls,
    SecurityHeaders,
    Other(String),
}

impl ScannerId {
    pub fn as_str(&self) -> &str {
        match self {
            ScannerId::Dns => "dns",
            ScannerId::EmailAuth => "emailAuth",
            ScannerId::Certificates => "certificates",
            ScannerId::Rdap => "rdap",
            ScannerId::Tls => "sslLabs",
            ScannerId::SecurityHeaders => "securityHeaders",
            ScannerId::Other(id) => id,
        }
    }
}

impl From<String> for ScannerId {
    fn from(value: String) -> Self {
        match value.as_str() {
            "dns" => ScannerId::Dns,
            "emailAuth" => ScannerId::EmailAuth,
            "certificates" => ScannerId::Certificates,
            "rdap" => ScannerId::Rdap,
            "sslLabs" => ScannerId::Tls,
            "securityHeaders" => ScannerId::SecurityHeaders,
            _ => ScannerId::Other(value),
        }
    }
}

impl From<ScannerId> for String {
    fn from(value: ScannerId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ScannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of the data a scanner reports, surfaced for transparency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub url: String,
}

impl DataSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self { name: name.to_string(), url: url.to_string() }
    }
}

// --- Lifecycle & Severity ---

/// Lifecycle of one executed scanner: `Running` -> `Complete` | `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Complete,
    Error,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

/// Severity classification produced by the interpretation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Critical,
    Error,
}

/// Derived, never persisted: recomputed from a `ScannerResult` on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
}

impl Interpretation {
    pub fn new(severity: Severity, message: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self { severity, message: message.into(), recommendation: recommendation.into() }
    }
}

// --- DNS Scanner Models ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsData {
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<String>,
    pub txt: Vec<String>,
    pub cname: Vec<String>,
    /// Record types whose lookup failed at the transport level.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_lookups: Vec<String>,
    /// Set when every lookup failed and the record lists say nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Email Authentication Models ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAuthData {
    pub spf: Option<String>,
    pub dmarc: Option<String>,
    pub dkim_selectors: Vec<String>,
    pub has_spf: bool,
    pub has_dmarc: bool,
    pub has_dkim: bool,
    pub dmarc_enforced: bool,
    pub warnings: Vec<String>,
    /// One of the four fixed aggregate messages, or a lookup failure notice;
    /// reused as the scan summary.
    pub status_message: String,
    /// Mechanisms whose records could not be fetched, with the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Certificate Transparency Models ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    pub id: Option<u64>,
    pub common_name: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatesData {
    pub total: usize,
    pub active: Vec<CertificateSummary>,
    pub expired: usize,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- RDAP Models ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapData {
    pub domain: String,
    pub server: Option<String>,
    pub status: Vec<String>,
    pub registrar: Option<String>,
    pub registered: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub nameservers: Vec<String>,
    pub dnssec: Option<bool>,
    pub not_found: bool,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- TLS Grading Models ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsEndpoint {
    pub ip_address: String,
    pub grade: Option<String>,
    pub status_message: Option<String>,
    /// Union of the certificate chain issue bits reported for this endpoint.
    #[serde(default)]
    pub chain_issues: u32,
    pub forward_secrecy: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsData {
    /// Terminal or last observed grading status (`READY`, `ERROR`, `IN_PROGRESS`, ...).
    pub status: String,
    pub endpoints: Vec<TlsEndpoint>,
    pub lowest_grade: Option<String>,
    pub grades: Vec<String>,
    pub warnings: Vec<String>,
    pub report_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Security Headers Models ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadersData {
    pub grade: Option<String>,
    pub score: Option<u8>,
    pub missing_headers: Vec<String>,
    pub warnings: Vec<String>,
    pub report_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scanner-specific analysis payload. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScanData {
    Dns(DnsData),
    EmailAuth(EmailAuthData),
    Certificates(CertificatesData),
    Rdap(RdapData),
    Tls(TlsData),
    SecurityHeaders(HeadersData),
}

impl ScanData {
    /// Upstream failure captured by the scanner, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            ScanData::Certificates(d) => d.error.as_deref(),
            ScanData::Rdap(d) => d.error.as_deref(),
            ScanData::Tls(d) => d.error.as_deref(),
            ScanData::SecurityHeaders(d) => d.error.as_deref(),
            ScanData::Dns(d) => d.error.as_deref(),
            ScanData::EmailAuth(d) => d.error.as_deref(),
        }
    }

    /// Non-blocking findings kept alongside the issue list.
    pub fn warnings(&self) -> &[String] {
        match self {
            ScanData::EmailAuth(d) => &d.warnings,
            ScanData::Certificates(d) => &d.warnings,
            ScanData::Rdap(d) => &d.warnings,
            ScanData::Tls(d) => &d.warnings,
            ScanData::SecurityHeaders(d) => &d.warnings,
            ScanData::Dns(_) => &[],
        }
    }
}

// --- Scanner Output ---

/// What a scanner's `run` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub data: ScanData,
    pub summary: String,
    pub issues: Option<Vec<String>>,
}

impl ScanOutcome {
    pub fn new(data: ScanData, summary: impl Into<String>, issues: Vec<String>) -> Self {
        Self { data, summary: summary.into(), issues: Some(issues) }
    }
}

/// One scanner's result within one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerResult {
    pub id: ScannerId,
    pub label: String,
    pub data_source: DataSource,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub data: Option<ScanData>,
    pub summary: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    pub error: Option<String>,
}

impl ScannerResult {
    /// A fresh result in the `Running` state.
    pub fn running(id: ScannerId, label: &str, data_source: DataSource) -> Self {
        Self {
            id,
            label: label.to_string(),
            data_source,
            status: ScanStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            data: None,
            summary: None,
            issues: Vec::new(),
            error: None,
        }
    }

    /// Moves a running result to `Complete`. Terminal results are left untouched.
    pub fn complete(&mut self, outcome: ScanOutcome, issues: Vec<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.data = Some(outcome.data);
        self.summary = Some(outcome.summary);
        self.issues = issues;
        self.status = ScanStatus::Complete;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Moves a running result to `Error`. Terminal results are left untouched.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.error = Some(message.into());
        self.status = ScanStatus::Error;
        self.finished_at = Some(Utc::now());
        true
    }
}

// --- Aggregate ---

/// Final report of one orchestration run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAggregate {
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub scanners: Vec<ScannerResult>,
    pub issues: Vec<String>,
}

impl ScanAggregate {
    /// Builds the aggregate, flattening issues in scanner order.
    pub fn new(domain: String, scanners: Vec<ScannerResult>) -> Self {
        let issues = scanners.iter().flat_map(|s| s.issues.iter().cloned()).collect();
        Self { domain, timestamp: Utc::now(), scanners, issues }
    }

    pub fn scanner(&self, id: &ScannerId) -> Option<&ScannerResult> {
        self.scanners.iter().find(|s| &s.id == id)
    }
}
