// src/core/scanner/tls_scanner.rs

use super::{Scanner, ScannerDescriptor};
use crate::core::error::{ProbeError, ScanError};
use crate::core::models::{DataSource, ScanData, ScanOutcome, ScannerId, TlsData, TlsEndpoint};
use crate::core::probe::ssllabs::{EndpointDetails, GradingClient, GradingOutcome, GradingReport};
use crate::core::probe::{fill_domain, ProbeContext};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Best to worst. Grades outside this list rank below `M`.
pub const GRADE_ORDER: &[&str] = &["A+", "A", "A-", "B", "C", "D", "E", "F", "T", "M"];

/// Roughly six months, the minimum HSTS max-age worth preloading.
pub const MIN_HSTS_MAX_AGE: i64 = 15_768_000;

// Certificate chain issue bits as reported by the grading service.
const CHAIN_INCOMPLETE: u32 = 1 << 1;
const CHAIN_UNRELATED: u32 = 1 << 2;
const CHAIN_WRONG_ORDER: u32 = 1 << 3;
const CHAIN_SELF_SIGNED_ROOT: u32 = 1 << 4;
const CHAIN_UNVALIDATED: u32 = 1 << 5;

const FS_ALL_BROWSERS: u32 = 1 << 2;

pub struct TlsScanner {
    descriptor: ScannerDescriptor,
    client: GradingClient,
    report_url_template: String,
}

impl TlsScanner {
    pub fn new(client: GradingClient, report_url_template: &str) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::Tls,
                "TLS Configuration",
                "Grades every HTTPS endpoint for protocol support, known vulnerabilities, chain and HSTS configuration.",
                Some(Duration::from_secs(600)),
                DataSource::new("Qualys SSL Labs", "https://www.ssllabs.com/ssltest/"),
            ),
            client,
            report_url_template: report_url_template.to_string(),
        }
    }
}

#[async_trait]
impl Scanner for TlsScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        info!(target = %domain, "Starting TLS grading.");
        let report_url = fill_domain(&self.report_url_template, domain);

        let outcome = match self.client.assess(domain, ctx).await {
            Ok(GradingOutcome::Ready(report)) => {
                let (data, issues) = analyze_tls(&report, &report_url);
                let summary = summarize_tls(&data);
                ScanOutcome::new(ScanData::Tls(data), summary, issues)
            }
            Ok(GradingOutcome::Pending { status, polls }) => {
                info!(domain, polls, status = %status, "TLS grading still running.");
                let data = TlsData {
                    status,
                    warnings: vec![format!("Assessment did not finish in time - view the results at {}", report_url)],
                    report_url,
                    ..Default::default()
                };
                ScanOutcome::new(ScanData::Tls(data), "TLS assessment in progress", Vec::new())
            }
            Ok(GradingOutcome::Failed { message }) => {
                warn!(domain, message = %message, "TLS grading failed.");
                let data = TlsData {
                    status: "ERROR".to_string(),
                    report_url,
                    error: Some(message.clone()),
                    ..Default::default()
                };
                ScanOutcome::new(
                    ScanData::Tls(data),
                    format!("TLS assessment failed: {}", message),
                    vec![format!("TLS assessment could not be completed: {}", message)],
                )
            }
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled.into()),
            Err(e) => {
                warn!(domain, error = %e, "TLS grading service unreachable.");
                let data = TlsData {
                    report_url: report_url.clone(),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                ScanOutcome::new(
                    ScanData::Tls(data),
                    "TLS grading service unavailable",
                    vec![format!("Could not reach the TLS grading service - check manually at {}", report_url)],
                )
            }
        };
        Ok(outcome)
    }
}

/// Position of a grade in `GRADE_ORDER`; higher is worse.
pub fn grade_rank(grade: &str) -> usize {
    GRADE_ORDER
        .iter()
        .position(|g| g.eq_ignore_ascii_case(grade))
        .unwrap_or(GRADE_ORDER.len())
}

pub fn lowest_grade<'a>(grades: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    grades.into_iter().max_by_key(|g| grade_rank(g))
}

fn push_unique(findings: &mut Vec<String>, finding: String) {
    if !findings.contains(&finding) {
        findings.push(finding);
    }
}

fn inspect_protocols(details: &EndpointDetails, issues: &mut Vec<String>, warnings: &mut Vec<String>) {
    for protocol in &details.protocols {
        match (protocol.name.as_str(), protocol.version.as_str()) {
            ("SSL", version) => push_unique(issues, format!("Insecure protocol supported: SSLv{}", version)),
            ("TLS", version @ ("1.0" | "1.1")) => {
                push_unique(warnings, format!("Deprecated protocol supported: TLS {}", version))
            }
            _ => {}
        }
    }
}

fn inspect_vulnerabilities(details: &EndpointDetails, issues: &mut Vec<String>, warnings: &mut Vec<String>) {
    if details.vuln_beast {
        push_unique(warnings, "Vulnerable to BEAST".to_string());
    }
    let critical = [
        (details.poodle, "POODLE"),
        (details.heartbleed, "Heartbleed"),
        (details.freak, "FREAK"),
        (details.drown_vulnerable, "DROWN"),
    ];
    for (_, name) in critical.iter().filter(|(flag, _)| *flag) {
        push_unique(issues, format!("Vulnerable to {}", name));
    }
    if details.logjam {
        push_unique(warnings, "Vulnerable to Logjam".to_string());
    }
}

fn chain_flags(details: &EndpointDetails) -> u32 {
    details
        .cert_chains
        .iter()
        .chain(details.chain.iter())
        .filter_map(|c| c.issues)
        .fold(0, |acc, bits| acc | bits)
}

fn inspect_chain(details: &EndpointDetails, issues: &mut Vec<String>, warnings: &mut Vec<String>) {
    let flags = chain_flags(details);
    if flags & CHAIN_INCOMPLETE != 0 {
        push_unique(issues, "Certificate chain is incomplete".to_string());
    }
    if flags & CHAIN_UNRELATED != 0 {
        push_unique(warnings, "Certificate chain contains unrelated or duplicate certificates".to_string());
    }
    if flags & CHAIN_WRONG_ORDER != 0 {
        push_unique(warnings, "Certificate chain is in the wrong order".to_string());
    }
    if flags & CHAIN_SELF_SIGNED_ROOT != 0 {
        push_unique(warnings, "Certificate chain includes the self-signed root".to_string());
    }
    if flags & CHAIN_UNVALIDATED != 0 {
        push_unique(warnings, "Certificate chain could not be validated".to_string());
    }
}

fn inspect_forward_secrecy(details: &EndpointDetails, warnings: &mut Vec<String>) {
    match details.forward_secrecy.unwrap_or(0) {
        0 => push_unique(warnings, "Forward secrecy not supported".to_string()),
        bits if bits & FS_ALL_BROWSERS == 0 => {
            push_unique(warnings, "Forward secrecy not supported by all browsers".to_string())
        }
        _ => {}
    }
}

fn inspect_hsts(details: &EndpointDetails, warnings: &mut Vec<String>) {
    let policy = details
        .hsts_policy
        .as_ref()
        .filter(|p| p.status.as_deref() == Some("present"));
    match policy.and_then(|p| p.max_age) {
        None if policy.is_none() => push_unique(warnings, "HSTS not enabled".to_string()),
        Some(max_age) if max_age < MIN_HSTS_MAX_AGE => push_unique(
            warnings,
            format!("HSTS max-age is {} seconds - use at least {} (6 months)", max_age, MIN_HSTS_MAX_AGE),
        ),
        None => push_unique(warnings, "HSTS max-age is not set".to_string()),
        _ => {}
    }
}

/// Turns a finished grading report into endpoint grades and findings.
/// Findings repeated across endpoints are reported once.
pub fn analyze_tls(report: &GradingReport, report_url: &str) -> (TlsData, Vec<String>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut grades: Vec<String> = Vec::new();

    for endpoint in &report.endpoints {
        if let Some(grade) = endpoint.grade.as_deref() {
            if !grades.iter().any(|g| g == grade) {
                grades.push(grade.to_string());
            }
        }
        let Some(details) = endpoint.details.as_ref() else {
            continue;
        };
        inspect_protocols(details, &mut issues, &mut warnings);
        inspect_vulnerabilities(details, &mut issues, &mut warnings);
        inspect_chain(details, &mut issues, &mut warnings);
        inspect_forward_secrecy(details, &mut warnings);
        inspect_hsts(details, &mut warnings);
    }

    let endpoints = report
        .endpoints
        .iter()
        .map(|e| TlsEndpoint {
            ip_address: e.ip_address.clone(),
            grade: e.grade.clone(),
            status_message: e.status_message.clone(),
            chain_issues: e.details.as_ref().map(chain_flags).unwrap_or(0),
            forward_secrecy: e.details.as_ref().and_then(|d| d.forward_secrecy),
        })
        .collect();
    let data = TlsData {
        status: report.status.clone(),
        endpoints,
        lowest_grade: lowest_grade(grades.iter().map(String::as_str)).map(str::to_string),
        grades,
        warnings,
        report_url: report_url.to_string(),
        error: None,
    };
    (data, issues)
}

pub fn summarize_tls(data: &TlsData) -> String {
    if data.endpoints.is_empty() {
        return "No endpoints were graded".to_string();
    }
    let grades = if data.grades.is_empty() {
        "no grade".to_string()
    } else {
        data.grades.join(", ")
    };
    format!("{} endpoint(s) graded: {}", data.endpoints.len(), grades)
}
