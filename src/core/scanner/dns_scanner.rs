// src/core/scanner/dns_scanner.rs

use super::{Scanner, ScannerDescriptor};
use crate::core::error::{ProbeError, ScanError};
use crate::core::models::{DataSource, DnsData, ScanData, ScanOutcome, ScannerId};
use crate::core::probe::dns::DnsClient;
use crate::core::probe::ProbeContext;
use async_trait::async_trait;
use hickory_resolver::proto::rr::RecordType;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Address prefixes that should never be published for a public site.
const RESERVED_PREFIXES: &[&str] = &["127.", "0.0.0.0", "10.", "172.16.", "192.168.", "169.254."];

const MAX_A_RECORDS: usize = 10;
const MAX_TXT_LENGTH: usize = 255;
const LOOKED_UP_TYPES: usize = 5;

pub struct DnsScanner {
    descriptor: ScannerDescriptor,
    client: DnsClient,
}

impl DnsScanner {
    pub fn new(client: DnsClient) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::Dns,
                "DNS Records",
                "Resolves A, AAAA, MX, TXT and CNAME records and checks them for common misconfigurations.",
                Some(Duration::from_secs(5)),
                DataSource::new("Google Public DNS (DNS-over-HTTPS)", "https://dns.google"),
            ),
            client,
        }
    }
}

#[async_trait]
impl Scanner for DnsScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        info!(target = %domain, "Starting DNS scan.");
        let (a, aaaa, mx, txt, cname) = tokio::join!(
            self.client.lookup(domain, RecordType::A, ctx),
            self.client.lookup(domain, RecordType::AAAA, ctx),
            self.client.lookup(domain, RecordType::MX, ctx),
            self.client.lookup(domain, RecordType::TXT, ctx),
            self.client.lookup(domain, RecordType::CNAME, ctx),
        );

        let mut failed = Vec::new();
        let mut first_error: Option<String> = None;
        let mut take = |result: Result<Vec<String>, ProbeError>, record_type: RecordType| match result {
            Ok(values) => values,
            Err(e) => {
                warn!(domain, %record_type, error = %e, "DNS lookup failed.");
                failed.push(record_type.to_string());
                first_error.get_or_insert_with(|| e.to_string());
                Vec::new()
            }
        };
        let a = take(a, RecordType::A);
        let aaaa = take(aaaa, RecordType::AAAA);
        let mx = take(mx, RecordType::MX);
        let txt = take(txt, RecordType::TXT);
        let cname = take(cname, RecordType::CNAME);
        let mut data = DnsData { a, aaaa, mx, txt, cname, failed_lookups: failed, error: None };

        if !data.failed_lookups.is_empty() {
            let failed = data.failed_lookups.join(", ");
            data.error = Some(format!("lookup failed for {}: {}", failed, first_error.unwrap_or_default()));
        }

        if data.failed_lookups.len() == LOOKED_UP_TYPES {
            warn!(domain, "Every DNS lookup failed.");
            return Ok(ScanOutcome::new(
                ScanData::Dns(data),
                "DNS lookup failed",
                vec!["DNS lookup failed for all record types - resolver unreachable".to_string()],
            ));
        }

        let issues = analyze_dns(&data);
        let summary = summarize_dns(&data);
        info!(findings = issues.len(), "DNS scan finished.");
        Ok(ScanOutcome::new(ScanData::Dns(data), summary, issues))
    }
}

fn is_reserved(ip: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| ip.starts_with(prefix))
}

/// Host part of an MX value such as `10 mail.example.com.`.
fn mx_host(value: &str) -> &str {
    value.split_whitespace().last().unwrap_or(value).trim_end_matches('.')
}

fn lookup_failed(data: &DnsData, record_type: RecordType) -> bool {
    let name = record_type.to_string();
    data.failed_lookups.iter().any(|f| *f == name)
}

/// Findings for a set of resolved records. Absence is only reported for
/// record types whose lookup succeeded.
pub fn analyze_dns(data: &DnsData) -> Vec<String> {
    let mut issues = Vec::new();

    if !data.failed_lookups.is_empty() {
        issues.push(format!(
            "DNS lookup failed for {} - results are incomplete",
            data.failed_lookups.join(", ")
        ));
    }

    let addresses_known = ![RecordType::A, RecordType::AAAA, RecordType::CNAME]
        .into_iter()
        .any(|t| lookup_failed(data, t));
    if addresses_known && data.a.is_empty() && data.aaaa.is_empty() && data.cname.is_empty() {
        debug!("No address records, adding resolution finding.");
        issues.push("No A, AAAA, or CNAME records found - domain may not resolve in a browser".to_string());
    }

    for ip in data.a.iter().filter(|ip| is_reserved(ip)) {
        issues.push(format!("A record points to reserved/private IP: {}", ip));
    }

    if !data.cname.is_empty() && (!data.a.is_empty() || !data.aaaa.is_empty() || !data.mx.is_empty()) {
        issues.push("CNAME record conflicts with other records (A/AAAA/MX) - a CNAME must be the only record at a name".to_string());
    }

    if data.cname.len() > 1 {
        issues.push(format!("Multiple CNAME records found ({}) - only one is allowed", data.cname.len()));
    }

    if data.a.len() > MAX_A_RECORDS {
        issues.push(format!("Unusually high number of A records ({})", data.a.len()));
    }

    if data.mx.is_empty() && !lookup_failed(data, RecordType::MX) {
        issues.push("No MX records found - email delivery will fail".to_string());
    }

    for record in data.txt.iter().filter(|t| t.chars().count() > MAX_TXT_LENGTH) {
        issues.push(format!(
            "TXT record exceeds {} characters ({} characters)",
            MAX_TXT_LENGTH,
            record.chars().count()
        ));
    }

    for value in &data.mx {
        let host = mx_host(value);
        if host.parse::<Ipv4Addr>().is_ok() {
            issues.push(format!("MX record points to an IP address instead of a hostname: {}", host));
        }
    }

    issues
}

pub fn summarize_dns(data: &DnsData) -> String {
    let counts = [
        ("A", data.a.len()),
        ("AAAA", data.aaaa.len()),
        ("MX", data.mx.len()),
        ("TXT", data.txt.len()),
        ("CNAME", data.cname.len()),
    ];
    let found: Vec<String> = counts
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(kind, count)| format!("{}:{}", kind, count))
        .collect();
    if found.is_empty() {
        "No DNS records found".to_string()
    } else {
        format!("Found {}", found.join(", "))
    }
}
