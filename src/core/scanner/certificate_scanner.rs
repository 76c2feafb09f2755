// src/core/scanner/certificate_scanner.rs

use super::{Scanner, ScannerDescriptor};
use crate::core::error::ScanError;
use crate::core::models::{CertificateSummary, CertificatesData, DataSource, ScanData, ScanOutcome, ScannerId};
use crate::core::probe::ct::{CtClient, CtRecord};
use crate::core::probe::ProbeContext;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

const IMMINENT_EXPIRY_DAYS: i64 = 7;
const EXPIRY_WARNING_DAYS: i64 = 30;
const RECENTLY_EXPIRED_DAYS: i64 = 30;
const MAX_ACTIVE_CERTIFICATES: usize = 10;
const MAX_DISTINCT_ISSUERS: usize = 3;

pub struct CertificateScanner {
    descriptor: ScannerDescriptor,
    client: CtClient,
}

impl CertificateScanner {
    pub fn new(client: CtClient) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::Certificates,
                "SSL Certificates",
                "Enumerates certificates logged in certificate transparency and checks expiry, issuers and hygiene.",
                Some(Duration::from_secs(15)),
                DataSource::new("crt.sh Certificate Transparency", "https://crt.sh"),
            ),
            client,
        }
    }
}

#[async_trait]
impl Scanner for CertificateScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        info!(target = %domain, "Starting certificate transparency scan.");
        let Some(records) = self.client.fetch(domain, ctx).await else {
            let data = CertificatesData {
                error: Some("Certificate transparency lookup failed".to_string()),
                ..Default::default()
            };
            return Ok(ScanOutcome::new(
                ScanData::Certificates(data),
                "Certificate transparency logs unavailable",
                vec!["Could not query certificate transparency logs".to_string()],
            ));
        };

        let (data, issues) = analyze_certificates(&records, Utc::now());
        let summary = summarize_certificates(&data);
        info!(findings = issues.len(), active = data.active.len(), "Certificate scan finished.");
        Ok(ScanOutcome::new(ScanData::Certificates(data), summary, issues))
    }
}

/// crt.sh timestamps carry no zone and are UTC.
fn parse_ct_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Value of the `CN=` attribute in a distinguished name.
fn dn_common_name(dn: &str) -> Option<&str> {
    dn.split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("CN=").or_else(|| part.strip_prefix("cn=")))
}

fn is_self_signed(cert: &CertificateSummary) -> bool {
    let issuer = cert.issuer.trim();
    issuer.to_ascii_lowercase().contains("self-signed")
        || issuer.eq_ignore_ascii_case(&cert.common_name)
        || dn_common_name(issuer).is_some_and(|cn| cn.eq_ignore_ascii_case(&cert.common_name))
}

fn to_summary(record: &CtRecord, now: DateTime<Utc>) -> Option<CertificateSummary> {
    let common_name = record
        .common_name
        .clone()
        .filter(|cn| !cn.trim().is_empty())
        .or_else(|| {
            record
                .name_value
                .as_deref()
                .and_then(|names| names.lines().next())
                .map(str::to_string)
        })?
        .trim()
        .to_ascii_lowercase();
    let not_before = parse_ct_time(record.not_before.as_deref()?)?;
    let not_after = parse_ct_time(record.not_after.as_deref()?)?;
    Some(CertificateSummary {
        id: record.id,
        common_name,
        issuer: record.issuer_name.clone().unwrap_or_default(),
        not_before,
        not_after,
        days_until_expiry: (not_after - now).num_days(),
    })
}

/// Deduplicates certificates per common name and applies the expiry and
/// hygiene rules. `now` is explicit so callers control the reference time.
pub fn analyze_certificates(records: &[CtRecord], now: DateTime<Utc>) -> (CertificatesData, Vec<String>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let parsed: Vec<CertificateSummary> = records.iter().filter_map(|r| to_summary(r, now)).collect();
    if parsed.len() < records.len() {
        debug!(skipped = records.len() - parsed.len(), "Skipped certificate records with unparsable fields.");
    }
    let (live, expired): (Vec<_>, Vec<_>) = parsed.into_iter().partition(|c| c.not_after > now);

    // Most recently issued live certificate per name.
    let mut latest: HashMap<String, CertificateSummary> = HashMap::new();
    for cert in live {
        let newer = latest
            .get(&cert.common_name)
            .is_none_or(|existing| existing.not_before < cert.not_before);
        if newer {
            latest.insert(cert.common_name.clone(), cert);
        }
    }
    let mut active: Vec<CertificateSummary> = latest.into_values().collect();
    active.sort_by(|a, b| a.not_after.cmp(&b.not_after).then_with(|| a.common_name.cmp(&b.common_name)));

    for cert in &active {
        if cert.days_until_expiry <= IMMINENT_EXPIRY_DAYS {
            issues.push(format!(
                "Certificate for {} expires in {} days - renew immediately",
                cert.common_name, cert.days_until_expiry
            ));
        } else if cert.days_until_expiry <= EXPIRY_WARNING_DAYS {
            warnings.push(format!(
                "Certificate for {} expires in {} days",
                cert.common_name, cert.days_until_expiry
            ));
        }
    }

    let self_signed = active.iter().filter(|c| is_self_signed(c)).count();
    if self_signed > 0 {
        issues.push(format!("{} self-signed certificate(s) found", self_signed));
    }

    let wildcards = active.iter().filter(|c| c.common_name.starts_with("*.")).count();
    if wildcards > 0 {
        warnings.push(format!("{} wildcard certificate(s) in use - a compromised key exposes every subdomain", wildcards));
    }

    if active.len() > MAX_ACTIVE_CERTIFICATES {
        warnings.push(format!(
            "{} active certificates - review for unused or forgotten subdomains",
            active.len()
        ));
    }

    let recent_cutoff = now - ChronoDuration::days(RECENTLY_EXPIRED_DAYS);
    let unreplaced: BTreeSet<&str> = expired
        .iter()
        .filter(|c| c.not_after > recent_cutoff)
        .filter(|c| !active.iter().any(|a| a.common_name == c.common_name))
        .map(|c| c.common_name.as_str())
        .collect();
    if !unreplaced.is_empty() {
        let names: Vec<&str> = unreplaced.into_iter().collect();
        warnings.push(format!(
            "Certificates expired in the last {} days without replacement: {}",
            RECENTLY_EXPIRED_DAYS,
            names.join(", ")
        ));
    }

    let issuers: BTreeSet<&str> = active.iter().map(|c| c.issuer.as_str()).collect();
    if issuers.len() > MAX_DISTINCT_ISSUERS {
        warnings.push(format!(
            "Certificates issued by {} different authorities - consider consolidating",
            issuers.len()
        ));
    }

    if !issues.is_empty() {
        warn!(count = issues.len(), "Certificate issues found.");
    }

    let data = CertificatesData {
        total: records.len(),
        active,
        expired: expired.len(),
        warnings,
        error: None,
    };
    (data, issues)
}

pub fn summarize_certificates(data: &CertificatesData) -> String {
    if data.total == 0 {
        return "No certificates found in transparency logs".to_string();
    }
    format!(
        "{} certificates found ({} active, {} expired)",
        data.total,
        data.active.len(),
        data.expired
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn stamp(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    fn record(cn: &str, issuer: &str, issued_days_ago: i64, expires_in_days: i64) -> CtRecord {
        CtRecord {
            id: Some(1),
            issuer_name: Some(issuer.to_string()),
            common_name: Some(cn.to_string()),
            name_value: Some(cn.to_string()),
            not_before: Some(stamp(now() - ChronoDuration::days(issued_days_ago))),
            not_after: Some(stamp(now() + ChronoDuration::days(expires_in_days))),
        }
    }

    const LE: &str = "C=US, O=Let's Encrypt, CN=R3";

    #[test]
    fn imminent_expiry_is_a_single_renew_immediately_issue() {
        let (data, issues) = analyze_certificates(&[record("example.com", LE, 85, 5)], now());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("expires in 5") && issues[0].contains("immediately"));
        assert_eq!(data.active.len(), 1);
    }

    #[test]
    fn newest_live_certificate_replaces_older_one() {
        let records = [record("example.com", LE, 85, 5), record("example.com", LE, 1, 365)];
        let (data, issues) = analyze_certificates(&records, now());
        assert_eq!(data.active.len(), 1);
        assert_eq!(data.active[0].days_until_expiry, 365);
        assert!(issues.is_empty());
        assert_eq!(summarize_certificates(&data), "2 certificates found (1 active, 0 expired)");
    }

    #[test]
    fn expiry_within_thirty_days_is_a_warning() {
        let (data, issues) = analyze_certificates(&[record("example.com", LE, 60, 20)], now());
        assert!(issues.is_empty());
        assert!(data.warnings.iter().any(|w| w.contains("expires in 20 days")));
    }

    #[test]
    fn recently_expired_warning_is_suppressed_when_replaced() {
        let replaced = [record("example.com", LE, 100, -10), record("example.com", LE, 5, 80)];
        let (data, _) = analyze_certificates(&replaced, now());
        assert!(data.warnings.iter().all(|w| !w.contains("without replacement")));
        assert_eq!(data.expired, 1);

        let orphaned = [record("old.example.com", LE, 100, -10), record("example.com", LE, 5, 80)];
        let (data, _) = analyze_certificates(&orphaned, now());
        assert!(data
            .warnings
            .iter()
            .any(|w| w.contains("without replacement: old.example.com")));
    }

    #[test]
    fn self_signed_wildcard_and_issuer_spread() {
        let records = [
            record("internal.example.com", "CN=internal.example.com", 10, 200),
            record("*.example.com", "C=US, O=DigiCert Inc, CN=DigiCert CA", 10, 200),
            record("a.example.com", "C=US, O=Sectigo, CN=Sectigo CA", 10, 200),
            record("b.example.com", LE, 10, 60),
            record("c.example.com", "Self-Signed Test Issuer", 10, 60),
        ];
        let (data, issues) = analyze_certificates(&records, now());
        assert!(issues.iter().any(|i| i == "2 self-signed certificate(s) found"));
        assert!(data.warnings.iter().any(|w| w.starts_with("1 wildcard")));
        assert!(data.warnings.iter().any(|w| w.contains("5 different authorities")));
    }

    #[test]
    fn empty_log_is_informational() {
        let (data, issues) = analyze_certificates(&[], now());
        assert!(issues.is_empty());
        assert_eq!(summarize_certificates(&data), "No certificates found in transparency logs");
    }

    #[test]
    fn parses_fractional_and_zoned_timestamps() {
        assert!(parse_ct_time("2025-01-02T03:04:05.123").is_some());
        assert!(parse_ct_time("2025-01-02T03:04:05Z").is_some());
        assert!(parse_ct_time("not a date").is_none());
    }
}
