// src/core/scanner/rdap_scanner.rs

use super::{root_domain, Scanner, ScannerDescriptor};
use crate::core::error::ScanError;
use crate::core::models::{DataSource, RdapData, ScanData, ScanOutcome, ScannerId};
use crate::core::probe::rdap::{RdapClient, RdapDomain, RdapLookup};
use crate::core::probe::ProbeContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Status values (EPP spelling, lower-cased, no spaces) that put a domain at risk.
const RISKY_STATUSES: &[&str] = &["clienthold", "serverhold", "redemptionperiod", "pendingdelete"];

const EXPIRY_ISSUE_DAYS: i64 = 30;
const EXPIRY_WARNING_DAYS: i64 = 60;

pub struct RdapScanner {
    descriptor: ScannerDescriptor,
    client: RdapClient,
}

impl RdapScanner {
    pub fn new(client: RdapClient) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::Rdap,
                "Domain Registration",
                "Looks up registration status, expiry, DNSSEC and nameservers through RDAP.",
                Some(Duration::from_secs(10)),
                DataSource::new("IANA RDAP Bootstrap", "https://data.iana.org/rdap/"),
            ),
            client,
        }
    }
}

fn failure(domain: &str, summary: &str, error: String, issues: Vec<String>) -> ScanOutcome {
    let data = RdapData {
        domain: domain.to_string(),
        error: Some(error),
        ..Default::default()
    };
    ScanOutcome::new(ScanData::Rdap(data), summary, issues)
}

#[async_trait]
impl Scanner for RdapScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        let root_target = root_domain(domain);
        if !root_target.contains('.') {
            return Ok(failure(
                root_target,
                "Invalid domain format",
                "Domain must have the form label.tld".to_string(),
                vec!["Invalid domain format - expected label.tld".to_string()],
            ));
        }
        info!(target = %root_target, "Starting RDAP scan.");

        let lookup = match self.client.lookup(root_target, ctx).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(target = %root_target, error = %e, "RDAP bootstrap failed.");
                return Ok(failure(
                    root_target,
                    "RDAP lookup failed",
                    e.to_string(),
                    vec![format!("RDAP lookup failed: {}", e)],
                ));
            }
        };

        let outcome = match lookup {
            RdapLookup::Unsupported { tld } => {
                info!(tld = %tld, "RDAP unavailable for TLD.");
                let data = RdapData { domain: root_target.to_string(), ..Default::default() };
                ScanOutcome::new(ScanData::Rdap(data), "RDAP not available for this TLD", Vec::new())
            }
            RdapLookup::NotFound { server } => {
                let data = RdapData {
                    domain: root_target.to_string(),
                    server: Some(server),
                    not_found: true,
                    warnings: vec!["Domain not found in the registry's RDAP service".to_string()],
                    ..Default::default()
                };
                ScanOutcome::new(ScanData::Rdap(data), "Domain not found in RDAP", Vec::new())
            }
            RdapLookup::Failed { reason } => failure(
                root_target,
                "RDAP lookup failed",
                reason.clone(),
                vec![format!("RDAP lookup failed: {}", reason)],
            ),
            RdapLookup::Found { server, domain: record } => {
                let (data, issues) = analyze_rdap(root_target, &server, &record, Utc::now());
                let summary = summarize_rdap(&data);
                ScanOutcome::new(ScanData::Rdap(data), summary, issues)
            }
        };
        info!(summary = %outcome.summary, "RDAP scan finished.");
        Ok(outcome)
    }
}

fn parse_event(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|d| d.with_timezone(&Utc))
}

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days until `expiry`. A past expiry counts as at least one day overdue.
fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if expiry < now {
        let overdue = (now - expiry).num_seconds();
        -((overdue + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
    } else {
        (expiry - now).num_days()
    }
}

/// Applies status, expiry, DNSSEC and nameserver rules to an RDAP record.
pub fn analyze_rdap(domain: &str, server: &str, record: &RdapDomain, now: DateTime<Utc>) -> (RdapData, Vec<String>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let risky: Vec<&str> = record
        .status
        .iter()
        .filter(|status| {
            let normalized = status.replace(' ', "").to_ascii_lowercase();
            RISKY_STATUSES.iter().any(|risky| normalized.contains(risky))
        })
        .map(String::as_str)
        .collect();
    if !risky.is_empty() {
        issues.push(format!("Domain has problematic status: {}", risky.join(", ")));
    }

    let registered = parse_event(record.event_date("registration"));
    let expires = parse_event(record.event_date("expiration"));
    let days_until_expiry = expires.map(|e| days_until(e, now));
    match days_until_expiry {
        Some(days) if days < 0 => {
            issues.push(format!("Domain registration expired {} days ago", days.abs()));
        }
        Some(days) if days <= EXPIRY_ISSUE_DAYS => {
            issues.push(format!("Domain registration expires in {} days", days));
        }
        Some(days) if days <= EXPIRY_WARNING_DAYS => {
            warnings.push(format!("Domain registration expires in {} days - plan the renewal", days));
        }
        _ => {}
    }

    let dnssec = record.secure_dns.as_ref().and_then(|s| s.delegation_signed);
    if dnssec == Some(false) {
        warnings.push("DNSSEC is not enabled (delegation not signed)".to_string());
    }

    let nameservers: Vec<String> = record
        .nameservers
        .iter()
        .filter_map(|ns| ns.ldh_name.as_deref())
        .map(|ns| ns.to_ascii_lowercase())
        .collect();
    match nameservers.len() {
        0 => issues.push("Domain has no nameservers configured".to_string()),
        1 => warnings.push("Only one nameserver configured - no redundancy".to_string()),
        _ => {}
    }

    let data = RdapData {
        domain: record
            .ldh_name
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| domain.to_string()),
        server: Some(server.to_string()),
        status: record.status.clone(),
        registrar: record.registrar(),
        registered,
        expires,
        days_until_expiry,
        nameservers,
        dnssec,
        not_found: false,
        warnings,
        error: None,
    };
    (data, issues)
}

pub fn summarize_rdap(data: &RdapData) -> String {
    let status = data.status.first().map(String::as_str).unwrap_or("unknown status");
    match data.days_until_expiry {
        Some(days) if days < 0 => format!("{}: {}, expired {} days ago", data.domain, status, days.abs()),
        Some(days) => format!("{}: {}, expires in {} days", data.domain, status, days),
        None => format!("{}: {}", data.domain, status),
    }
}
