// src/core/scanner/email_scanner.rs

use super::{Scanner, ScannerDescriptor};
use crate::core::error::ScanError;
use crate::core::models::{DataSource, EmailAuthData, ScanData, ScanOutcome, ScannerId};
use crate::core::probe::dns::{extract_spf, DnsClient};
use crate::core::probe::ProbeContext;
use async_trait::async_trait;
use hickory_resolver::proto::rr::RecordType;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SPF's own budget of DNS-querying mechanisms.
const SPF_LOOKUP_LIMIT: usize = 10;

/// Overall email authentication posture, derived from the three mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailAuthStatus {
    Full,
    NotEnforced,
    Partial,
    None,
}

impl EmailAuthStatus {
    pub fn classify(has_spf: bool, has_dmarc: bool, has_dkim: bool, dmarc_enforced: bool) -> Self {
        match (has_spf, has_dmarc, has_dkim) {
            (true, true, true) if dmarc_enforced => EmailAuthStatus::Full,
            (true, true, true) => EmailAuthStatus::NotEnforced,
            (false, false, false) => EmailAuthStatus::None,
            _ => EmailAuthStatus::Partial,
        }
    }

    pub fn of(data: &EmailAuthData) -> Self {
        Self::classify(data.has_spf, data.has_dmarc, data.has_dkim, data.dmarc_enforced)
    }

    /// The fixed aggregate message; `Partial` lists the missing mechanisms.
    pub fn message(self, data: &EmailAuthData) -> String {
        match self {
            EmailAuthStatus::Full => "Email authentication fully configured: SPF, DKIM and enforced DMARC".to_string(),
            EmailAuthStatus::NotEnforced => "SPF, DKIM and DMARC are present but DMARC is not enforcing".to_string(),
            EmailAuthStatus::Partial => {
                let missing: Vec<&str> = [("SPF", data.has_spf), ("DKIM", data.has_dkim), ("DMARC", data.has_dmarc)]
                    .iter()
                    .filter(|(_, present)| !present)
                    .map(|(name, _)| *name)
                    .collect();
                format!("Partial email authentication - missing: {}", missing.join(", "))
            }
            EmailAuthStatus::None => "No email authentication configured (SPF, DKIM and DMARC missing)".to_string(),
        }
    }
}

pub struct EmailAuthScanner {
    descriptor: ScannerDescriptor,
    client: DnsClient,
    selectors: Option<Vec<String>>,
}

impl EmailAuthScanner {
    pub fn new(client: DnsClient, selectors: Option<Vec<String>>) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::EmailAuth,
                "Email Authentication",
                "Checks SPF, DMARC and DKIM records that protect the domain against email spoofing.",
                Some(Duration::from_secs(10)),
                DataSource::new("Google Public DNS (DNS-over-HTTPS)", "https://dns.google"),
            ),
            client,
            selectors,
        }
    }
}

#[async_trait]
impl Scanner for EmailAuthScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        info!(target = %domain, "Starting email authentication scan.");

        let (txt, dmarc, dkim) = tokio::join!(
            self.client.lookup(domain, RecordType::TXT, ctx),
            self.client.lookup_dmarc(domain, ctx),
            self.client.probe_dkim(domain, self.selectors.as_deref(), ctx),
        );

        let mut failures = LookupFailures::default();
        let spf = match txt {
            Ok(records) => extract_spf(&records),
            Err(e) => {
                warn!(target = %domain, error = %e, "TXT lookup failed.");
                failures.spf = Some(e.to_string());
                None
            }
        };
        let dmarc = dmarc.unwrap_or_else(|e| {
            warn!(target = %domain, error = %e, "DMARC lookup failed.");
            failures.dmarc = Some(e.to_string());
            None
        });
        let dkim_failed = dkim.failed.len();
        if dkim.all_failed() {
            failures.dkim = dkim.failed.first().map(|(_, e)| e.clone());
        }

        let (mut data, issues) =
            analyze_email_auth(spf.as_deref(), dmarc.as_deref(), dkim.found, dkim.checked, &failures);
        if dkim_failed > 0 && failures.dkim.is_none() && !data.has_dkim {
            data.warnings.push(format!(
                "DKIM lookup failed for {} of {} selectors - a key may have been missed",
                dkim_failed, dkim.checked
            ));
        }

        info!(findings = issues.len(), warnings = data.warnings.len(), "Email authentication scan finished.");
        let summary = data.status_message.clone();
        Ok(ScanOutcome::new(ScanData::EmailAuth(data), summary, issues))
    }
}

/// Error text per mechanism whose records could not be fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupFailures {
    pub spf: Option<String>,
    pub dmarc: Option<String>,
    pub dkim: Option<String>,
}

impl LookupFailures {
    fn entries(&self) -> Vec<(&'static str, &str)> {
        [("SPF", &self.spf), ("DMARC", &self.dmarc), ("DKIM", &self.dkim)]
            .into_iter()
            .filter_map(|(name, failure)| failure.as_deref().map(|e| (name, e)))
            .collect()
    }
}

/// Lower-cased `tag=value` pairs of a DMARC record.
fn dmarc_tags(record: &str) -> HashMap<String, String> {
    record
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_ascii_lowercase()))
        })
        .collect()
}

fn analyze_spf(
    spf: Option<&str>,
    failure: Option<&str>,
    dmarc_enforced: bool,
    issues: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    if let (None, Some(e)) = (spf, failure) {
        issues.push(format!("SPF lookup failed - TXT records could not be retrieved ({})", e));
        return;
    }
    let Some(record) = spf else {
        issues.push("No SPF record found - any server can send mail claiming to be from this domain".to_string());
        return;
    };
    let record = record.to_ascii_lowercase();

    if record.contains("~all") {
        debug!("SPF uses softfail, the recommended baseline.");
    } else if record.contains("-all") {
        if dmarc_enforced {
            warnings.push(
                "SPF uses hard fail (-all) alongside an enforcing DMARC policy - forwarded mail may be rejected \
                 before DMARC is evaluated, hurting deliverability; ~all is usually sufficient"
                    .to_string(),
            );
        } else {
            warnings.push(
                "SPF uses hard fail (-all) without an enforcing DMARC policy - consider ~all together with \
                 DMARC p=quarantine or p=reject"
                    .to_string(),
            );
        }
    } else if record.contains("+all") {
        issues.push("SPF record uses +all - any server is authorized to send mail (open relay)".to_string());
    } else if record.contains("?all") {
        warnings.push("SPF uses neutral (?all) - receivers are told nothing about unauthorized senders".to_string());
    } else if !record.contains("all") {
        warnings.push("SPF record is missing an 'all' mechanism".to_string());
    }

    let lookups = record.matches("include:").count() + record.matches("redirect=").count();
    if lookups > SPF_LOOKUP_LIMIT {
        issues.push(format!(
            "SPF record requires {} DNS lookups (include/redirect), exceeding the limit of {}",
            lookups, SPF_LOOKUP_LIMIT
        ));
    } else if lookups >= SPF_LOOKUP_LIMIT - 1 {
        warnings.push(format!(
            "SPF record uses {} of {} allowed DNS lookups - close to the limit",
            lookups, SPF_LOOKUP_LIMIT
        ));
    }
}

fn analyze_dmarc(dmarc: Option<&str>, failure: Option<&str>, issues: &mut Vec<String>, warnings: &mut Vec<String>) {
    if let (None, Some(e)) = (dmarc, failure) {
        issues.push(format!("DMARC lookup failed - record could not be retrieved ({})", e));
        return;
    }
    let Some(record) = dmarc else {
        issues.push("No DMARC record found - spoofed mail is not rejected".to_string());
        return;
    };
    let tags = dmarc_tags(record);

    match tags.get("p").map(String::as_str) {
        Some("none") => warnings.push("DMARC policy is p=none (monitoring only) - no protection against spoofing".to_string()),
        Some("quarantine") => warnings.push("DMARC policy is p=quarantine - consider upgrading to p=reject".to_string()),
        Some("reject") => {}
        _ => warnings.push("DMARC policy is not clearly defined".to_string()),
    }

    if !tags.contains_key("sp") {
        warnings.push("DMARC has no subdomain policy (sp=) - subdomains inherit the main policy".to_string());
    }
    if !tags.contains_key("rua") && !tags.contains_key("ruf") {
        warnings.push("DMARC has no reporting address (rua=/ruf=) - aggregate and failure reports are not collected".to_string());
    }
    match tags.get("pct").map(|raw| (raw, raw.parse::<u32>())) {
        Some((_, Ok(100))) | None => {}
        Some((_, Ok(pct))) => {
            warnings.push(format!("DMARC pct={} - the policy applies to only {}% of messages", pct, pct))
        }
        Some((raw, Err(_))) => {
            warnings.push(format!("DMARC pct={} is not a valid percentage - receivers may ignore the policy", raw))
        }
    }
}

fn analyze_dkim(
    selectors: &[String],
    selectors_checked: usize,
    failure: Option<&str>,
    issues: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    if let (true, Some(e)) = (selectors.is_empty(), failure) {
        issues.push(format!("DKIM lookup failed for all {} selectors ({})", selectors_checked, e));
    } else if selectors.is_empty() {
        issues.push(format!("No DKIM records found for {} common selectors", selectors_checked));
        warnings.push("DKIM may be configured with a custom selector that was not checked".to_string());
        warnings.push(
            "Check your mail provider's documentation for its DKIM selector and verify the \
             <selector>._domainkey TXT record"
                .to_string(),
        );
    } else {
        warnings.push(format!("DKIM found for selectors: {}", selectors.join(", ")));
    }
}

/// Applies the SPF, DMARC and DKIM policy tables. A mechanism listed in
/// `failures` is reported as a failed lookup, never as missing.
pub fn analyze_email_auth(
    spf: Option<&str>,
    dmarc: Option<&str>,
    dkim_selectors: Vec<String>,
    selectors_checked: usize,
    failures: &LookupFailures,
) -> (EmailAuthData, Vec<String>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let dmarc_enforced = dmarc
        .map(|record| matches!(dmarc_tags(record).get("p").map(String::as_str), Some("quarantine" | "reject")))
        .unwrap_or(false);

    analyze_spf(spf, failures.spf.as_deref(), dmarc_enforced, &mut issues, &mut warnings);
    analyze_dmarc(dmarc, failures.dmarc.as_deref(), &mut issues, &mut warnings);
    analyze_dkim(&dkim_selectors, selectors_checked, failures.dkim.as_deref(), &mut issues, &mut warnings);

    let mut data = EmailAuthData {
        spf: spf.map(str::to_string),
        dmarc: dmarc.map(str::to_string),
        has_spf: spf.is_some(),
        has_dmarc: dmarc.is_some(),
        has_dkim: !dkim_selectors.is_empty(),
        dkim_selectors,
        dmarc_enforced,
        warnings,
        status_message: String::new(),
        error: None,
    };

    let failed = failures.entries();
    if failed.is_empty() {
        data.status_message = EmailAuthStatus::of(&data).message(&data);
    } else {
        let names: Vec<&str> = failed.iter().map(|(name, _)| *name).collect();
        data.status_message =
            format!("Email authentication could not be fully checked - lookup failed for: {}", names.join(", "));
        let details: Vec<String> = failed.iter().map(|(name, e)| format!("{}: {}", name, e)).collect();
        data.error = Some(details.join("; "));
    }
    (data, issues)
}
