// src/core/probe/dns.rs

use super::{HttpTransport, ProbeContext, ProbeRequest, ACCEPT_DNS_JSON};
use crate::core::error::ProbeError;
use futures::future::join_all;
use hickory_resolver::proto::rr::RecordType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Selectors published by common mail providers, checked when the caller
/// does not supply its own list.
pub const COMMON_DKIM_SELECTORS: &[&str] = &[
    "google", "selector1", "selector2", "default", "dkim", "dkim1", "dkim2", "k1", "k2", "k3",
    "s1", "s2", "s1024", "s2048", "mail", "email", "smtp", "mx", "key1", "key2", "sig1",
    "mandrill", "mailjet", "mailgun", "mg", "pm", "postmark", "sendgrid", "smtpapi", "amazonses",
    "zoho", "zmail", "protonmail", "protonmail2", "protonmail3", "fm1", "fm2", "fm3", "mxvault",
    "everlytickey1", "everlytickey2", "hs1", "hs2", "cm", "krs", "turbo-smtp",
];

static RE_DKIM_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:^|;)\s*p\s*=\s*([^;]*)").unwrap());

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: Option<u16>,
    data: String,
}

/// DNS-over-HTTPS JSON client.
#[derive(Clone)]
pub struct DnsClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
}

impl DnsClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: &str) -> Self {
        Self { transport, endpoint: endpoint.to_string() }
    }

    fn query_url(&self, name: &str, record_type: RecordType) -> Result<String, ProbeError> {
        let rtype = record_type.to_string();
        let url = url::Url::parse_with_params(&self.endpoint, &[("name", name), ("type", rtype.as_str())])
            .map_err(|e| ProbeError::Transport { url: self.endpoint.clone(), message: e.to_string() })?;
        Ok(url.into())
    }

    /// Answer values of `record_type` for `name`. No answer section means an
    /// empty list; only transport and decode failures are errors.
    pub async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        ctx: &ProbeContext,
    ) -> Result<Vec<String>, ProbeError> {
        let url = self.query_url(name, record_type)?;
        debug!(name, %record_type, "DoH lookup.");
        let response = self
            .transport
            .get(ProbeRequest::new(url, ACCEPT_DNS_JSON), ctx)
            .await?
            .ensure_success()?;
        let parsed: DohResponse = response.json()?;
        Ok(normalize_answers(parsed, record_type))
    }

    /// First `_dmarc.` TXT value carrying the DMARC version tag.
    pub async fn lookup_dmarc(&self, domain: &str, ctx: &ProbeContext) -> Result<Option<String>, ProbeError> {
        let dmarc_target = format!("_dmarc.{}", domain);
        let records = self.lookup(&dmarc_target, RecordType::TXT, ctx).await?;
        Ok(records.into_iter().find(|r| r.to_ascii_lowercase().contains("v=dmarc1")))
    }

    /// Probes every selector concurrently. Selectors whose lookup failed are
    /// reported separately from those that simply have no key.
    pub async fn probe_dkim(&self, domain: &str, selectors: Option<&[String]>, ctx: &ProbeContext) -> DkimProbe {
        let selectors: Vec<String> = match selectors {
            Some(custom) if !custom.is_empty() => custom.to_vec(),
            _ => COMMON_DKIM_SELECTORS.iter().map(|s| s.to_string()).collect(),
        };
        debug!(domain, count = selectors.len(), "Probing DKIM selectors.");

        let lookups = selectors.iter().map(|selector| async move {
            let dkim_target = format!("{selector}._domainkey.{domain}");
            (selector, self.lookup(&dkim_target, RecordType::TXT, ctx).await)
        });

        let mut probe = DkimProbe { checked: selectors.len(), ..Default::default() };
        for (selector, result) in join_all(lookups).await {
            match result {
                Ok(records) if records.iter().any(|r| is_dkim_record(r)) => probe.found.push(selector.clone()),
                Ok(_) => {}
                Err(e) => {
                    warn!(selector = %selector, error = %e, "DKIM lookup for this selector failed.");
                    probe.failed.push((selector.clone(), e.to_string()));
                }
            }
        }
        info!(domain, found = probe.found.len(), failed = probe.failed.len(), "DKIM probe finished.");
        probe
    }
}

/// Result of probing a list of DKIM selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DkimProbe {
    /// Selectors that published a DKIM key, in probe order.
    pub found: Vec<String>,
    /// Selectors whose lookup failed, with the error text.
    pub failed: Vec<(String, String)>,
    pub checked: usize,
}

impl DkimProbe {
    /// True when no selector could be looked up at all.
    pub fn all_failed(&self) -> bool {
        self.checked > 0 && self.failed.len() == self.checked
    }
}

fn normalize_answers(response: DohResponse, record_type: RecordType) -> Vec<String> {
    let wanted = u16::from(record_type);
    response
        .answer
        .unwrap_or_default()
        .into_iter()
        .filter(|a| a.record_type.is_none_or(|t| t == wanted))
        .map(|a| match record_type {
            RecordType::TXT => unquote_txt(&a.data),
            _ => a.data.trim().to_string(),
        })
        .collect()
}

/// Joins the character-strings of a TXT answer (`"a" "b"` -> `ab`).
pub fn unquote_txt(data: &str) -> String {
    let trimmed = data.trim();
    if !trimmed.starts_with('"') {
        return trimmed.to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut in_quotes = false;
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ if in_quotes => out.push(c),
            _ => {}
        }
    }
    out
}

/// First TXT value that starts with the SPF version tag.
pub fn extract_spf(txt_records: &[String]) -> Option<String> {
    txt_records
        .iter()
        .find(|r| r.trim_start().to_ascii_lowercase().starts_with("v=spf1"))
        .cloned()
}

/// A TXT value counts as DKIM if it carries the version tag or a non-empty key.
pub fn is_dkim_record(record: &str) -> bool {
    if record.to_ascii_lowercase().contains("v=dkim1") {
        return true;
    }
    RE_DKIM_KEY
        .captures(record)
        .and_then(|caps| caps.get(1))
        .is_some_and(|key| !key.as_str().trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spf_match_is_case_insensitive_and_first_wins() {
        let records = vec![
            "google-site-verification=abc".to_string(),
            "V=SPF1 include:_spf.example.net ~all".to_string(),
            "v=spf1 -all".to_string(),
        ];
        assert_eq!(extract_spf(&records).as_deref(), Some("V=SPF1 include:_spf.example.net ~all"));
        assert_eq!(extract_spf(&["v=DMARC1; p=none".to_string()]), None);
    }

    #[test]
    fn dkim_detection_accepts_version_or_key() {
        assert!(is_dkim_record("v=DKIM1; k=rsa; p=MIGfMA0"));
        assert!(is_dkim_record("k=rsa; p=MIGfMA0GCSqGSIb3"));
        assert!(!is_dkim_record("k=rsa; p="));
        assert!(!is_dkim_record("v=spf1 ~all"));
    }

    #[test]
    fn txt_strings_are_unquoted_and_joined() {
        assert_eq!(unquote_txt("\"v=spf1 \" \"-all\""), "v=spf1 -all");
        assert_eq!(unquote_txt("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(unquote_txt("v=spf1 ~all"), "v=spf1 ~all");
    }

    #[test]
    fn answers_are_filtered_to_requested_type() {
        let response: DohResponse = serde_json::from_str(
            r#"{"Status":0,"Answer":[
                {"name":"www.example.com.","type":5,"data":"example.com."},
                {"name":"example.com.","type":1,"data":"93.184.216.34"}]}"#,
        )
        .unwrap();
        assert_eq!(normalize_answers(response, RecordType::A), vec!["93.184.216.34"]);

        let empty: DohResponse = serde_json::from_str(r#"{"Status":3}"#).unwrap();
        assert!(normalize_answers(empty, RecordType::MX).is_empty());
    }
}
