// tests/common/mod.rs

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vanguard_posture::core::probe::ProbeContext;

pub const TYPE_A: u16 = 1;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;

pub fn ctx() -> ProbeContext {
    ProbeContext::new(CancellationToken::new())
}

/// A DNS-over-HTTPS JSON answer with one record per value.
pub fn doh(record_type: u16, values: &[&str]) -> String {
    let answers: Vec<_> = values
        .iter()
        .map(|v| json!({"name": "example.com.", "type": record_type, "TTL": 300, "data": v}))
        .collect();
    json!({"Status": 0, "Answer": answers}).to_string()
}

pub fn doh_empty() -> String {
    json!({"Status": 0}).to_string()
}

/// RFC 3339 timestamp `days` from now.
pub fn days_from_now(days: i64) -> String {
    (Utc::now() + ChronoDuration::days(days)).to_rfc3339()
}

/// crt.sh style timestamp (no zone) `days` from now.
pub fn ct_stamp(days: i64) -> String {
    (Utc::now() + ChronoDuration::days(days)).format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn bootstrap(tld: &str, server: &str) -> String {
    json!({"version": "1.0", "services": [[[tld], [server]]]}).to_string()
}

pub fn rdap_domain(expires_in_days: i64, nameservers: &[&str]) -> String {
    let nameservers: Vec<_> = nameservers.iter().map(|ns| json!({"ldhName": ns})).collect();
    json!({
        "ldhName": "EXAMPLE.COM",
        "status": ["client transfer prohibited"],
        "events": [
            {"eventAction": "registration", "eventDate": days_from_now(-3650)},
            {"eventAction": "expiration", "eventDate": days_from_now(expires_in_days)}
        ],
        "nameservers": nameservers,
        "secureDNS": {"delegationSigned": true},
        "entities": [
            {"roles": ["registrar"], "vcardArray": ["vcard", [["fn", {}, "text", "Example Registrar"]]]}
        ]
    })
    .to_string()
}

pub const HEADERS_REPORT: &str = r#"<html><body>
    <div class="score"><span>B</span></div>
    <div class="summary">Security Score: 70 / 100</div>
    <div class="reportSection">
      <div class="reportTitle">Missing Headers</div>
      <table><tr><th class="tableLabel table_red">Content-Security-Policy</th><td>..</td></tr></table>
    </div>
    </body></html>"#;
