// src/core/probe/securityheaders.rs

//! Adapter around a third-party header grading report page.
//!
//! The grading service has no public API, so the report is read from its
//! rendered HTML. All markup knowledge lives in this file; swapping in a
//! structured source only needs a new `fetch` implementation.

use super::{fill_domain, relayed, HttpTransport, ProbeContext, ProbeRequest, ACCEPT_HTML};
use crate::core::error::ProbeError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};

static RE_GRADE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-FR][+-]?$").unwrap());
static RE_SCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)score\D{0,40}?(\d{1,3})\s*/\s*100").unwrap());

static SEL_GRADE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.score span").unwrap());
static SEL_SECTION: Lazy<Selector> = Lazy::new(|| Selector::parse("div.reportSection").unwrap());
static SEL_SECTION_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.reportTitle").unwrap());
static SEL_LABEL: Lazy<Selector> = Lazy::new(|| Selector::parse("th.tableLabel").unwrap());
static SEL_MISSING: Lazy<Selector> = Lazy::new(|| Selector::parse("th.tableLabel.table_red").unwrap());
static SEL_WARNING: Lazy<Selector> = Lazy::new(|| Selector::parse("th.tableLabel.table_orange").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderReport {
    pub grade: Option<String>,
    pub score: Option<u8>,
    pub missing: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct HeaderGradingClient {
    transport: Arc<dyn HttpTransport>,
    url_template: String,
    relay_url: Option<String>,
}

impl HeaderGradingClient {
    pub fn new(transport: Arc<dyn HttpTransport>, url_template: &str, relay_url: Option<&str>) -> Self {
        Self {
            transport,
            url_template: url_template.to_string(),
            relay_url: relay_url.map(str::to_string),
        }
    }

    /// Public report URL for manual checks.
    pub fn report_url(&self, domain: &str) -> String {
        fill_domain(&self.url_template, domain)
    }

    pub async fn fetch(&self, domain: &str, ctx: &ProbeContext) -> Result<HeaderReport, ProbeError> {
        let target = self.report_url(domain);
        let url = relayed(self.relay_url.as_deref(), &target);
        let response = self
            .transport
            .get(ProbeRequest::new(url, ACCEPT_HTML), ctx)
            .await?
            .ensure_success()?;
        let report = parse_report(&response.body);
        if report.grade.is_none() && report.missing.is_empty() && report.warnings.is_empty() {
            return Err(ProbeError::Decode {
                url: response.url,
                message: "no grade found in report page".to_string(),
            });
        }
        info!(domain, grade = ?report.grade, missing = report.missing.len(), "Header grading report parsed.");
        Ok(report)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_unique(target: &mut Vec<String>, value: String) {
    if !value.is_empty() && !target.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        target.push(value);
    }
}

/// Extracts grade, score and the missing/warning entries from a report page.
pub fn parse_report(body: &str) -> HeaderReport {
    let document = Html::parse_document(body);
    let mut report = HeaderReport::default();

    report.grade = document
        .select(&SEL_GRADE)
        .map(element_text)
        .find(|text| RE_GRADE.is_match(text));

    report.score = RE_SCORE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .filter(|score| *score <= 100);

    let mut sectioned = false;
    for section in document.select(&SEL_SECTION) {
        let Some(title) = section.select(&SEL_SECTION_TITLE).next().map(element_text) else {
            continue;
        };
        let target = match title.to_ascii_lowercase().as_str() {
            "missing headers" => &mut report.missing,
            "warnings" => &mut report.warnings,
            _ => continue,
        };
        sectioned = true;
        for label in section.select(&SEL_LABEL) {
            push_unique(target, element_text(label));
        }
    }

    if !sectioned {
        debug!("Report sections not found, falling back to colour-coded labels.");
        for label in document.select(&SEL_MISSING) {
            push_unique(&mut report.missing, element_text(label));
        }
        for label in document.select(&SEL_WARNING) {
            push_unique(&mut report.warnings, element_text(label));
        }
    }

    report
}
