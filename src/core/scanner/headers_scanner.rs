// src/core/scanner/headers_scanner.rs

use super::{Scanner, ScannerDescriptor};
use crate::core::error::{ProbeError, ScanError};
use crate::core::models::{DataSource, HeadersData, ScanData, ScanOutcome, ScannerId};
use crate::core::probe::securityheaders::{HeaderGradingClient, HeaderReport};
use crate::core::probe::ProbeContext;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

pub struct SecurityHeadersScanner {
    descriptor: ScannerDescriptor,
    client: HeaderGradingClient,
}

impl SecurityHeadersScanner {
    pub fn new(client: HeaderGradingClient) -> Self {
        Self {
            descriptor: ScannerDescriptor::new(
                ScannerId::SecurityHeaders,
                "Security Headers",
                "Reads the graded HTTP response header report for the site.",
                Some(Duration::from_secs(15)),
                DataSource::new("securityheaders.com", "https://securityheaders.com"),
            ),
            client,
        }
    }
}

#[async_trait]
impl Scanner for SecurityHeadersScanner {
    fn descriptor(&self) -> &ScannerDescriptor {
        &self.descriptor
    }

    async fn run(&self, domain: &str, ctx: &ProbeContext) -> Result<ScanOutcome, ScanError> {
        info!(target = %domain, "Starting headers scan.");
        let report_url = self.client.report_url(domain);
        match self.client.fetch(domain, ctx).await {
            Ok(report) => {
                let (data, issues) = analyze_headers(report, report_url);
                let summary = summarize_headers(&data);
                Ok(ScanOutcome::new(ScanData::SecurityHeaders(data), summary, issues))
            }
            Err(ProbeError::Cancelled) => Err(ProbeError::Cancelled.into()),
            Err(e) => {
                warn!(domain, error = %e, "Header grading unavailable.");
                let data = HeadersData {
                    warnings: vec![format!("Check the headers manually at {}", report_url)],
                    report_url,
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                Ok(ScanOutcome::new(
                    ScanData::SecurityHeaders(data),
                    "Security header grading unavailable",
                    Vec::new(),
                ))
            }
        }
    }
}

/// Missing headers become issues; headers flagged for attention stay warnings.
pub fn analyze_headers(report: HeaderReport, report_url: String) -> (HeadersData, Vec<String>) {
    let issues = report
        .missing
        .iter()
        .map(|name| format!("Missing security header: {}", name))
        .collect();
    let warnings = report
        .warnings
        .iter()
        .map(|name| format!("Security header needs attention: {}", name))
        .collect();
    let data = HeadersData {
        grade: report.grade,
        score: report.score,
        missing_headers: report.missing,
        warnings,
        report_url,
        error: None,
    };
    (data, issues)
}

pub fn summarize_headers(data: &HeadersData) -> String {
    let grade = data.grade.as_deref().unwrap_or("?");
    let mut summary = match data.score {
        Some(score) => format!("Grade {} (score {}/100)", grade, score),
        None => format!("Grade {}", grade),
    };
    if !data.missing_headers.is_empty() {
        summary.push_str(&format!(", {} missing header(s)", data.missing_headers.len()));
    }
    summary
}
