//! Severity ladders and recommendations for finished scanner results.
//! The recommendation texts live in one static table so they can be
//! reviewed and edited without touching the ladder logic.

use crate::core::models::{
    HeadersData, Interpretation, ScanData, ScanStatus, ScannerId, ScannerResult, Severity, TlsData,
};
use crate::core::scanner::email_scanner::EmailAuthStatus;
use crate::core::scanner::tls_scanner::grade_rank;

/// One recommendation entry, keyed by a machine-readable code.
pub struct Advice {
    /// A unique identifier such as "DNS_CRITICAL".
    pub code: &'static str,
    pub severity: Severity,
    /// Actionable next step shown next to the scanner's message.
    pub recommendation: &'static str,
}

static ADVICE: &[Advice] = &[
    // --- Generic ---
    Advice {
        code: "SCANNER_ERROR",
        severity: Severity::Error,
        recommendation: "The check did not finish. Retry the scan; if the failure persists the upstream service may be unavailable.",
    },
    Advice {
        code: "SCANNER_RUNNING",
        severity: Severity::Info,
        recommendation: "Wait for the check to finish.",
    },
    Advice {
        code: "GENERIC_OK",
        severity: Severity::Success,
        recommendation: "No action needed.",
    },
    Advice {
        code: "GENERIC_ISSUES",
        severity: Severity::Warning,
        recommendation: "Review the reported issues and address them.",
    },
    // --- DNS ---
    Advice {
        code: "DNS_OK",
        severity: Severity::Success,
        recommendation: "No action needed. Re-check after changing DNS providers or records.",
    },
    Advice {
        code: "DNS_WARNING",
        severity: Severity::Warning,
        recommendation: "Review the flagged records with your DNS provider and correct them.",
    },
    Advice {
        code: "DNS_UNAVAILABLE",
        severity: Severity::Error,
        recommendation: "The DNS resolver could not be queried, so the record checks are incomplete. Retry the scan.",
    },
    Advice {
        code: "DNS_CRITICAL",
        severity: Severity::Critical,
        recommendation: "Several DNS records are misconfigured. Fix them first, since mail and web delivery depend on them.",
    },
    // --- Email authentication ---
    Advice {
        code: "EMAIL_FULL",
        severity: Severity::Success,
        recommendation: "Keep reviewing DMARC aggregate reports for unexpected senders.",
    },
    Advice {
        code: "EMAIL_NOT_ENFORCED",
        severity: Severity::Warning,
        recommendation: "Move the DMARC policy to p=quarantine and then p=reject once reports show legitimate mail passes.",
    },
    Advice {
        code: "EMAIL_PARTIAL",
        severity: Severity::Warning,
        recommendation: "Publish the missing mechanisms. SPF, DKIM and DMARC only protect the domain together.",
    },
    Advice {
        code: "EMAIL_UNAVAILABLE",
        severity: Severity::Error,
        recommendation: "Some email records could not be looked up. Retry the scan before acting on the missing mechanisms.",
    },
    Advice {
        code: "EMAIL_NONE",
        severity: Severity::Critical,
        recommendation: "Anyone can send mail as this domain. Publish an SPF record, enable DKIM signing and add a DMARC policy.",
    },
    // --- Certificates ---
    Advice {
        code: "CERT_OK",
        severity: Severity::Success,
        recommendation: "Certificates look healthy. Keep automated renewal enabled.",
    },
    Advice {
        code: "CERT_ISSUES",
        severity: Severity::Warning,
        recommendation: "Replace self-signed certificates and renew certificates approaching expiry.",
    },
    Advice {
        code: "CERT_EXPIRING",
        severity: Severity::Critical,
        recommendation: "Renew the expiring certificate now and verify the renewal automation.",
    },
    Advice {
        code: "CERT_UNAVAILABLE",
        severity: Severity::Info,
        recommendation: "The transparency log could not be queried. Try again later.",
    },
    // --- RDAP ---
    Advice {
        code: "RDAP_OK",
        severity: Severity::Success,
        recommendation: "Keep auto-renew and registrar lock enabled.",
    },
    Advice {
        code: "RDAP_ISSUES",
        severity: Severity::Warning,
        recommendation: "Review the registration details with your registrar.",
    },
    Advice {
        code: "RDAP_CRITICAL",
        severity: Severity::Critical,
        recommendation: "The domain is at risk of going offline. Renew it or restore its nameservers with the registrar immediately.",
    },
    Advice {
        code: "RDAP_UNAVAILABLE",
        severity: Severity::Info,
        recommendation: "Registration data is not published over RDAP for this domain. Check the registry's WHOIS service instead.",
    },
    // --- TLS ---
    Advice {
        code: "TLS_OK",
        severity: Severity::Success,
        recommendation: "The TLS configuration is strong. Re-test after server or CDN changes.",
    },
    Advice {
        code: "TLS_WARNING",
        severity: Severity::Warning,
        recommendation: "Disable legacy protocols and weak ciphers, enable forward secrecy and a long-lived HSTS policy.",
    },
    Advice {
        code: "TLS_CRITICAL",
        severity: Severity::Critical,
        recommendation: "The TLS setup has serious weaknesses. Patch the reported vulnerabilities and fix the certificate chain.",
    },
    Advice {
        code: "TLS_PENDING",
        severity: Severity::Info,
        recommendation: "The assessment is still running. Open the external report to see the final grade.",
    },
    // --- Security headers ---
    Advice {
        code: "HEADERS_OK",
        severity: Severity::Success,
        recommendation: "Security headers are in good shape.",
    },
    Advice {
        code: "HEADERS_WARNING",
        severity: Severity::Warning,
        recommendation: "Add the missing headers, starting with Content-Security-Policy and Strict-Transport-Security.",
    },
    Advice {
        code: "HEADERS_CRITICAL",
        severity: Severity::Critical,
        recommendation: "Most protective headers are absent. Configure them at the web server or CDN.",
    },
    Advice {
        code: "HEADERS_UNAVAILABLE",
        severity: Severity::Info,
        recommendation: "The grading service could not be reached. Check the headers manually with the linked report.",
    },
];

/// Looks up a recommendation entry by code.
pub fn get_advice(code: &str) -> Option<&'static Advice> {
    ADVICE.iter().find(|a| a.code == code)
}

fn advise(code: &str, message: impl Into<String>) -> Interpretation {
    match get_advice(code) {
        Some(advice) => Interpretation::new(advice.severity, message, advice.recommendation),
        None => Interpretation::new(Severity::Info, message, ""),
    }
}

fn count_message(count: usize, what: &str) -> String {
    format!("{} {} issue(s) found", count, what)
}

/// Maps a scanner result to a severity, message and recommendation.
///
/// Errors short-circuit before any scanner-specific ladder. Unknown scanner
/// ids use the generic rule: no issues is success, anything else a warning.
pub fn interpret(result: &ScannerResult) -> Interpretation {
    match result.status {
        ScanStatus::Error => {
            let message = result.error.clone().unwrap_or_else(|| "Scanner failed".to_string());
            return advise("SCANNER_ERROR", message);
        }
        ScanStatus::Running => return advise("SCANNER_RUNNING", "Scan in progress"),
        ScanStatus::Complete => {}
    }

    match (&result.id, result.data.as_ref()) {
        (ScannerId::Dns, Some(ScanData::Dns(data))) if data.error.is_some() => {
            let failed = data.failed_lookups.join(", ");
            advise("DNS_UNAVAILABLE", format!("DNS lookup failed for {}", failed))
        }
        (ScannerId::Dns, _) => interpret_dns(result),
        (ScannerId::EmailAuth, Some(ScanData::EmailAuth(data))) if data.error.is_some() => {
            advise("EMAIL_UNAVAILABLE", data.status_message.clone())
        }
        (ScannerId::EmailAuth, Some(ScanData::EmailAuth(data))) => {
            // The aggregate class decides, so a record set with no issues can
            // still be a warning (DMARC p=none).
            let status = EmailAuthStatus::of(data);
            let code = match status {
                EmailAuthStatus::Full => "EMAIL_FULL",
                EmailAuthStatus::NotEnforced => "EMAIL_NOT_ENFORCED",
                EmailAuthStatus::Partial => "EMAIL_PARTIAL",
                EmailAuthStatus::None => "EMAIL_NONE",
            };
            advise(code, status.message(data))
        }
        (ScannerId::Certificates, data) => interpret_certificates(result, data),
        (ScannerId::Rdap, data) => interpret_rdap(result, data),
        (ScannerId::Tls, Some(ScanData::Tls(data))) => interpret_tls(result, data),
        (ScannerId::SecurityHeaders, Some(ScanData::SecurityHeaders(data))) => interpret_headers(result, data),
        _ => interpret_generic(result),
    }
}

fn interpret_generic(result: &ScannerResult) -> Interpretation {
    if result.issues.is_empty() {
        advise("GENERIC_OK", "No issues found")
    } else {
        advise("GENERIC_ISSUES", count_message(result.issues.len(), "potential"))
    }
}

fn interpret_dns(result: &ScannerResult) -> Interpretation {
    match result.issues.len() {
        0 => advise("DNS_OK", "DNS configuration looks healthy"),
        n @ 1..=2 => advise("DNS_WARNING", count_message(n, "DNS")),
        n => advise("DNS_CRITICAL", count_message(n, "DNS")),
    }
}

fn interpret_certificates(result: &ScannerResult, data: Option<&ScanData>) -> Interpretation {
    if data.and_then(ScanData::error).is_some() {
        return advise("CERT_UNAVAILABLE", "Certificate transparency logs could not be checked");
    }
    if let Some(imminent) = result.issues.iter().find(|i| i.contains("immediately")) {
        return advise("CERT_EXPIRING", imminent.clone());
    }
    match result.issues.len() {
        0 => advise("CERT_OK", result.summary.clone().unwrap_or_else(|| "No certificate problems found".to_string())),
        n => advise("CERT_ISSUES", count_message(n, "certificate")),
    }
}

fn interpret_rdap(result: &ScannerResult, data: Option<&ScanData>) -> Interpretation {
    let forced = result
        .issues
        .iter()
        .find(|i| i.contains("expired") || i.contains("no nameservers"));
    if let Some(issue) = forced {
        return advise("RDAP_CRITICAL", issue.clone());
    }
    if let Some(ScanData::Rdap(rdap)) = data {
        // Not-found carries no issue but is never a clean result.
        if rdap.not_found {
            return advise("RDAP_ISSUES", "Domain not found in the registry");
        }
        if rdap.server.is_none() && rdap.error.is_none() {
            return advise("RDAP_UNAVAILABLE", "RDAP not available for this TLD");
        }
    }
    match result.issues.len() {
        0 => advise("RDAP_OK", "Domain registration is in good standing"),
        n => advise("RDAP_ISSUES", count_message(n, "registration")),
    }
}

fn interpret_tls(result: &ScannerResult, data: &TlsData) -> Interpretation {
    if let Some(error) = data.error.as_deref() {
        return advise("TLS_WARNING", format!("TLS assessment failed: {}", error));
    }
    let Some(grade) = data.lowest_grade.as_deref() else {
        return advise("TLS_PENDING", "TLS assessment has not produced a grade yet");
    };
    let message = format!("Lowest TLS grade: {}", grade);
    // The grade outranks the issue count: B without findings is still a warning.
    match grade_rank(grade) {
        rank if rank <= grade_rank("A-") && result.issues.is_empty() => advise("TLS_OK", message),
        rank if rank <= grade_rank("B") => advise("TLS_WARNING", message),
        _ => advise("TLS_CRITICAL", message),
    }
}

fn interpret_headers(result: &ScannerResult, data: &HeadersData) -> Interpretation {
    if data.error.is_some() {
        return advise("HEADERS_UNAVAILABLE", format!("Header grading unavailable - check {}", data.report_url));
    }
    let Some(grade) = data.grade.as_deref() else {
        return match result.issues.len() {
            0 => advise("HEADERS_OK", "No missing security headers"),
            n => advise("HEADERS_WARNING", format!("{} security header(s) missing", n)),
        };
    };
    let message = format!("Security headers grade: {}", grade);
    match grade.trim_end_matches(['+', '-']) {
        "A" => advise("HEADERS_OK", message),
        "B" | "C" => advise("HEADERS_WARNING", message),
        _ => advise("HEADERS_CRITICAL", message),
    }
}
