// src/main.rs

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::sync::Arc;
use tracing::{error, info};
use url::Url;
use vanguard_posture::config::Settings;
use vanguard_posture::core::knowledge_base::interpret;
use vanguard_posture::core::models::{ScanStatus, ScannerId, ScannerResult};
use vanguard_posture::core::probe::ReqwestTransport;
use vanguard_posture::core::service::ScanService;
use vanguard_posture::logging::initialize_logging;

/// Assess the security posture of an internet domain.
#[derive(Parser, Debug)]
#[command(name = "vanguard-posture", version, about)]
struct Cli {
    /// Domain (or URL) to assess
    domain: String,

    /// Run only the scanner with this id (dns, emailAuth, certificates, rdap, sslLabs, securityHeaders)
    #[arg(short, long)]
    scanner: Option<String>,

    /// Print the aggregate as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Ignore any cached result
    #[arg(long)]
    refresh: bool,

    /// Default per-scanner timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Mirror logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Accepts bare domains as well as URLs and returns the host part.
fn target_domain(raw_input: &str) -> String {
    let raw_input = raw_input.trim();
    let input_with_scheme = if !raw_input.starts_with("http://") && !raw_input.starts_with("https://") {
        format!("https://{}", raw_input)
    } else {
        raw_input.to_string()
    };
    Url::parse(&input_with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| raw_input.to_string())
}

/// Prints one line per scanner whose status changed since the last snapshot.
fn progress_printer() -> impl FnMut(&[ScannerResult]) {
    let mut seen: Vec<ScanStatus> = Vec::new();
    move |results: &[ScannerResult]| {
        if seen.len() != results.len() {
            seen = results.iter().map(|r| r.status).collect();
            eprintln!("Running {} scanner(s)...", results.len());
            return;
        }
        for (previous, result) in seen.iter_mut().zip(results) {
            if *previous != result.status {
                *previous = result.status;
                eprintln!("  [{}] {}", result.status, result.label);
            }
        }
    }
}

fn print_result(result: &ScannerResult) {
    let interpretation = interpret(result);
    println!("\n{} [{}]", result.label, interpretation.severity.as_ref().to_uppercase());
    println!("  {}", interpretation.message);
    if let Some(summary) = result.summary.as_deref().filter(|s| *s != interpretation.message) {
        println!("  {}", summary);
    }
    for issue in &result.issues {
        println!("  - {}", issue);
    }
    if let Some(warnings) = result.data.as_ref().map(|d| d.warnings()).filter(|w| !w.is_empty()) {
        for warning in warnings {
            println!("  ~ {}", warning);
        }
    }
    if !interpretation.recommendation.is_empty() {
        println!("  -> {}", interpretation.recommendation);
    }
    println!("  Source: {} ({})", result.data_source.name, result.data_source.url);
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = initialize_logging(cli.verbose)?;

    let settings = Settings::from_env().wrap_err("invalid configuration in environment")?;
    let transport = Arc::new(ReqwestTransport::new(&settings.user_agent, settings.request_timeout)?);
    let mut service = ScanService::from_settings(&settings, transport)?;
    if let Some(secs) = cli.timeout {
        service.orchestrator_mut().set_default_timeout_secs(secs)?;
    }

    let domain = target_domain(&cli.domain);
    info!(target = %domain, log = %log_path.display(), "Scan requested.");

    if let Some(id) = cli.scanner {
        let id = ScannerId::from(id);
        let result = match service.scan_one(&id, &domain, progress_printer()).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, scanner = %id, "Scan refused.");
                return Err(e.into());
            }
        };
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&result);
        }
        return Ok(());
    }

    let aggregate = match service.scan(&domain, cli.refresh, progress_printer()).await {
        Ok(aggregate) => aggregate,
        Err(e) => {
            error!(error = %e, "Scan refused.");
            return Err(e.into());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
        return Ok(());
    }

    println!("Security posture for {} ({})", aggregate.domain, aggregate.timestamp.to_rfc3339());
    for result in &aggregate.scanners {
        print_result(result);
    }
    println!("\n{} issue(s) in total.", aggregate.issues.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_domain_strips_scheme_and_path() {
        assert_eq!(target_domain("https://Example.com/login"), "example.com");
        assert_eq!(target_domain(" example.org "), "example.org");
    }
}
