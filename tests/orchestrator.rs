// tests/orchestrator.rs

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use vanguard_posture::config::Settings;
use vanguard_posture::core::error::{ConfigError, ServiceError};
use vanguard_posture::core::knowledge_base::interpret;
use vanguard_posture::core::models::{ScanStatus, ScannerId, Severity};
use vanguard_posture::core::orchestrator::Orchestrator;
use vanguard_posture::core::probe::mock::MockTransport;
use vanguard_posture::core::service::{MemoryCache, ScanService, WindowRateLimiter};

/// Upstreams for example.com with every service answering except TLS grading,
/// which never responds.
fn upstreams() -> MockTransport {
    let ct = serde_json::json!([{
        "id": 1,
        "issuer_name": "C=US, O=Let's Encrypt, CN=R3",
        "common_name": "example.com",
        "name_value": "example.com",
        "not_before": ct_stamp(-10),
        "not_after": ct_stamp(80),
    }])
    .to_string();

    MockTransport::new()
        .json("name=example.com&type=AAAA", doh_empty())
        .json("name=example.com&type=A", doh(TYPE_A, &["93.184.216.34"]))
        .json("name=example.com&type=MX", doh(TYPE_MX, &["10 mail.example.com."]))
        .json("name=example.com&type=TXT", doh(TYPE_TXT, &["v=spf1 ~all"]))
        .json("name=example.com&type=CNAME", doh_empty())
        .json("name=_dmarc.example.com", doh(TYPE_TXT, &["v=DMARC1; p=none"]))
        .json("_domainkey.example.com", doh_empty())
        .json("crt.sh", ct)
        .json("data.iana.org", bootstrap("com", "https://rdap.test/"))
        .json("rdap.test/domain/example.com", rdap_domain(400, &["a.iana-servers.net", "b.iana-servers.net"]))
        .hang("api.ssllabs.com")
        .json("securityheaders.com", HEADERS_REPORT)
}

#[tokio::test(start_paused = true)]
async fn hanging_upstream_only_fails_its_own_scanner() {
    let transport = Arc::new(upstreams());
    let orchestrator = Orchestrator::with_default_scanners(&Settings::default(), transport.clone()).unwrap();

    let mut snapshots = Vec::new();
    let aggregate = orchestrator
        .run_all(" EXAMPLE.com", |results| {
            snapshots.push(results.iter().map(|r| r.status).collect::<Vec<_>>());
        })
        .await;

    assert_eq!(aggregate.domain, "example.com");
    let ids: Vec<ScannerId> = aggregate.scanners.iter().map(|s| s.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            ScannerId::Dns,
            ScannerId::EmailAuth,
            ScannerId::Certificates,
            ScannerId::Rdap,
            ScannerId::Tls,
            ScannerId::SecurityHeaders
        ]
    );
    assert!(aggregate.scanners.iter().all(|s| s.status.is_terminal()));

    assert_eq!(snapshots.len(), 7);
    assert!(snapshots[0].iter().all(|s| *s == ScanStatus::Running));
    assert_eq!(snapshots.last().unwrap()[4], ScanStatus::Error);
    assert_eq!(
        snapshots[5].iter().filter(|s| **s == ScanStatus::Running).count(),
        1,
        "TLS settles last"
    );

    let tls = aggregate.scanner(&ScannerId::Tls).unwrap();
    assert_eq!(tls.error.as_deref(), Some("timed out after 600000ms"));
    assert_eq!(interpret(tls).severity, Severity::Error);

    for other in aggregate.scanners.iter().filter(|s| s.id != ScannerId::Tls) {
        assert_eq!(other.status, ScanStatus::Complete, "{} should complete", other.id);
    }

    let dns = aggregate.scanner(&ScannerId::Dns).unwrap();
    assert_eq!(dns.summary.as_deref(), Some("Found A:1, MX:1, TXT:1"));
    assert_eq!(interpret(dns).severity, Severity::Success);

    let email = aggregate.scanner(&ScannerId::EmailAuth).unwrap();
    assert_eq!(email.summary.as_deref(), Some("Partial email authentication - missing: DKIM"));

    let headers = aggregate.scanner(&ScannerId::SecurityHeaders).unwrap();
    assert_eq!(headers.issues, vec!["Missing security header: Content-Security-Policy"]);

    let flattened: Vec<String> = aggregate.scanners.iter().flat_map(|s| s.issues.clone()).collect();
    assert_eq!(aggregate.issues, flattened);
}

#[tokio::test(start_paused = true)]
async fn single_scanner_rerun_uses_the_same_contract() {
    let transport = Arc::new(upstreams());
    let orchestrator = Orchestrator::with_default_scanners(&Settings::default(), transport.clone()).unwrap();

    let result = orchestrator
        .run_one(&ScannerId::Rdap, "www.example.com", |_| {})
        .await
        .unwrap();
    assert_eq!(result.status, ScanStatus::Complete);
    assert!(result.issues.is_empty());
    assert_eq!(transport.request_count("api.ssllabs.com"), 0);
}

#[tokio::test(start_paused = true)]
async fn service_serves_cache_and_enforces_rate_limit() {
    let transport = Arc::new(upstreams());
    let mut settings = Settings::default();
    settings.default_timeout = Duration::from_secs(5);
    let orchestrator = Orchestrator::with_default_scanners(&settings, transport.clone()).unwrap();
    let service = ScanService::new(
        orchestrator,
        Arc::new(MemoryCache::new(Duration::from_secs(3600))),
        Arc::new(WindowRateLimiter::new(1, Duration::from_secs(3600))),
    );

    let first = service.scan("example.com", false, |_| {}).await.unwrap();
    let requests_after_first = transport.requests().len();

    let cached = service.scan("Example.com ", false, |_| {}).await.unwrap();
    assert_eq!(cached, first);
    assert_eq!(transport.requests().len(), requests_after_first);

    match service.scan("example.com", true, |_| {}).await {
        Err(ServiceError::RateLimited { retry_after }) => assert_eq!(retry_after, Duration::from_secs(3000)),
        other => panic!("expected rate limit, got {:?}", other.map(|a| a.domain)),
    }
}

#[tokio::test(start_paused = true)]
async fn single_scanner_rerun_through_service_is_rate_limited() {
    let transport = Arc::new(upstreams());
    let orchestrator = Orchestrator::with_default_scanners(&Settings::default(), transport.clone()).unwrap();
    let service = ScanService::new(
        orchestrator,
        Arc::new(MemoryCache::new(Duration::from_secs(3600))),
        Arc::new(WindowRateLimiter::new(1, Duration::from_secs(3600))),
    );

    match service.scan_one(&ScannerId::from("whois".to_string()), "example.com", |_| {}).await {
        Err(ServiceError::Config(ConfigError::UnknownScanner(id))) => assert_eq!(id, "whois"),
        other => panic!("expected unknown scanner, got {:?}", other.map(|r| r.id)),
    }

    let result = service.scan_one(&ScannerId::Rdap, "example.com", |_| {}).await.unwrap();
    assert_eq!(result.status, ScanStatus::Complete);
    let requests = transport.requests().len();

    match service.scan_one(&ScannerId::Rdap, "example.com", |_| {}).await {
        Err(ServiceError::RateLimited { .. }) => {}
        other => panic!("expected rate limit, got {:?}", other.map(|r| r.id)),
    }
    assert_eq!(transport.requests().len(), requests);
}
