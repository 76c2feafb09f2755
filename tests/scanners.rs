// tests/scanners.rs

mod common;

use common::*;
use hickory_resolver::proto::rr::RecordType;
use std::sync::Arc;
use std::time::Duration;
use vanguard_posture::core::knowledge_base::interpret;
use vanguard_posture::core::models::{ScanData, ScannerId, Severity};
use vanguard_posture::core::orchestrator::Orchestrator;
use vanguard_posture::core::probe::ct::CtClient;
use vanguard_posture::core::probe::dns::{DnsClient, COMMON_DKIM_SELECTORS};
use vanguard_posture::core::probe::mock::{MockReply, MockTransport};
use vanguard_posture::core::probe::rdap::RdapClient;
use vanguard_posture::core::probe::securityheaders::HeaderGradingClient;
use vanguard_posture::core::probe::ssllabs::GradingClient;
use vanguard_posture::core::scanner::email_scanner::EmailAuthStatus;
use vanguard_posture::core::scanner::{
    CertificateScanner, DnsScanner, EmailAuthScanner, RdapScanner, Scanner, SecurityHeadersScanner, TlsScanner,
};

const DOH: &str = "https://dns.test/resolve";
const BOOTSTRAP: &str = "https://iana.test/rdap/dns.json";
const SSLLABS: &str = "https://ssllabs.test/api/v3/analyze";
const SSLLABS_REPORT: &str = "https://ssllabs.test/analyze.html?d={domain}";
const HEADERS: &str = "https://headers.test/?q={domain}&hide=on";

#[tokio::test]
async fn dns_lookup_is_idempotent_and_unquotes_txt() {
    let transport = Arc::new(MockTransport::new().json(
        "name=example.com&type=TXT",
        doh(TYPE_TXT, &[r#""v=spf1 include:_spf.example.net " "~all""#]),
    ));
    let client = DnsClient::new(transport.clone(), DOH);
    let ctx = ctx();

    let first = client.lookup("example.com", RecordType::TXT, &ctx).await.unwrap();
    let second = client.lookup("example.com", RecordType::TXT, &ctx).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec!["v=spf1 include:_spf.example.net ~all"]);
    assert_eq!(transport.request_count("type=TXT"), 2);
}

#[tokio::test]
async fn dns_lookup_without_answers_is_empty_not_an_error() {
    let transport = Arc::new(MockTransport::new().json("type=MX", doh_empty()));
    let client = DnsClient::new(transport, DOH);
    let records = client.lookup("example.com", RecordType::MX, &ctx()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn email_scanner_queries_the_host_as_given() {
    let transport = Arc::new(
        MockTransport::new()
            .json("name=_dmarc.www.example.com&type=TXT", doh(TYPE_TXT, &["v=DMARC1; p=reject; sp=reject; rua=mailto:d@example.com"]))
            .json("name=s1._domainkey.www.example.com", doh(TYPE_TXT, &["v=DKIM1; k=rsa; p=MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC"]))
            .json("_domainkey.www.example.com", doh_empty())
            .json("name=www.example.com&type=TXT", doh(TYPE_TXT, &["v=spf1 include:_spf.example.net ~all"])),
    );
    let scanner = EmailAuthScanner::new(DnsClient::new(transport.clone(), DOH), Some(vec!["s1".into(), "s2".into()]));

    let outcome = scanner.run("www.example.com", &ctx()).await.unwrap();
    let ScanData::EmailAuth(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(EmailAuthStatus::of(data), EmailAuthStatus::Full);
    assert_eq!(outcome.summary, data.status_message);
    assert_eq!(outcome.issues, Some(Vec::new()));
    assert_eq!(data.dkim_selectors, vec!["s1"]);
    assert_eq!(transport.requests().len(), 4);
    assert!(transport.requests().iter().all(|url| url.contains("www.example.com")));
}

#[tokio::test]
async fn default_dkim_selectors_match_on_a_non_empty_key() {
    let transport = Arc::new(
        MockTransport::new()
            .json("name=google._domainkey.example.com", doh(TYPE_TXT, &["k=rsa; p=MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8A"]))
            .json("name=selector1._domainkey.example.com", doh(TYPE_TXT, &["k=rsa; p="]))
            .json("_domainkey.example.com", doh_empty())
            .json("name=_dmarc.example.com", doh(TYPE_TXT, &["v=DMARC1; p=reject"]))
            .json("name=example.com&type=TXT", doh(TYPE_TXT, &["v=spf1 ~all"])),
    );
    let scanner = EmailAuthScanner::new(DnsClient::new(transport.clone(), DOH), None);

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::EmailAuth(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(transport.request_count("_domainkey.example.com"), COMMON_DKIM_SELECTORS.len());
    assert_eq!(data.dkim_selectors, vec!["google"]);
    assert!(data.error.is_none());
    assert!(data.warnings.iter().any(|w| w == "DKIM found for selectors: google"));
}

#[tokio::test]
async fn resolver_outage_is_reported_as_lookup_failure() {
    let transport = Arc::new(MockTransport::new().fail("dns.test", "connection refused"));
    let client = DnsClient::new(transport, DOH);
    let mut orchestrator = Orchestrator::new(Duration::from_secs(30));
    orchestrator.register(Arc::new(DnsScanner::new(client.clone()))).unwrap();
    orchestrator.register(Arc::new(EmailAuthScanner::new(client, None))).unwrap();

    let aggregate = orchestrator.run_all("example.com", |_| {}).await;

    let dns = aggregate.scanner(&ScannerId::Dns).unwrap();
    assert_eq!(dns.summary.as_deref(), Some("DNS lookup failed"));
    assert!(dns.data.as_ref().and_then(|d| d.error()).is_some());
    assert_eq!(interpret(dns).severity, Severity::Error);

    let email = aggregate.scanner(&ScannerId::EmailAuth).unwrap();
    assert_eq!(
        email.summary.as_deref(),
        Some("Email authentication could not be fully checked - lookup failed for: SPF, DMARC, DKIM")
    );
    assert_eq!(email.issues.len(), 3);
    assert!(email.issues.iter().all(|i| i.contains("lookup failed")));
    assert!(email.data.as_ref().and_then(|d| d.error()).is_some());
    assert_eq!(interpret(email).severity, Severity::Error);
}

#[tokio::test]
async fn certificate_scanner_separates_empty_logs_from_failures() {
    let empty = Arc::new(MockTransport::new().json("ct.test", ""));
    let scanner = CertificateScanner::new(CtClient::new(empty, "https://ct.test/?q={domain}&output=json"));
    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    assert_eq!(outcome.summary, "No certificates found in transparency logs");
    assert_eq!(outcome.issues, Some(Vec::new()));

    let broken = Arc::new(MockTransport::new().status("ct.test", 502));
    let scanner = CertificateScanner::new(CtClient::new(broken, "https://ct.test/?q={domain}&output=json"));
    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    assert_eq!(outcome.summary, "Certificate transparency logs unavailable");
    assert!(outcome.data.error().is_some());
}

#[tokio::test]
async fn certificate_scanner_flags_imminent_expiry() {
    let body = serde_json::json!([{
        "id": 42,
        "issuer_name": "C=US, O=Let's Encrypt, CN=R3",
        "common_name": "example.com",
        "name_value": "example.com",
        "not_before": ct_stamp(-85),
        "not_after": ct_stamp(3),
    }])
    .to_string();
    let transport = Arc::new(MockTransport::new().json("ct.test", body));
    let scanner = CertificateScanner::new(CtClient::new(transport, "https://ct.test/?q={domain}"));
    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let issues = outcome.issues.unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].contains("renew immediately"));
}

#[tokio::test]
async fn rdap_unsupported_tld_only_queries_bootstrap() {
    let transport = Arc::new(MockTransport::new().json("iana.test", bootstrap("com", "https://rdap.test/")));
    let scanner = RdapScanner::new(RdapClient::new(transport.clone(), BOOTSTRAP));

    let outcome = scanner.run("example.zz", &ctx()).await.unwrap();
    assert_eq!(outcome.summary, "RDAP not available for this TLD");
    assert_eq!(outcome.issues, Some(Vec::new()));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn rdap_found_record_is_analyzed() {
    let transport = Arc::new(
        MockTransport::new()
            .json("iana.test", bootstrap("com", "https://rdap.test/"))
            .json("rdap.test/domain/example.com", rdap_domain(20, &["a.iana-servers.net", "b.iana-servers.net"])),
    );
    let scanner = RdapScanner::new(RdapClient::new(transport, BOOTSTRAP));
    let outcome = scanner.run("www.example.com", &ctx()).await.unwrap();
    let ScanData::Rdap(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(data.registrar.as_deref(), Some("Example Registrar"));
    assert_eq!(data.dnssec, Some(true));
    let issues = outcome.issues.unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].starts_with("Domain registration expires in"));
}

#[tokio::test]
async fn rdap_not_found_and_invalid_domains_are_results() {
    let transport = Arc::new(
        MockTransport::new()
            .json("iana.test", bootstrap("com", "https://rdap.test/"))
            .status("rdap.test/domain/", 404),
    );
    let scanner = RdapScanner::new(RdapClient::new(transport.clone(), BOOTSTRAP));

    let outcome = scanner.run("missing.com", &ctx()).await.unwrap();
    let ScanData::Rdap(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert!(data.not_found);

    let before = transport.requests().len();
    let outcome = scanner.run("localhost", &ctx()).await.unwrap();
    assert_eq!(outcome.summary, "Invalid domain format");
    assert_eq!(transport.requests().len(), before);
}

#[tokio::test]
async fn rdap_tries_each_server_until_one_answers() {
    let servers = r#"{"services":[[["com"],["https://rdap-a.test/","https://rdap-b.test/"]]]}"#;

    let transport = Arc::new(
        MockTransport::new()
            .json("iana.test", servers)
            .status("rdap-a.test", 503)
            .json("rdap-b.test/domain/example.com", rdap_domain(400, &["a.iana-servers.net", "b.iana-servers.net"])),
    );
    let scanner = RdapScanner::new(RdapClient::new(transport.clone(), BOOTSTRAP));
    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::Rdap(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(data.server.as_deref(), Some("https://rdap-b.test/"));
    assert_eq!(outcome.issues, Some(Vec::new()));
    let order: Vec<String> = transport.requests().into_iter().filter(|u| u.contains("/domain/")).collect();
    assert_eq!(order, vec!["https://rdap-a.test/domain/example.com", "https://rdap-b.test/domain/example.com"]);
}

#[tokio::test]
async fn rdap_reports_the_last_server_failure() {
    let servers = r#"{"services":[[["com"],["https://rdap-a.test/","https://rdap-b.test/"]]]}"#;

    let not_found_last = Arc::new(
        MockTransport::new()
            .json("iana.test", servers)
            .status("rdap-a.test", 503)
            .status("rdap-b.test", 404),
    );
    let outcome = RdapScanner::new(RdapClient::new(not_found_last, BOOTSTRAP))
        .run("example.com", &ctx())
        .await
        .unwrap();
    let ScanData::Rdap(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert!(data.not_found);
    assert_eq!(data.server.as_deref(), Some("https://rdap-b.test/"));

    let error_last = Arc::new(
        MockTransport::new()
            .json("iana.test", servers)
            .status("rdap-a.test", 404)
            .fail("rdap-b.test", "connection reset"),
    );
    let outcome = RdapScanner::new(RdapClient::new(error_last, BOOTSTRAP))
        .run("example.com", &ctx())
        .await
        .unwrap();
    let ScanData::Rdap(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert!(!data.not_found);
    assert_eq!(outcome.summary, "RDAP lookup failed");
    assert!(data.error.as_deref().is_some_and(|e| e.contains("connection reset")));
}

#[tokio::test(start_paused = true)]
async fn tls_scanner_polls_until_ready() {
    let pending = MockReply::Respond { status: 200, body: r#"{"status":"IN_PROGRESS"}"#.to_string() };
    let ready = MockReply::Respond {
        status: 200,
        body: r#"{"status":"READY","endpoints":[
            {"ipAddress":"192.0.2.1","grade":"A","details":{"protocols":[{"name":"TLS","version":"1.2"}],
             "forwardSecrecy":4,"hstsPolicy":{"status":"present","maxAge":31536000}}},
            {"ipAddress":"2001:db8::1","grade":"B","details":{"protocols":[{"name":"TLS","version":"1.1"}],
             "forwardSecrecy":4,"hstsPolicy":{"status":"present","maxAge":31536000}}}]}"#
            .to_string(),
    };
    let transport = Arc::new(MockTransport::new().route("ssllabs.test/api", vec![pending.clone(), pending, ready]));
    let client = GradingClient::new(transport.clone(), SSLLABS, None, Duration::from_secs(30), 5);
    let scanner = TlsScanner::new(client, SSLLABS_REPORT);

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::Tls(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(transport.request_count("ssllabs.test/api"), 3);
    assert!(transport.requests()[0].contains("fromCache=on"));
    assert_eq!(data.lowest_grade.as_deref(), Some("B"));
    assert_eq!(outcome.summary, "2 endpoint(s) graded: A, B");
    assert!(data.warnings.iter().any(|w| w.contains("TLS 1.1")));
}

#[tokio::test(start_paused = true)]
async fn tls_scanner_gives_up_after_poll_budget() {
    let transport = Arc::new(MockTransport::new().json("ssllabs.test/api", r#"{"status":"IN_PROGRESS"}"#));
    let client = GradingClient::new(transport.clone(), SSLLABS, None, Duration::from_secs(30), 2);
    let scanner = TlsScanner::new(client, SSLLABS_REPORT);

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::Tls(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(transport.request_count("ssllabs.test/api"), 2);
    assert_eq!(outcome.summary, "TLS assessment in progress");
    assert_eq!(data.report_url, "https://ssllabs.test/analyze.html?d=example.com");
    assert!(data.warnings[0].contains(&data.report_url));
}

#[tokio::test]
async fn tls_scanner_reports_a_terminal_grading_error() {
    let transport = Arc::new(MockTransport::new().json(
        "ssllabs.test/api",
        r#"{"status":"ERROR","statusMessage":"Unable to resolve domain name"}"#,
    ));
    let client = GradingClient::new(transport.clone(), SSLLABS, None, Duration::from_secs(30), 5);
    let scanner = TlsScanner::new(client, SSLLABS_REPORT);

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::Tls(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(transport.request_count("ssllabs.test/api"), 1);
    assert_eq!(outcome.summary, "TLS assessment failed: Unable to resolve domain name");
    assert_eq!(data.status, "ERROR");
    assert_eq!(data.error.as_deref(), Some("Unable to resolve domain name"));
    assert_eq!(outcome.issues.map(|i| i.len()), Some(1));
}

#[tokio::test]
async fn headers_scanner_goes_through_relay_and_reports_missing_headers() {
    let transport = Arc::new(MockTransport::new().route(
        "relay.test",
        vec![MockReply::Respond { status: 200, body: HEADERS_REPORT.to_string() }],
    ));
    let client = HeaderGradingClient::new(transport.clone(), HEADERS, Some("https://relay.test/raw?url={url}"));
    let scanner = SecurityHeadersScanner::new(client);

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    assert_eq!(outcome.issues, Some(vec!["Missing security header: Content-Security-Policy".to_string()]));
    assert_eq!(outcome.summary, "Grade B (score 70/100), 1 missing header(s)");
    let requested = &transport.requests()[0];
    assert!(requested.starts_with("https://relay.test/raw?url=https%3A%2F%2Fheaders.test"));
}

#[tokio::test]
async fn headers_scanner_failure_is_an_unavailable_outcome() {
    let transport = Arc::new(MockTransport::new().fail("headers.test", "connection reset"));
    let scanner = SecurityHeadersScanner::new(HeaderGradingClient::new(transport, HEADERS, None));

    let outcome = scanner.run("example.com", &ctx()).await.unwrap();
    let ScanData::SecurityHeaders(data) = &outcome.data else {
        panic!("unexpected data kind");
    };
    assert_eq!(outcome.summary, "Security header grading unavailable");
    assert!(data.error.is_some());
    assert_eq!(data.report_url, "https://headers.test/?q=example.com&hide=on");
}
