//! Crawl engine tests against mock HTTP servers

use crate::{refused_url, test_config};
use page_audit::crawler::{CrawlError, HtmlVersion, LinkProber, ReqwestFetcher};
use page_audit::CrawlEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_sample_page_extraction() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "TestBot/1.0.0"))
        .respond_with(html(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>Test Page</title></head>
<body>
  <h1>Main Heading</h1>
  <h2>Sub Heading</h2>
  <a href="/internal">Internal Link</a>
  <a href="{}/page">External Link</a>
</body>
</html>"#,
            other.uri()
        )))
        .mount(&site)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/internal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&site)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&other)
        .await;

    let engine = CrawlEngine::from_config(&test_config(":memory:")).expect("Failed to build engine");
    let report = engine
        .crawl(&format!("{}/", site.uri()), &CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.status_code, 200);
    assert_eq!(report.summary.html_version, HtmlVersion::Html5);
    assert_eq!(report.summary.title.as_deref(), Some("Test Page"));
    assert_eq!(report.summary.headings, [1, 1, 0, 0, 0, 0]);
    assert_eq!(report.summary.internal_links, 1);
    assert_eq!(report.summary.external_links, 1);
    assert_eq!(report.inaccessible_links, 0);
    assert!(!report.summary.has_login_form);
}

#[tokio::test]
async fn test_login_form_and_legacy_doctype() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html><head><title>Sign &amp; in</title></head>
<body><form method="post">
  <input type="text" name="user">
  <input type="PASSWORD" name="pass"/>
</form></body></html>"#,
        ))
        .mount(&site)
        .await;

    let engine = CrawlEngine::from_config(&test_config(":memory:")).expect("Failed to build engine");
    let report = engine
        .crawl(&format!("{}/login", site.uri()), &CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.summary.html_version, HtmlVersion::Xhtml10);
    assert_eq!(report.summary.title.as_deref(), Some("Sign & in"));
    assert!(report.summary.has_login_form);
    assert_eq!(report.links_checked, 0);
}

#[tokio::test]
async fn test_inaccessible_link_count() {
    let site = MockServer::start().await;
    let refused = refused_url();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<a href="/ok">ok</a>
<a href="/missing">missing</a>
<a href="/error">error</a>
<a href="{}">refused</a>
<a href="mailto:someone@example.com">mail</a>"#,
            refused
        )))
        .mount(&site)
        .await;

    for (route, status) in [("/ok", 200), ("/missing", 404), ("/error", 500)] {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&site)
            .await;
    }

    let engine = CrawlEngine::from_config(&test_config(":memory:")).expect("Failed to build engine");
    let report = engine
        .crawl(&format!("{}/", site.uri()), &CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.summary.internal_links, 3);
    assert_eq!(report.summary.external_links, 1);
    assert_eq!(report.links_checked, 4);
    assert_eq!(report.inaccessible_links, 2);
}

#[tokio::test]
async fn test_prober_falls_back_to_get_on_405() {
    let site = MockServer::start().await;

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&site)
        .await;

    let config = test_config(":memory:");
    let fetcher = ReqwestFetcher::from_config(&config.user_agent, Duration::from_secs(5))
        .expect("Failed to build client");
    let prober = LinkProber::new(Arc::new(fetcher), 2, Duration::from_secs(2), "TestBot/1.0.0");

    let base = url::Url::parse(&site.uri()).expect("Invalid mock URI");
    let count = prober
        .count_inaccessible(
            &base,
            &["/fine".to_string(), "/gone".to_string()],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_error_status_page_is_audited() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("<title>Server Error</title><h1>Oops</h1>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&site)
        .await;

    let engine = CrawlEngine::from_config(&test_config(":memory:")).expect("Failed to build engine");
    let report = engine
        .crawl(&format!("{}/broken", site.uri()), &CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(report.status_code, 500);
    assert_eq!(report.summary.title.as_deref(), Some("Server Error"));
}

#[tokio::test]
async fn test_unreachable_and_slow_targets() {
    let mut config = test_config(":memory:");
    config.crawler.crawl_timeout_ms = 300;
    config.crawler.probe_timeout_ms = 100;
    let engine = CrawlEngine::from_config(&config).expect("Failed to build engine");

    let err = engine
        .crawl(&refused_url(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Unreachable { .. }), "got {:?}", err);

    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<title>late</title>").set_delay(Duration::from_secs(3)))
        .mount(&site)
        .await;

    let err = engine
        .crawl(&site.uri(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Timeout { .. }), "got {:?}", err);
}
