//! Job orchestrator tests backed by a SQLite database

use crate::{test_config, POLL_INTERVAL};
use page_audit::config::Config;
use page_audit::jobs::{JobError, JobStatusView};
use page_audit::storage::{JobStore, ResultStore, SqliteStorage, UrlStore};
use page_audit::{CrawlEngine, JobOrchestrator, JobStatus, StoppedJob};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Setup {
    _dir: TempDir,
    storage: Arc<SqliteStorage>,
    orchestrator: JobOrchestrator,
}

fn setup(configure: impl FnOnce(&mut Config)) -> Setup {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("audit.db");
    let mut config = test_config(&db_path.display().to_string());
    configure(&mut config);

    let storage = Arc::new(SqliteStorage::new(&db_path).expect("Failed to open database"));
    let engine = Arc::new(CrawlEngine::from_config(&config).expect("Failed to build engine"));
    let orchestrator = JobOrchestrator::new(&config.pool, storage.clone(), storage.clone(), engine);

    Setup {
        _dir: dir,
        storage,
        orchestrator,
    }
}

async fn register(storage: &SqliteStorage, url: &str) -> i64 {
    UrlStore::register(storage, url)
        .await
        .expect("Failed to register URL")
        .id
}

async fn wait_for_status(
    orchestrator: &JobOrchestrator,
    job_id: i64,
    wanted: JobStatus,
) -> JobStatusView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = orchestrator.status(job_id).await.expect("Failed to read job");
        if view.status == wanted {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {} waiting for {}",
            job_id,
            view.status,
            wanted
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn slow_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<title>slow</title>")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_end_to_end_job() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<!DOCTYPE html><title>Shop</title><h1>Shop</h1><h3>Deals</h3>
<a href="/deals">Deals</a><a href="/old">Old</a>
<form><input type="password" name="pw"></form>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&site)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/deals"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&site)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&site)
        .await;

    let s = setup(|_| {});
    let target = format!("{}/", site.uri());
    let url_id = register(&s.storage, &target).await;

    let job_id = s
        .orchestrator
        .start(url_id, &target, &CancellationToken::new())
        .await
        .expect("Failed to start job");
    let view = wait_for_status(&s.orchestrator, job_id, JobStatus::Completed).await;
    assert!(view.started_at.is_some());
    assert!(view.completed_at.is_some());

    let result = ResultStore::latest_for_url(s.storage.as_ref(), url_id)
        .await
        .expect("Failed to read result")
        .expect("Missing result");
    assert_eq!(result.job_id, job_id);
    assert_eq!(result.html_version.as_deref(), Some("HTML5"));
    assert_eq!(result.title.as_deref(), Some("Shop"));
    assert_eq!(result.heading_count(1), 1);
    assert_eq!(result.heading_count(3), 1);
    assert_eq!(result.internal_links, 2);
    assert_eq!(result.external_links, 0);
    assert_eq!(result.inaccessible_links, 1);
    assert!(result.has_login_form);

    s.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_failed_crawl_is_recorded() {
    let s = setup(|_| {});
    let target = crate::refused_url();
    let url_id = register(&s.storage, &target).await;

    let job_id = s
        .orchestrator
        .start(url_id, &target, &CancellationToken::new())
        .await
        .expect("Failed to start job");
    let view = wait_for_status(&s.orchestrator, job_id, JobStatus::Failed).await;

    assert!(view.error.is_some());
    assert!(ResultStore::for_job(s.storage.as_ref(), job_id)
        .await
        .expect("Failed to read result")
        .is_none());

    s.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_stop_running_job() {
    let site = slow_server().await;
    let s = setup(|_| {});
    let target = format!("{}/", site.uri());
    let url_id = register(&s.storage, &target).await;

    let job_id = s
        .orchestrator
        .start(url_id, &target, &CancellationToken::new())
        .await
        .expect("Failed to start job");
    wait_for_status(&s.orchestrator, job_id, JobStatus::Running).await;

    let stopped = s.orchestrator.stop(&[url_id]).await.expect("Failed to stop");
    assert_eq!(stopped, vec![StoppedJob { url_id, job_id }]);

    tokio::time::timeout(Duration::from_secs(5), s.orchestrator.shutdown())
        .await
        .expect("Shutdown did not finish");

    let view = s.orchestrator.status(job_id).await.expect("Failed to read job");
    assert_eq!(view.status, JobStatus::Stopped);
    assert_eq!(view.error.as_deref(), Some("Stopped by user"));
    assert!(view.completed_at.is_some());

    // A second stop finds nothing active.
    let again = s.orchestrator.stop(&[url_id]).await.expect("Failed to stop");
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_full_queue_start_is_cancellable() {
    let site = slow_server().await;
    let s = setup(|config| {
        config.pool.workers = 1;
        config.pool.queue_capacity = 1;
        config.crawler.crawl_timeout_ms = 60_000;
    });
    let target = format!("{}/", site.uri());
    let url_id = register(&s.storage, &target).await;
    let open = CancellationToken::new();

    let running = s.orchestrator.start(url_id, &target, &open).await.expect("start");
    wait_for_status(&s.orchestrator, running, JobStatus::Running).await;
    let waiting = s.orchestrator.start(url_id, &target, &open).await.expect("start");

    let cancelled = CancellationToken::new();
    let pending = {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancelled.cancel();
        })
    };
    let err = s
        .orchestrator
        .start(url_id, &target, &cancelled)
        .await
        .unwrap_err();
    pending.await.expect("cancel task panicked");

    let JobError::Cancelled { job_id } = err else {
        panic!("expected Cancelled, got {:?}", err);
    };

    let history = JobStore::history_for_url(s.storage.as_ref(), url_id)
        .await
        .expect("Failed to read history");
    let ids: Vec<i64> = history.iter().map(|job| job.id).collect();
    assert_eq!(ids, vec![job_id, waiting, running]);

    let queued: Vec<i64> = history
        .iter()
        .filter(|job| job.status == JobStatus::Queued)
        .map(|job| job.id)
        .collect();
    assert_eq!(queued, vec![job_id, waiting]);
}
