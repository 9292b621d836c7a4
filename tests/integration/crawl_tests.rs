//! Integration tests for the crawler
//!
//! These tests drive a `JobRegistry` end-to-end against in-process fakes of
//! the browser, the OCR service and the advisor.

use crate::support::{
    eventually, fast_options, finish, status_of, FakePage, FakeRecognizer, FakeSite,
    HarnessBuilder, ScriptedAdvisor, FAKE_PNG,
};
use crawl_lens::advisory::StrategyPlan;
use crawl_lens::commands::{self, LogsQuery, StartRequest};
use crawl_lens::crawler::{JobCommand, RegistryError};
use chrono::Utc;
use crawl_lens::events::{LogEntry, LogKind, LogLevel};
use crawl_lens::state::{JobId, JobStatus};
use crawl_lens::storage::lock_store;
use std::collections::HashSet;
use std::time::Duration;

const ROOT: &str = "https://example.com/";

fn start(harness: &crate::support::Harness, url: &str, depth: i64) -> JobId {
    commands::start(
        &harness.registry,
        StartRequest {
            url: url.to_string(),
            depth,
            options: Some(fast_options()),
        },
    )
    .expect("Failed to start job")
    .job_id
}

/// Root page linking to three same-origin pages and one foreign page
fn example_site() -> FakeSite {
    FakeSite::new()
        .page(
            ROOT,
            FakePage::titled("Example Domain").with_links(&[
                "/a",
                "/b",
                "https://example.com/c#section",
                "https://other.org/elsewhere",
                "/a",
            ]),
        )
        .page(
            "https://example.com/a",
            FakePage::titled("A").with_links(&["/deeper"]),
        )
        .page("https://example.com/b", FakePage::titled("B"))
        .page("https://example.com/c", FakePage::titled("C"))
        .page("https://example.com/deeper", FakePage::titled("Deeper"))
}

/// Root linking to `count` leaf pages
fn wide_site(count: usize) -> FakeSite {
    let links: Vec<String> = (1..=count).map(|i| format!("/p{}", i)).collect();
    let refs: Vec<&str> = links.iter().map(String::as_str).collect();

    let mut site = FakeSite::new().page(ROOT, FakePage::titled("Home").with_links(&refs));
    for i in 1..=count {
        site = site.page(
            &format!("https://example.com/p{}", i),
            FakePage::titled(&format!("P{}", i)),
        );
    }
    site
}

#[tokio::test]
async fn test_depth_one_crawl_of_example_com() {
    let harness = HarnessBuilder::new(example_site()).build();
    let job_id = start(&harness, "https://example.com", 1);

    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 4);
    assert_eq!(view.screenshot_count, 4);
    assert_eq!(view.error_count, 0);
    assert_eq!(view.url, ROOT);

    let visited = harness.site.visited();
    assert_eq!(visited.first().map(String::as_str), Some(ROOT));
    assert_eq!(visited.len(), 4);
    assert!(!visited.iter().any(|u| u.contains("deeper")));
    assert!(!visited.iter().any(|u| u.contains("other.org")));

    let stored = lock_store(&harness.store).visited_urls(job_id).unwrap();
    assert_eq!(stored, visited);

    // Exactly one session, released exactly once
    assert_eq!(harness.site.closed(), 1);
    assert!(harness.registry.active_jobs().is_empty());
}

#[tokio::test]
async fn test_depth_bound_is_never_exceeded() {
    let site = FakeSite::new()
        .page(ROOT, FakePage::titled("Root").with_links(&["/one"]))
        .page(
            "https://example.com/one",
            FakePage::titled("One").with_links(&["/two"]),
        )
        .page(
            "https://example.com/two",
            FakePage::titled("Two").with_links(&["/three"]),
        )
        .page("https://example.com/three", FakePage::titled("Three"));
    let harness = HarnessBuilder::new(site).build();

    let job_id = start(&harness, ROOT, 2);
    let view = finish(&harness, job_id).await;

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 3);
    assert!(!harness.site.visited().iter().any(|u| u.ends_with("/three")));

    let artifacts = lock_store(&harness.store).artifacts(job_id).unwrap();
    assert!(artifacts.iter().all(|a| a.depth <= 2));
    assert_eq!(
        artifacts.iter().map(|a| a.depth).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[tokio::test]
async fn test_cyclic_links_are_visited_once() {
    let site = FakeSite::new()
        .page(ROOT, FakePage::titled("Root").with_links(&["/x", "/y"]))
        .page(
            "https://example.com/x",
            FakePage::titled("X").with_links(&["/", "/y", "/x?utm=1#top"]),
        )
        .page(
            "https://example.com/y",
            FakePage::titled("Y").with_links(&["/x", "/"]),
        )
        .page("https://example.com/x?utm=1", FakePage::titled("X again"));
    let harness = HarnessBuilder::new(site).build();

    let job_id = start(&harness, ROOT, 3);
    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    let visited = harness.site.visited();
    let unique: HashSet<&String> = visited.iter().collect();
    assert_eq!(unique.len(), visited.len(), "duplicate visit in {:?}", visited);
    assert_eq!(view.pages_processed as usize, visited.len());
}

#[tokio::test]
async fn test_stop_is_idempotent_and_releases_session_once() {
    let site = wide_site(20).with_latency(Duration::from_millis(50));
    let harness = HarnessBuilder::new(site).build();
    let job_id = start(&harness, ROOT, 1);

    let site = &harness.site;
    assert!(
        eventually(move || async move { site.visited().len() >= 2 }).await,
        "crawl never got going"
    );

    assert!(commands::stop(&harness.registry, job_id).success);
    assert!(commands::stop(&harness.registry, job_id).success);
    assert_eq!(status_of(&harness, job_id), JobStatus::Stopped);

    // A stopped job cannot be paused or resumed
    assert!(!commands::pause(&harness.registry, job_id).success);
    assert!(!commands::resume(&harness.registry, job_id).success);

    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Stopped);
    assert!(view.pages_processed < 21);
    assert_eq!(harness.site.closed(), 1);

    // Still a success once the job is gone from the registry
    assert!(harness.registry.active_jobs().is_empty());
    assert!(commands::stop(&harness.registry, job_id).success);
    assert_eq!(harness.site.closed(), 1);
}

#[tokio::test]
async fn test_pause_and_resume_preserve_progress() {
    let site = wide_site(5).with_latency(Duration::from_millis(30));
    let harness = HarnessBuilder::new(site).build();
    let job_id = start(&harness, ROOT, 1);

    let registry = &harness.registry;
    assert!(
        eventually(move || async move {
            registry
                .status(job_id)
                .unwrap()
                .map(|v| v.pages_processed >= 1)
                .unwrap_or(false)
        })
        .await
    );

    assert!(commands::pause(&harness.registry, job_id).success);
    assert!(!commands::pause(&harness.registry, job_id).success);
    assert_eq!(status_of(&harness, job_id), JobStatus::Paused);

    // Let the in-flight URL finish, then nothing may move
    tokio::time::sleep(Duration::from_millis(100)).await;
    let paused = harness.registry.status(job_id).unwrap().unwrap();
    let visited_while_paused = harness.site.visited().len();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let still = harness.registry.status(job_id).unwrap().unwrap();
    assert_eq!(still.status, JobStatus::Paused);
    assert_eq!(still.pages_processed, paused.pages_processed);
    assert_eq!(harness.site.visited().len(), visited_while_paused);
    assert!(visited_while_paused < 6);

    assert!(commands::resume(&harness.registry, job_id).success);
    let view = finish(&harness, job_id).await;

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 6);
    let visited = harness.site.visited();
    let unique: HashSet<&String> = visited.iter().collect();
    assert_eq!(visited.len(), 6);
    assert_eq!(unique.len(), 6);

    let snapshot = lock_store(&harness.store)
        .find_by_id(job_id)
        .unwrap()
        .unwrap();
    assert!(snapshot.timestamps.paused_at.is_some());
    assert!(snapshot.timestamps.resumed_at.is_some());
    assert!(snapshot.frontier.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_resume_racing_completion_still_completes() {
    let site = FakeSite::new().page(ROOT, FakePage::titled("Only page"));
    let harness = HarnessBuilder::new(site).build();
    let rounds = 50;

    for _ in 0..rounds {
        let job_id = start(&harness, ROOT, 1);

        // Toggle from this thread while the job runs on the workers
        let toggled = tokio::time::timeout(Duration::from_secs(5), async {
            while harness.registry.active_jobs().contains(&job_id) {
                commands::pause(&harness.registry, job_id);
                tokio::task::yield_now().await;
                commands::resume(&harness.registry, job_id);
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(toggled.is_ok(), "job {} never left the registry", job_id);

        let view = finish(&harness, job_id).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.pages_processed, 1);
    }

    assert_eq!(harness.site.closed(), rounds);
}

#[tokio::test]
async fn test_log_pages_are_capped() {
    let harness = HarnessBuilder::new(example_site()).build();
    let job_id = start(&harness, ROOT, 1);
    finish(&harness, job_id).await;

    {
        let mut store = lock_store(&harness.store);
        for i in 0..600 {
            store
                .append_log(&LogEntry {
                    job_id,
                    level: LogLevel::Debug,
                    kind: LogKind::System,
                    message: format!("filler {}", i),
                    data: None,
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
    }

    let page = harness.registry.logs(job_id, usize::MAX, 0).unwrap();
    assert_eq!(page.len(), commands::MAX_LOG_LIMIT);
    assert_eq!(page[0].message, "filler 599");

    assert!(harness
        .registry
        .logs(job_id, 10, usize::MAX)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_recognition_failure_does_not_stop_the_crawl() {
    let harness = HarnessBuilder::new(example_site())
        .recognizer(FakeRecognizer::broken())
        .build();
    let job_id = start(&harness, ROOT, 1);

    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 4);
    assert_eq!(view.error_count, 0);

    let artifacts = lock_store(&harness.store).artifacts(job_id).unwrap();
    assert_eq!(artifacts.len(), 4);
    for artifact in &artifacts {
        let recognition = artifact.recognition.as_ref().unwrap();
        assert!(recognition.is_failure());
        assert_eq!(recognition.confidence, 0.0);
        assert!(recognition.text.is_empty());
        assert!(artifact.keywords.is_empty());
    }

    let logs = harness.registry.logs(job_id, 500, 0).unwrap();
    assert!(logs
        .iter()
        .any(|e| e.kind == LogKind::Recognition && e.level == LogLevel::Warn));
}

#[tokio::test]
async fn test_recognized_text_yields_keywords() {
    let harness = HarnessBuilder::new(FakeSite::new().page(ROOT, FakePage::titled("Home")))
        .recognizer(FakeRecognizer::reading(
            "Rust crawler crawler screenshots and the crawler keywords",
        ))
        .build();
    let job_id = start(&harness, ROOT, 1);
    finish(&harness, job_id).await;

    let artifact = harness
        .registry
        .latest_screenshot(job_id)
        .unwrap()
        .unwrap();
    assert_eq!(artifact.keywords.first().map(String::as_str), Some("crawler"));
    assert!(!artifact.keywords.iter().any(|k| k == "the" || k == "and"));
    assert!(artifact.recognition.unwrap().confidence > 0.0);
}

#[tokio::test]
async fn test_unreachable_page_is_counted_and_skipped() {
    let site = example_site().page("https://example.com/b", FakePage::unreachable());
    let harness = HarnessBuilder::new(site).build();
    let job_id = start(&harness, ROOT, 1);

    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 3);
    assert_eq!(view.error_count, 1);

    let errors = lock_store(&harness.store).errors(job_id).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].url, "https://example.com/b");
    assert_eq!(errors[0].stage, "navigate");
}

#[tokio::test]
async fn test_invalid_start_requests_are_rejected() {
    let harness = HarnessBuilder::new(example_site()).build();

    for (url, depth) in [
        (ROOT, 0),
        (ROOT, 11),
        (ROOT, -1),
        ("ftp://example.com/", 1),
        ("not a url", 1),
        ("/relative/path", 1),
    ] {
        let result = commands::start(
            &harness.registry,
            StartRequest {
                url: url.to_string(),
                depth,
                options: None,
            },
        );
        assert!(
            matches!(result, Err(RegistryError::InvalidRequest(_))),
            "{} at depth {} should be rejected",
            url,
            depth
        );
    }

    let mut options = fast_options();
    options.max_scrolls = 0;
    let result = commands::start(
        &harness.registry,
        StartRequest {
            url: ROOT.to_string(),
            depth: 1,
            options: Some(options),
        },
    );
    assert!(matches!(result, Err(RegistryError::InvalidOptions(_))));

    assert!(harness.registry.active_jobs().is_empty());
    assert!(lock_store(&harness.store).list_jobs(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_admission_limit() {
    let site = wide_site(10).with_latency(Duration::from_millis(50));
    let harness = HarnessBuilder::new(site).max_active_jobs(1).build();

    let first = start(&harness, ROOT, 1);
    let rejected = commands::start(
        &harness.registry,
        StartRequest {
            url: ROOT.to_string(),
            depth: 1,
            options: Some(fast_options()),
        },
    );
    assert!(matches!(rejected, Err(RegistryError::AtCapacity(1))));

    assert!(harness.registry.command(first, JobCommand::Stop).success);
    finish(&harness, first).await;

    let second = start(&harness, ROOT, 1);
    assert_ne!(first, second);
    harness.registry.shutdown().await;
    assert_eq!(status_of(&harness, second), JobStatus::Stopped);
}

#[tokio::test]
async fn test_commands_on_unknown_job() {
    let harness = HarnessBuilder::new(example_site()).build();
    let unknown = JobId::new();

    assert!(!commands::pause(&harness.registry, unknown).success);
    assert!(!commands::resume(&harness.registry, unknown).success);
    assert!(!commands::stop(&harness.registry, unknown).success);
    assert!(matches!(
        commands::status(&harness.registry, unknown),
        Err(RegistryError::UnknownJob(id)) if id == unknown
    ));
    assert!(harness.registry.latest_screenshot(unknown).unwrap().is_none());
}

#[tokio::test]
async fn test_logs_are_newest_first_and_paged() {
    let harness = HarnessBuilder::new(example_site()).build();
    let job_id = start(&harness, ROOT, 1);
    finish(&harness, job_id).await;

    let all = commands::logs(
        &harness.registry,
        job_id,
        LogsQuery {
            limit: 500,
            offset: 0,
        },
    )
    .unwrap();
    assert!(all.len() > 4);
    assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(all.iter().all(|e| e.job_id == job_id));

    let page = commands::logs(
        &harness.registry,
        job_id,
        LogsQuery {
            limit: 2,
            offset: 1,
        },
    )
    .unwrap();
    assert_eq!(page, all[1..3].to_vec());

    let default_page = commands::logs(&harness.registry, job_id, LogsQuery::default()).unwrap();
    assert!(default_page.len() <= commands::DEFAULT_LOG_LIMIT);
}

#[tokio::test]
async fn test_screenshots_are_served_by_reference() {
    let harness = HarnessBuilder::new(example_site()).build();
    let job_id = start(&harness, ROOT, 1);
    finish(&harness, job_id).await;

    let latest = commands::latest_screenshot(&harness.registry, job_id)
        .unwrap()
        .unwrap();
    assert_eq!(latest.screenshot_ref, "000004.png");

    let bytes = commands::screenshot(&harness.registry, job_id, &latest.screenshot_ref)
        .await
        .unwrap();
    assert_eq!(bytes.as_deref(), Some(FAKE_PNG));

    let missing = commands::screenshot(&harness.registry, job_id, "999999.png")
        .await
        .unwrap();
    assert!(missing.is_none());

    let traversal = commands::screenshot(&harness.registry, job_id, "../../etc/passwd").await;
    assert!(matches!(traversal, Err(RegistryError::Screenshots(_))));
}

#[tokio::test]
async fn test_advisor_reorders_and_reflects() {
    let mut advisor = ScriptedAdvisor {
        plan: StrategyPlan {
            priority_urls: vec![
                "https://example.com/b".to_string(),
                "https://other.org/ignored".to_string(),
            ],
            rate_limit_ms: None,
            max_scrolls: Some(3),
        },
        suggestions: vec!["Try a deeper crawl next time".to_string()],
        ..ScriptedAdvisor::default()
    };
    advisor
        .analyses
        .insert(ROOT.to_string(), vec!["https://example.com/c".to_string()]);

    let harness = HarnessBuilder::new(example_site()).advisor(advisor).build();
    let mut options = fast_options();
    options.advisory_enabled = true;
    let job_id = commands::start(
        &harness.registry,
        StartRequest {
            url: ROOT.to_string(),
            depth: 1,
            options: Some(options),
        },
    )
    .unwrap()
    .job_id;

    let view = finish(&harness, job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.pages_processed, 4);

    // Root first, then the page analysis pick, then the planned URL
    let visited = harness.site.visited();
    assert_eq!(
        visited,
        vec![
            ROOT.to_string(),
            "https://example.com/c".to_string(),
            "https://example.com/b".to_string(),
            "https://example.com/a".to_string(),
        ]
    );

    let snapshot = lock_store(&harness.store)
        .find_by_id(job_id)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.options.max_scrolls, 3);

    let logs = harness.registry.logs(job_id, 500, 0).unwrap();
    assert!(logs
        .iter()
        .any(|e| e.kind == LogKind::Advisory && e.message == "Try a deeper crawl next time"));
}
