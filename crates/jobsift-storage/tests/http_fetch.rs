use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use jobsift_storage::{BackoffPolicy, FetchConfig, FetchError, FetchOrchestrator};

async fn serve() -> (String, Arc<AtomicUsize>) {
    let unavailable_hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/ok", get(|| async { "<html>ok</html>" }))
        .route(
            "/ua",
            get(|headers: HeaderMap| async move {
                headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
        .route("/gone", get(|| async { (StatusCode::NOT_FOUND, "gone") }))
        .route(
            "/unavailable",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "busy")
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .with_state(unavailable_hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    (format!("http://{addr}"), unavailable_hits)
}

fn fast_config() -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_millis(300),
        max_concurrency: 4,
        backoff: BackoffPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        },
        user_agents: vec!["jobsift-test/1.0".to_string()],
    }
}

#[tokio::test]
async fn reqwest_transport_classifies_live_responses() {
    let (base, unavailable_hits) = serve().await;
    let fetcher = FetchOrchestrator::new(fast_config()).expect("orchestrator");

    let urls: Vec<String> = ["/ok", "/ua", "/gone", "/unavailable", "/slow"]
        .iter()
        .map(|path| format!("{base}{path}"))
        .collect();
    let results = fetcher.fetch_all(urls).await;
    assert_eq!(results.len(), 5);

    let by_path = |path: &str| {
        results
            .iter()
            .find(|r| r.url.ends_with(path))
            .unwrap_or_else(|| panic!("missing result for {path}"))
    };

    let ok = by_path("/ok").outcome.as_ref().expect("ok page");
    assert_eq!(ok.status, 200);
    assert_eq!(ok.text(), "<html>ok</html>");

    let ua = by_path("/ua").outcome.as_ref().expect("ua page");
    assert_eq!(ua.text(), "jobsift-test/1.0");

    let gone = by_path("/gone");
    assert_eq!(gone.attempts, 1);
    assert!(matches!(
        gone.outcome,
        Err(FetchError::Permanent { status: Some(404), .. })
    ));

    let unavailable = by_path("/unavailable");
    assert_eq!(unavailable.attempts, 3);
    assert!(matches!(
        unavailable.outcome,
        Err(FetchError::Transient { attempts: 3, .. })
    ));
    assert_eq!(unavailable_hits.load(Ordering::SeqCst), 3);

    let slow = by_path("/slow");
    assert_eq!(slow.attempts, 3);
    assert!(matches!(slow.outcome, Err(FetchError::Transient { .. })));
}

#[tokio::test]
async fn streamed_results_arrive_before_slow_fetches_finish() {
    let (base, _) = serve().await;
    let fetcher = FetchOrchestrator::new(fast_config()).expect("orchestrator");

    let mut rx = fetcher.spawn_fetches([format!("{base}/slow"), format!("{base}/ok")]);
    let first = rx.recv().await.expect("first result");
    assert!(first.url.ends_with("/ok"));
    let second = rx.recv().await.expect("second result");
    assert!(second.url.ends_with("/slow"));
    assert!(rx.recv().await.is_none());
}
