use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use pretty_assertions::assert_eq;

use weather_db::retrieve::{Freshness, HttpRetriever, Retrieve};

const ETAG: &str = "\"v1\"";

#[derive(Clone, Default)]
struct Hits {
    not_modified: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

async fn listing(State(hits): State<Hits>, headers: HeaderMap) -> Response {
    let revalidated = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        == Some(ETAG);
    if revalidated {
        hits.not_modified.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, ETAG)]).into_response();
    }
    ([(header::ETAG, ETAG)], "KMKE;KMWC").into_response()
}

async fn plain() -> &'static str {
    "same body"
}

async fn release(State(hits): State<Hits>) -> String {
    let n = hits.releases.fetch_add(1, Ordering::SeqCst);
    format!("release {n}")
}

async fn always_not_modified() -> StatusCode {
    StatusCode::NOT_MODIFIED
}

async fn overloaded() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn start_server(hits: Hits) -> String {
    let app = Router::new()
        .route("/listing.txt", get(listing))
        .route("/plain.txt", get(plain))
        .route("/release.txt", get(release))
        .route("/stale.txt", get(always_not_modified))
        .route("/overloaded.txt", get(overloaded))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn retriever(cache_dir: &std::path::Path) -> HttpRetriever {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpRetriever::with_client(client, cache_dir)
}

#[tokio::test]
async fn not_modified_replays_cached_body() {
    let dir = tempfile::tempdir().unwrap();
    let hits = Hits::default();
    let base = start_server(hits.clone()).await;
    let retriever = retriever(dir.path());
    let url = format!("{base}/listing.txt");

    let first = retriever.retrieve(&url).await.unwrap();
    assert_eq!(first.freshness, Freshness::Fresh);
    assert_eq!(first.content, b"KMKE;KMWC");

    let second = retriever.retrieve(&url).await.unwrap();
    assert_eq!(second.freshness, Freshness::Unchanged);
    assert_eq!(second.content, b"KMKE;KMWC");
    assert_eq!(hits.not_modified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identical_body_without_validators_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let hits = Hits::default();
    let base = start_server(hits.clone()).await;
    let retriever = retriever(dir.path());

    let url = format!("{base}/plain.txt");
    assert_eq!(retriever.retrieve(&url).await.unwrap().freshness, Freshness::Fresh);
    let again = retriever.retrieve(&url).await.unwrap();
    assert_eq!(again.freshness, Freshness::Unchanged);
    assert_eq!(again.content, b"same body");

    let url = format!("{base}/release.txt");
    assert_eq!(retriever.retrieve(&url).await.unwrap().freshness, Freshness::Fresh);
    let next = retriever.retrieve(&url).await.unwrap();
    assert_eq!(next.freshness, Freshness::Fresh);
    assert_eq!(next.content, b"release 1");
}

#[tokio::test]
async fn other_statuses_are_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_server(Hits::default()).await;
    let retriever = retriever(dir.path());

    for (path, status) in [("/missing.txt", 404), ("/overloaded.txt", 503), ("/stale.txt", 304)] {
        let got = retriever.retrieve(&format!("{base}{path}")).await.unwrap();
        assert_eq!(got.freshness, Freshness::Unavailable { status }, "{path}");
        assert!(got.content.is_empty());
    }
}
