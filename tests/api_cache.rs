//! Result cache over HTTP (via the `X-Cache` header):
//! - MISS then HIT with the same `generated_at` for an identical query
//! - `refresh=1` recomputes and returns a newer `generated_at`
//! - different query shapes do not share entries

mod common;

use chrono::{Duration, Utc};
use common::{adapter, app_with, cache_header, get_json, raw};
use footballapi::model::SourceId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn app() -> axum::Router {
    let now = Utc::now();
    app_with(vec![adapter(
        SourceId::Espn,
        vec![raw(
            SourceId::Espn,
            "Arsenal",
            "Chelsea",
            Some("in"),
            Some((2, 2)),
            now - Duration::minutes(80),
            now,
        )],
    )])
}

#[tokio::test]
async fn same_snapshot_until_forced_refresh() {
    let app = app();

    let (_, h1, first) = get_json(&app, "/api/live-scores").await;
    let (_, h2, second) = get_json(&app, "/api/live-scores").await;
    assert_eq!(cache_header(&h1), "MISS");
    assert_eq!(cache_header(&h2), "HIT");
    assert_eq!(first["generated_at"], second["generated_at"]);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, h3, third) = get_json(&app, "/api/live-scores?refresh=1").await;
    assert_eq!(cache_header(&h3), "REFRESH");
    assert_ne!(first["generated_at"], third["generated_at"]);

    // The forced result replaces the cached one.
    let (_, h4, fourth) = get_json(&app, "/api/live-scores").await;
    assert_eq!(cache_header(&h4), "HIT");
    assert_eq!(third["generated_at"], fourth["generated_at"]);
}

#[tokio::test]
async fn query_shapes_are_cached_separately() {
    let app = app();
    let (_, h1, _) = get_json(&app, "/api/live-scores?status=live").await;
    let (_, h2, _) = get_json(&app, "/api/live-scores?status=all").await;
    let (_, h3, _) = get_json(&app, "/api/live-scores?status=LIVE&source=all").await;
    assert_eq!(cache_header(&h1), "MISS");
    assert_eq!(cache_header(&h2), "MISS");
    assert_eq!(cache_header(&h3), "HIT", "equivalent spelling maps to the same shape");
}

struct CountingAdapter {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl footballapi::providers::SourceAdapter for CountingAdapter {
    fn id(&self) -> SourceId {
        SourceId::Goal
    }

    async fn fetch(
        &self,
    ) -> Result<Vec<footballapi::model::RawObservation>, footballapi::providers::FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn cached_lookups_do_not_refetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app_with(vec![Arc::new(CountingAdapter {
        calls: calls.clone(),
    })]);

    for _ in 0..3 {
        get_json(&app, "/api/live-scores").await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    get_json(&app, "/api/live-scores?refresh=true").await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
