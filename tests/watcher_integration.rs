use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use seowatch::extract::{parse_link, parse_page, SignalSource};
use seowatch::{
    LinkSignals, ObservationKind, ObservationStore, PageSignals, SchedulerState, SignalPayload,
    Target, Watcher, WatcherConfig,
};

/// Serves canned HTML per URL, going through the real extraction code paths
/// minus the network.
struct HtmlSource {
    pages: Mutex<HashMap<String, String>>,
}

impl HtmlSource {
    fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn set(&self, url: &str, html: &str) {
        self.pages.lock().insert(url.to_string(), html.to_string());
    }
}

#[async_trait]
impl SignalSource for HtmlSource {
    async fn page_signals(&self, url: &str) -> PageSignals {
        let Some(html) = self.pages.lock().get(url).cloned() else {
            return PageSignals::default();
        };
        let parsed = parse_page(&html);
        PageSignals {
            titles: parsed.titles,
            descriptions: parsed.descriptions,
            heading_counts: parsed.heading_counts,
            heading_contents: parsed.heading_contents,
            robots_meta: parsed.robots_meta,
            x_robots_tag: None,
            robots_allowed: Some(true),
        }
    }

    async fn link_signals(&self, source_url: &str, target_url: &str) -> LinkSignals {
        let Some(html) = self.pages.lock().get(source_url).cloned() else {
            return LinkSignals::default();
        };
        let source = url::Url::parse(source_url).expect("test URLs are valid");
        let parsed = parse_link(&html, &source, target_url);
        LinkSignals {
            link_path: parsed.link_path,
            hrefs_resolved: parsed.hrefs_resolved,
            rel_attribute: parsed.rel_attribute,
            robots_meta: parsed.robots_meta,
            x_robots_tag: None,
            anchor_text: parsed.anchor_text,
            parent_text: parsed.parent_text,
            robots_allowed: Some(true),
        }
    }
}

fn watcher_with(source: Arc<HtmlSource>, store: Arc<ObservationStore>) -> Watcher {
    Watcher::new(
        WatcherConfig {
            interval_mins: 1,
            max_workers: 4,
        },
        store,
        source,
    )
}

#[tokio::test]
async fn page_change_is_recorded_between_ticks() {
    let source = Arc::new(HtmlSource::new());
    source.set(
        "https://site.example/",
        "<html><head><title>Welcome</title></head><body><h1>Hello</h1></body></html>",
    );

    let store = Arc::new(ObservationStore::open_in_memory().unwrap());
    let watcher = watcher_with(Arc::clone(&source), Arc::clone(&store));
    let state = SchedulerState::new(vec![Target::Page {
        url: "https://site.example/".to_string(),
    }]);

    let first = watcher.run_tick(&state).await;
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.changed, 0);

    // Same content: no difference
    let second = watcher.run_tick(&state).await;
    assert_eq!(second.changed, 0);

    // Title and heading change
    source.set(
        "https://site.example/",
        "<html><head><title>Renamed</title></head><body><h1>Hello</h1><h2>New</h2></body></html>",
    );
    let third = watcher.run_tick(&state).await;
    assert_eq!(third.changed, 1);

    let differences = store.differences().unwrap();
    assert_eq!(differences.len(), 1);
    let summary = &differences[0].difference;
    assert!(summary.contains("titles changed from"));
    assert!(summary.contains("heading_counts changed from"));
    assert!(summary.contains("; "));
}

#[tokio::test]
async fn link_removal_shows_up_as_absent_fields() {
    let source = Arc::new(HtmlSource::new());
    source.set(
        "https://site.example/blog",
        r#"<html><body><p><a href="/partner" rel="sponsored">Partner</a></p></body></html>"#,
    );

    let store = Arc::new(ObservationStore::open_in_memory().unwrap());
    let watcher = watcher_with(Arc::clone(&source), Arc::clone(&store));
    let state = SchedulerState::new(vec![Target::Link {
        source: "https://site.example/blog".to_string(),
        target: "https://site.example/partner".to_string(),
    }]);

    watcher.run_tick(&state).await;

    // The tracked link disappears from the page
    source.set(
        "https://site.example/blog",
        r#"<html><body><p>No more links</p></body></html>"#,
    );
    let report = watcher.run_tick(&state).await;
    assert_eq!(report.changed, 1);

    let differences = store.differences().unwrap();
    let summary = &differences[0].difference;
    assert!(summary.contains("link_path changed from"));
    assert!(summary.contains("hrefs_resolved changed from"));
    assert!(summary.contains("rel_attribute changed from"));

    // The recorded payload is the newer (empty) observation
    match &differences[0].payload {
        SignalPayload::Link(signals) => {
            assert!(signals.link_path.is_none());
            assert!(signals.hrefs_resolved.is_empty());
        }
        other => panic!("expected link payload, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_page_records_empty_observation_not_failure() {
    let source = Arc::new(HtmlSource::new());
    let store = Arc::new(ObservationStore::open_in_memory().unwrap());
    let watcher = watcher_with(source, Arc::clone(&store));
    let state = SchedulerState::new(vec![Target::Page {
        url: "https://down.example/".to_string(),
    }]);

    let report = watcher.run_tick(&state).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let observations = store.observations().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(
        observations[0].payload,
        SignalPayload::Page(PageSignals {
            x_robots_tag: None,
            robots_allowed: None,
            ..Default::default()
        })
    );
}

#[tokio::test]
async fn parallel_targets_stay_isolated() {
    let source = Arc::new(HtmlSource::new());
    let mut targets = Vec::new();
    for i in 0..12 {
        let url = format!("https://site{}.example/", i);
        source.set(
            &url,
            &format!("<html><head><title>Site {}</title></head><body></body></html>", i),
        );
        targets.push(Target::Page { url });
    }

    let store = Arc::new(ObservationStore::open_in_memory().unwrap());
    let watcher = watcher_with(Arc::clone(&source), Arc::clone(&store));
    let state = SchedulerState::new(targets.clone());

    let report = watcher.run_tick(&state).await;
    assert_eq!(report.total, 12);
    assert_eq!(report.succeeded, 12);

    let observations = store.observations().unwrap();
    assert_eq!(observations.len(), 12);
    for (i, target) in targets.iter().enumerate() {
        let mine: Vec<_> = observations
            .iter()
            .filter(|o| o.subject_key == target.subject_key())
            .collect();
        assert_eq!(mine.len(), 1);
        match &mine[0].payload {
            SignalPayload::Page(signals) => {
                // Each subject carries its own title, never a sibling's
                assert_eq!(signals.titles, vec![format!("Site {}", i)]);
            }
            other => panic!("expected page payload, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn store_survives_reopen_on_disk() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("seo_data.db");

    {
        let store = ObservationStore::open(&db_path).unwrap();
        store
            .record_and_diff(
                ObservationKind::Page,
                "https://x/",
                &SignalPayload::Page(PageSignals {
                    titles: vec!["persisted".to_string()],
                    ..Default::default()
                }),
            )
            .unwrap();
    }

    let reopened = ObservationStore::open(&db_path).unwrap();
    let observations = reopened.observations().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].subject_key, "https://x/");
}
