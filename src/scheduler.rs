use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::extract::SignalSource;
use crate::signals::{SignalPayload, Target};
use crate::store::{ObservationStore, StoreError};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Minutes between ticks, clamped to at least one.
    pub interval_mins: u64,
    /// Worker budget for one tick's fan-out.
    pub max_workers: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_mins: Config::DEFAULT_INTERVAL_MINS,
            max_workers: Config::DEFAULT_MAX_WORKERS,
        }
    }
}

/// Explicit per-tick state, passed into each tick so a single tick can be
/// exercised in isolation. Targets are fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    pub targets: Vec<Target>,
    pub tick: u64,
}

impl SchedulerState {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets, tick: 0 }
    }
}

/// Outcome of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub changed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives the observation pipeline: every tick fans out one task per target,
/// each running extract -> insert -> compare -> record-difference end to end.
#[derive(Clone)]
pub struct Watcher {
    config: WatcherConfig,
    store: Arc<ObservationStore>,
    source: Arc<dyn SignalSource>,
}

impl Watcher {
    pub fn new(
        config: WatcherConfig,
        store: Arc<ObservationStore>,
        source: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            config,
            store,
            source,
        }
    }

    /// Run ticks forever at the configured interval.
    ///
    /// Each tick's round is spawned as its own task: ticks are time-triggered,
    /// and a straggling round must not delay the next one.
    pub async fn run(&self, mut state: SchedulerState) {
        let minutes = self.config.interval_mins.max(Config::MIN_INTERVAL_MINS);
        let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_mins = minutes,
            targets = state.targets.len(),
            workers = self.config.max_workers,
            "watcher started"
        );

        loop {
            ticker.tick().await;
            state.tick += 1;

            let watcher = self.clone();
            let snapshot = state.clone();
            tokio::spawn(async move {
                watcher.run_tick(&snapshot).await;
            });
        }
    }

    /// Execute one round over every target with bounded parallelism, waiting
    /// for all tasks before reporting. A failed task is logged and counted;
    /// it never cancels its siblings.
    pub async fn run_tick(&self, state: &SchedulerState) -> TickReport {
        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for target in state.targets.clone() {
            let permits = Arc::clone(&permits);
            let watcher = self.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if the runtime is shutting down
                let _permit = permits.acquire_owned().await.ok();
                let subject = target.to_string();
                (subject, watcher.process_target(&target).await)
            });
        }

        let mut report = TickReport {
            tick: state.tick,
            total: state.targets.len(),
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((subject, Ok(change))) => {
                    report.succeeded += 1;
                    if let Some(summary) = change {
                        report.changed += 1;
                        tracing::info!(subject = %subject, summary = %summary, "change detected");
                    }
                }
                Ok((subject, Err(e))) => {
                    report.failed += 1;
                    tracing::warn!(subject = %subject, error = %e, "target processing failed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(error = %e, "task join error");
                }
            }
        }

        tracing::info!(
            tick = report.tick,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            changed = report.changed,
            "tick complete"
        );
        report
    }

    /// One target end to end. Extraction cannot fail (empty records stand in
    /// for fetch errors); a store failure aborts only this target's tick.
    async fn process_target(&self, target: &Target) -> Result<Option<String>, TaskError> {
        let payload = match target {
            Target::Link { source, target: link_target } => {
                SignalPayload::Link(self.source.link_signals(source, link_target).await)
            }
            Target::Page { url } => SignalPayload::Page(self.source.page_signals(url).await),
        };

        let summary =
            self.store
                .record_and_diff(target.kind(), &target.subject_key(), &payload)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    use crate::signals::{LinkSignals, PageSignals};

    /// Stub source that serves canned titles per URL and counts calls.
    struct StubSource {
        titles: Mutex<HashMap<String, String>>,
        calls: Mutex<u32>,
    }

    impl StubSource {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                titles: Mutex::new(
                    pages
                        .iter()
                        .map(|(url, title)| (url.to_string(), title.to_string()))
                        .collect(),
                ),
                calls: Mutex::new(0),
            }
        }

        fn set_title(&self, url: &str, title: &str) {
            self.titles.lock().insert(url.to_string(), title.to_string());
        }
    }

    #[async_trait]
    impl SignalSource for StubSource {
        async fn page_signals(&self, url: &str) -> PageSignals {
            *self.calls.lock() += 1;
            let title = self.titles.lock().get(url).cloned();
            PageSignals {
                titles: title.into_iter().collect(),
                ..Default::default()
            }
        }

        async fn link_signals(&self, _source_url: &str, target_url: &str) -> LinkSignals {
            *self.calls.lock() += 1;
            LinkSignals {
                hrefs_resolved: vec![target_url.to_string()],
                ..Default::default()
            }
        }
    }

    fn page_targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::Page {
                url: format!("https://site{}.example/", i),
            })
            .collect()
    }

    fn watcher(source: Arc<StubSource>, workers: usize) -> (Watcher, Arc<ObservationStore>) {
        let store = Arc::new(ObservationStore::open_in_memory().unwrap());
        let config = WatcherConfig {
            interval_mins: 1,
            max_workers: workers,
        };
        (Watcher::new(config, Arc::clone(&store), source), store)
    }

    #[tokio::test]
    async fn one_tick_observes_every_target() {
        let targets = page_targets(5);
        let pages: Vec<(String, String)> = targets
            .iter()
            .map(|t| match t {
                Target::Page { url } => (url.clone(), "title".to_string()),
                _ => unreachable!(),
            })
            .collect();
        let pairs: Vec<(&str, &str)> = pages
            .iter()
            .map(|(u, t)| (u.as_str(), t.as_str()))
            .collect();
        let source = Arc::new(StubSource::new(&pairs));
        let (watcher, store) = watcher(Arc::clone(&source), 2);

        let report = watcher.run_tick(&SchedulerState::new(targets)).await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(report.changed, 0);
        assert_eq!(store.observations().unwrap().len(), 5);
        assert!(store.differences().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_ticks_detect_changes_per_subject() {
        let source = Arc::new(StubSource::new(&[
            ("https://a.example/", "stable"),
            ("https://b.example/", "before"),
        ]));
        let (watcher, store) = watcher(Arc::clone(&source), 4);
        let state = SchedulerState::new(vec![
            Target::Page {
                url: "https://a.example/".to_string(),
            },
            Target::Page {
                url: "https://b.example/".to_string(),
            },
        ]);

        let first = watcher.run_tick(&state).await;
        assert_eq!(first.changed, 0);

        source.set_title("https://b.example/", "after");
        let second = watcher.run_tick(&state).await;

        assert_eq!(second.succeeded, 2);
        assert_eq!(second.changed, 1);

        let differences = store.differences().unwrap();
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].subject_key, "https://b.example/");
        assert!(differences[0].difference.contains("titles changed from"));
    }

    #[tokio::test]
    async fn worker_budget_does_not_change_results() {
        for workers in [1, 3, 16] {
            let targets = page_targets(8);
            let pairs: Vec<(String, String)> = targets
                .iter()
                .map(|t| match t {
                    Target::Page { url } => (url.clone(), format!("t-{}", url)),
                    _ => unreachable!(),
                })
                .collect();
            let refs: Vec<(&str, &str)> = pairs
                .iter()
                .map(|(u, t)| (u.as_str(), t.as_str()))
                .collect();
            let source = Arc::new(StubSource::new(&refs));
            let (watcher, store) = watcher(source, workers);

            let report = watcher.run_tick(&SchedulerState::new(targets.clone())).await;
            assert_eq!(report.succeeded, 8, "workers={}", workers);
            assert_eq!(store.observations().unwrap().len(), 8);

            // No cross-subject bleed: each subject has exactly one row
            let observations = store.observations().unwrap();
            for target in &targets {
                let count = observations
                    .iter()
                    .filter(|o| o.subject_key == target.subject_key())
                    .count();
                assert_eq!(count, 1);
            }
        }
    }

    #[tokio::test]
    async fn mixed_link_and_page_targets_store_their_kinds() {
        let source = Arc::new(StubSource::new(&[("https://p.example/", "page title")]));
        let (watcher, store) = watcher(source, 2);
        let state = SchedulerState::new(vec![
            Target::Page {
                url: "https://p.example/".to_string(),
            },
            Target::Link {
                source: "https://s.example/".to_string(),
                target: "https://t.example/".to_string(),
            },
        ]);

        let report = watcher.run_tick(&state).await;
        assert_eq!(report.succeeded, 2);

        let observations = store.observations().unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .any(|o| matches!(o.payload, SignalPayload::Page(_))));
        assert!(observations
            .iter()
            .any(|o| matches!(o.payload, SignalPayload::Link(_))));
    }
}
