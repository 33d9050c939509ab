pub mod cli;
pub mod config;
pub mod diff;
pub mod export;
pub mod extract;
pub mod logging;
pub mod network;
pub mod robots;
pub mod scheduler;
pub mod signals;
pub mod store;
pub mod targets;

// Re-export main types for library usage
pub use extract::{SignalExtractor, SignalSource};
pub use network::{FetchError, FetchResult, HttpClient};
pub use robots::{RobotsChecker, RobotsTxt};
pub use scheduler::{SchedulerState, TickReport, Watcher, WatcherConfig};
pub use signals::{
    HeadingCounts, LinkSignals, ObservationKind, PageSignals, SignalPayload, Target,
};
pub use store::{DifferenceRecord, Observation, ObservationStore, StoreError};
