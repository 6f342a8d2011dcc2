//! zonewatch — occupancy tracking and debounced alerting core.
//!
//! Turns per-frame detection lists into stable track identities, tests
//! them against a configured zone of interest (rectangle or polygon),
//! accounts dwell time, and raises cooled-down alerts when thresholds
//! are crossed (capacity, surge, dwell, area transitions).
//!
//! The crate is the stateful middle of a video analytics pipeline:
//! detectors and capture feed it `Detection`s, renderers and persistence
//! consume the snapshots it hands out. The core itself is synchronous,
//! single-writer and never blocks on I/O; the optional SQLite sink is a
//! collaborator whose failures are swallowed.

pub mod alerts;
pub mod config;
pub mod db;
pub mod geometry;
pub mod logging;
pub mod occupancy;
pub mod pipeline;
pub mod tracker;
pub mod util;

pub use alerts::{AlertEngine, AlertKind, AlertRecord, AlertSink};
pub use config::{load_config, WatchConfig};
pub use geometry::{Rect, Zone};
pub use occupancy::Summary;
pub use pipeline::{Engine, FrameReport, IngestError};
pub use tracker::{Detection, ExitEvent, Tracker, TrackStatus};
