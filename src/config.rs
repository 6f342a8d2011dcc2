//! Configuration — typed, validated sections with explicit defaults.
//!
//! Loaded from zonewatch.toml (working directory) with env-var
//! overrides. Env format: ZONEWATCH__SECTION__KEY (double underscore
//! separators). Non-positive thresholds disable the corresponding alert
//! check instead of erroring.

use serde::Deserialize;

use crate::geometry::{resolve_zone, Point, Rect, Zone};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

// ─── Tracking ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Maximum centroid distance (px) for a detection to match a track.
    #[serde(default = "default_max_match_distance")]
    pub max_match_distance: f64,
    /// Consecutive unmatched frames before a track is removed.
    #[serde(default = "default_max_track_lost_frames")]
    pub max_track_lost_frames: u32,
    /// Boxes narrower or shorter than this are dropped at ingestion.
    #[serde(default = "default_min_detection_size")]
    pub min_detection_size: i32,
}

fn default_max_match_distance() -> f64 {
    80.0
}
fn default_max_track_lost_frames() -> u32 {
    5
}
fn default_min_detection_size() -> i32 {
    20
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_match_distance: default_max_match_distance(),
            max_track_lost_frames: default_max_track_lost_frames(),
            min_detection_size: default_min_detection_size(),
        }
    }
}

// ─── Zone ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMode {
    Rect,
    Poly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_zone_mode")]
    pub mode: ZoneMode,
    /// [x1, y1, x2, y2]
    #[serde(default)]
    pub rect: Option<[i32; 4]>,
    /// [[x, y], ...]; needs at least 3 vertices to take effect.
    #[serde(default)]
    pub polygon: Vec<[i32; 2]>,
}

fn default_zone_mode() -> ZoneMode {
    ZoneMode::Rect
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            mode: default_zone_mode(),
            rect: None,
            polygon: Vec::new(),
        }
    }
}

impl ZoneConfig {
    /// Resolve the active zone. In poly mode a valid polygon wins and a
    /// degenerate one falls back to the rectangle; rect mode ignores the
    /// polygon entirely.
    pub fn resolve(&self) -> Option<Zone> {
        let rect = self.rect.map(|[x1, y1, x2, y2]| Rect::new(x1, y1, x2, y2));
        match self.mode {
            ZoneMode::Poly => {
                let pts: Vec<Point> = self.polygon.iter().map(|&[x, y]| (x, y)).collect();
                resolve_zone(rect, &pts)
            }
            ZoneMode::Rect => rect.map(Zone::Rect),
        }
    }
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Occupancy above this fires CAPACITY; <= 0 disables.
    #[serde(default = "default_capacity_threshold")]
    pub capacity_threshold: i32,
    /// Occupancy increase over the surge interval firing SURGE; <= 0 disables.
    #[serde(default)]
    pub surge_count: i32,
    #[serde(default = "default_surge_interval_sec")]
    pub surge_interval_sec: i64,
    /// Dwell seconds inside the zone firing DWELL; <= 0 disables.
    #[serde(default)]
    pub dwell_time_sec: i64,
    /// Minimum seconds between firings of the same alert key.
    #[serde(default = "default_cooldown_sec")]
    pub cooldown_sec: i64,
    /// Fire OCCUPIED/CLEAR on area-state transitions.
    #[serde(default = "default_area_transitions")]
    pub area_transitions: bool,
}

fn default_capacity_threshold() -> i32 {
    -1
}
fn default_surge_interval_sec() -> i64 {
    60
}
fn default_cooldown_sec() -> i64 {
    30
}
fn default_area_transitions() -> bool {
    true
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            capacity_threshold: default_capacity_threshold(),
            surge_count: 0,
            surge_interval_sec: default_surge_interval_sec(),
            dwell_time_sec: 0,
            cooldown_sec: default_cooldown_sec(),
            area_transitions: default_area_transitions(),
        }
    }
}

// ─── Snapshot / database ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Seconds between persisted occupancy snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub interval_sec: u64,
}

fn default_snapshot_interval() -> u64 {
    60
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { interval_sec: default_snapshot_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "zonewatch.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { enable: false, path: default_db_path() }
    }
}

/// Load configuration from zonewatch.toml + environment variable overrides.
///
/// Search order:
///   1. ./zonewatch.toml (working directory)
///   2. Environment variables: ZONEWATCH__ALERTS__CAPACITY_THRESHOLD, etc.
pub fn load_config() -> Result<WatchConfig, config::ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("zonewatch").required(false))
        .add_source(
            config::Environment::with_prefix("ZONEWATCH")
                .separator("__")
                .try_parsing(true),
        );

    let settings = builder.build()?;
    settings.try_deserialize::<WatchConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_optional_checks() {
        let cfg = WatchConfig::default();
        assert!(cfg.alerts.capacity_threshold <= 0);
        assert_eq!(cfg.alerts.surge_count, 0);
        assert_eq!(cfg.alerts.dwell_time_sec, 0);
        assert_eq!(cfg.alerts.cooldown_sec, 30);
        assert_eq!(cfg.tracking.max_track_lost_frames, 5);
    }

    #[test]
    fn zone_resolution_precedence() {
        let cfg = ZoneConfig {
            mode: ZoneMode::Poly,
            rect: Some([0, 0, 10, 10]),
            polygon: vec![[0, 0], [5, 0], [5, 5]],
        };
        assert!(matches!(cfg.resolve(), Some(Zone::Polygon(_))));

        // Degenerate polygon falls back to the rectangle.
        let cfg = ZoneConfig {
            mode: ZoneMode::Poly,
            rect: Some([0, 0, 10, 10]),
            polygon: vec![[0, 0], [5, 0]],
        };
        assert!(matches!(cfg.resolve(), Some(Zone::Rect(_))));

        // Rect mode ignores the polygon.
        let cfg = ZoneConfig {
            mode: ZoneMode::Rect,
            rect: None,
            polygon: vec![[0, 0], [5, 0], [5, 5]],
        };
        assert_eq!(cfg.resolve(), None);
    }

    #[test]
    fn toml_sections_deserialize() {
        let toml = r#"
            [tracking]
            max_match_distance = 120.0

            [zone]
            mode = "rect"
            rect = [0, 0, 640, 480]

            [alerts]
            capacity_threshold = 8
            dwell_time_sec = 30
        "#;
        let cfg: WatchConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.tracking.max_match_distance, 120.0);
        assert_eq!(cfg.alerts.capacity_threshold, 8);
        assert_eq!(cfg.alerts.cooldown_sec, 30);
        assert!(matches!(cfg.zone.resolve(), Some(Zone::Rect(_))));
    }
}
