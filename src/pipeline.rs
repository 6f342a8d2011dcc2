//! Frame Engine — per-frame orchestration of the counting core.
//!
//! One call per processed frame, strictly sequential:
//!   detections → tracker.update → tracker.update_occupancy
//!             → occupancy summary → alert engine
//! The engine owns the single-writer state; consumers read the owned
//! copies inside the returned `FrameReport`. Capture, inference and
//! rendering live outside this crate and only meet it through
//! `Detection` in and `FrameReport` out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alerts::{AlertEngine, AlertRecord, AlertSink};
use crate::config::WatchConfig;
use crate::geometry::Zone;
use crate::occupancy::{summarize_at, Summary};
use crate::tracker::{Detection, ExitEvent, Tracker, TrackStatus};
use crate::util::{fmt_hms, Throttle};

/// Malformed detector output, rejected at the ingestion boundary.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("degenerate bbox ({x1},{y1},{x2},{y2}): x1 < x2 and y1 < y2 required")]
    DegenerateBounds { x1: i32, y1: i32, x2: i32, y2: i32 },
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceRange(f32),
}

/// Validate one detection against the input contract.
pub fn validate_detection(det: &Detection) -> Result<(), IngestError> {
    let b = det.bbox;
    if b.x1 >= b.x2 || b.y1 >= b.y2 {
        return Err(IngestError::DegenerateBounds {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
        });
    }
    if !(0.0..=1.0).contains(&det.confidence) {
        return Err(IngestError::ConfidenceRange(det.confidence));
    }
    Ok(())
}

/// Global occupancy count with the permissive fallback: with no zone
/// configured every centroid counts as inside.
pub fn count_in_zone(detections: &[Detection], zone: Option<&Zone>) -> usize {
    detections
        .iter()
        .filter(|d| zone.map(|z| z.contains(d.centroid())).unwrap_or(true))
        .count()
}

/// Everything a consumer needs from one processed frame, copied out.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub occupancy: usize,
    pub summary: Summary,
    pub exits: Vec<ExitEvent>,
    pub alerts_fired: Vec<AlertRecord>,
}

pub struct Engine {
    tracker: Tracker,
    alerts: AlertEngine,
    zone: Option<Zone>,
    min_detection_size: i32,
    snapshot_throttle: Throttle,
    snapshot_sink: Option<Box<dyn AlertSink>>,
}

impl Engine {
    pub fn new(cfg: &WatchConfig) -> Self {
        Self {
            tracker: Tracker::new(cfg.tracking.clone()),
            alerts: AlertEngine::new(cfg.alerts.clone()),
            zone: cfg.zone.resolve(),
            min_detection_size: cfg.tracking.min_detection_size,
            snapshot_throttle: Throttle::new(cfg.snapshot.interval_sec),
            snapshot_sink: None,
        }
    }

    /// Wire the persistence collaborator. Two handles are needed because
    /// alert inserts and snapshot inserts both route to it.
    pub fn with_sinks(
        cfg: &WatchConfig,
        alert_sink: Box<dyn AlertSink>,
        snapshot_sink: Box<dyn AlertSink>,
    ) -> Self {
        let mut engine = Self::new(cfg);
        engine.alerts = AlertEngine::with_sink(cfg.alerts.clone(), alert_sink);
        engine.snapshot_sink = Some(snapshot_sink);
        engine
    }

    /// Swap the active zone. Takes effect from the next frame.
    pub fn set_zone(&mut self, zone: Option<Zone>) {
        self.zone = zone;
    }

    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    /// Process one frame of detections.
    ///
    /// Invalid detections (degenerate bounds, confidence out of range)
    /// fail the whole frame at the boundary; undersized boxes are
    /// filtered silently, matching the detector-side size gate.
    pub fn process_frame_at(
        &mut self,
        detections: &[Detection],
        now: DateTime<Utc>,
    ) -> Result<FrameReport, IngestError> {
        for det in detections {
            validate_detection(det)?;
        }
        let accepted: Vec<Detection> = detections
            .iter()
            .filter(|d| {
                let b = d.bbox;
                b.x2 - b.x1 >= self.min_detection_size && b.y2 - b.y1 >= self.min_detection_size
            })
            .copied()
            .collect();
        if accepted.len() < detections.len() {
            debug!(
                dropped = detections.len() - accepted.len(),
                "undersized detections filtered"
            );
        }

        self.tracker.update(&accepted);
        let exits = self.tracker.update_occupancy_at(self.zone.as_ref(), now);
        for exit in &exits {
            info!(
                track_id = exit.track_id,
                dwell = %fmt_hms(exit.dwell_secs),
                "track left zone"
            );
        }

        let occupancy = self.tracker.occupancy();
        let summary = summarize_at(&self.tracker, now);
        let tracks = self.tracker.status_at(now);
        let alerts_fired = self
            .alerts
            .evaluate_at(now, occupancy as i32, &tracks, &summary);

        if let Some(sink) = &self.snapshot_sink {
            if self.snapshot_throttle.ready_at(now) {
                if let Err(e) = sink.insert_snapshot(&summary, None) {
                    warn!("snapshot sink error: {}", e);
                }
            }
        }

        Ok(FrameReport { occupancy, summary, exits, alerts_fired })
    }

    /// Convenience wrapper using wall-clock time.
    pub fn process_frame(&mut self, detections: &[Detection]) -> Result<FrameReport, IngestError> {
        self.process_frame_at(detections, Utc::now())
    }

    /// Read-only per-track view for rendering consumers.
    pub fn tracks_at(&self, now: DateTime<Utc>) -> std::collections::BTreeMap<u64, TrackStatus> {
        self.tracker.status_at(now)
    }

    /// Most recent `n` alerts, insertion order preserved.
    pub fn recent_alerts(&self, n: usize) -> Vec<AlertRecord> {
        self.alerts.recent(n)
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    /// Discard all tracking state; ids restart from 1. Alert history is
    /// left alone — the alert log outlives a counting restart.
    pub fn reset_tracking(&mut self) {
        self.tracker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertConfig, ZoneConfig, ZoneMode};
    use crate::geometry::Rect;
    use chrono::Duration;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(Rect::new(x1, y1, x2, y2), 0, 0.9)
    }

    fn cfg_with_rect_zone() -> WatchConfig {
        let mut cfg = WatchConfig::default();
        cfg.tracking.min_detection_size = 0;
        // Covers the 100 px hop used by the zone-exit assertions below.
        cfg.tracking.max_match_distance = 120.0;
        cfg.zone = ZoneConfig {
            mode: ZoneMode::Rect,
            rect: Some([0, 0, 100, 100]),
            polygon: Vec::new(),
        };
        cfg.alerts = AlertConfig {
            area_transitions: false,
            ..AlertConfig::default()
        };
        cfg
    }

    #[test]
    fn validation_rejects_degenerate_bounds() {
        let bad = Detection::new(Rect::new(10, 0, 5, 10), 0, 0.9);
        assert!(matches!(
            validate_detection(&bad),
            Err(IngestError::DegenerateBounds { .. })
        ));
        let bad = Detection::new(Rect::new(0, 0, 10, 10), 0, 1.5);
        assert_eq!(validate_detection(&bad), Err(IngestError::ConfidenceRange(1.5)));
        assert!(validate_detection(&det(0, 0, 10, 10)).is_ok());
    }

    #[test]
    fn count_in_zone_permissive_without_zone() {
        let dets = [det(0, 0, 10, 10), det(500, 500, 520, 520)];
        assert_eq!(count_in_zone(&dets, None), 2);

        let zone = Zone::Rect(Rect::new(0, 0, 100, 100));
        assert_eq!(count_in_zone(&dets, Some(&zone)), 1);
    }

    #[test]
    fn frame_report_reflects_zone_membership() {
        let mut engine = Engine::new(&cfg_with_rect_zone());
        let t0 = Utc::now();

        // Centroid (50,50): inside.
        let report = engine.process_frame_at(&[det(40, 40, 60, 60)], t0).unwrap();
        assert_eq!(report.occupancy, 1);
        assert_eq!(report.summary.current, 1);

        // Centroid (150,50): outside — and the old track exits.
        let report = engine
            .process_frame_at(&[det(140, 40, 160, 60)], t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(report.occupancy, 0);
        assert_eq!(report.exits.len(), 1);
        assert_eq!(report.exits[0].dwell_secs, 3);
        // The hop stayed within match distance: one identity throughout.
        assert_eq!(report.summary.unique, 1);
    }

    #[test]
    fn undersized_detections_are_filtered_not_errors() {
        let mut cfg = cfg_with_rect_zone();
        cfg.tracking.min_detection_size = 20;
        let mut engine = Engine::new(&cfg);

        let report = engine
            .process_frame_at(&[det(40, 40, 50, 50)], Utc::now())
            .unwrap();
        assert_eq!(report.summary.unique, 0);
    }

    #[test]
    fn invalid_detection_fails_the_frame() {
        let mut engine = Engine::new(&cfg_with_rect_zone());
        let bad = Detection::new(Rect::new(10, 0, 5, 10), 0, 0.9);
        assert!(engine.process_frame_at(&[bad], Utc::now()).is_err());
    }

    #[test]
    fn zone_swap_takes_effect_next_frame() {
        let mut engine = Engine::new(&cfg_with_rect_zone());
        let t0 = Utc::now();
        engine.process_frame_at(&[det(40, 40, 60, 60)], t0).unwrap();
        assert_eq!(engine.tracks_at(t0)[&1].inside, true);

        engine.set_zone(Some(Zone::Rect(Rect::new(200, 200, 300, 300))));
        let report = engine
            .process_frame_at(&[det(40, 40, 60, 60)], t0 + Duration::seconds(1))
            .unwrap();
        assert_eq!(report.occupancy, 0);
        assert_eq!(report.exits.len(), 1);
    }
}
