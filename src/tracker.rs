//! Centroid Tracker — frame-to-frame identity, track lifecycle, dwell timers.
//!
//! Matches detected bounding boxes across frames by nearest centroid
//! distance. Each object gets a monotonically increasing integer id that
//! is never reused. Matching is greedy in detection input order — each
//! existing track is consumed at most once per frame and there is no
//! backtracking. That order dependence is a deliberate latency/simplicity
//! trade-off and is kept bit-for-bit deterministic: tracks are stored in
//! a `BTreeMap` so candidate scans always run in ascending-id order.

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrackingConfig;
use crate::geometry::{Point, Rect, Zone};

/// Centroid path history kept per track, oldest evicted first.
const PATH_CAPACITY: usize = 64;

// ─── Types ───────────────────────────────────────────────────────────────────

/// One detector output box. Ephemeral; the tracker copies what it keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Rect,
    pub class: i32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: Rect, class: i32, confidence: f32) -> Self {
        Self { bbox, class, confidence }
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }
}

/// Internal per-track state. Owned exclusively by the tracker.
struct Track {
    bbox: Rect,
    class: i32,
    confidence: f32,
    path: VecDeque<Point>,
    /// Frames since last successful match.
    age: u32,
    /// Set the first frame the centroid is found inside the zone,
    /// cleared on re-entry bookkeeping or track removal.
    enter_time: Option<DateTime<Utc>>,
}

impl Track {
    fn centroid(&self) -> Point {
        self.bbox.centroid()
    }

    fn push_centroid(&mut self, c: Point) {
        if self.path.len() == PATH_CAPACITY {
            self.path.pop_front();
        }
        self.path.push_back(c);
    }
}

/// Read-only per-track view handed to renderers and the alert engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStatus {
    pub bbox: Rect,
    pub class: i32,
    pub confidence: f32,
    pub path: Vec<Point>,
    pub inside: bool,
    pub dwell_sec: i64,
}

/// Emitted when a track leaves the active zone; one per entry/exit cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitEvent {
    pub track_id: u64,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    pub dwell_secs: i64,
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

pub struct Tracker {
    cfg: TrackingConfig,
    next_id: u64,
    tracks: BTreeMap<u64, Track>,
    unique_count: u64,
    inside_ids: HashSet<u64>,
}

impl Tracker {
    pub fn new(cfg: TrackingConfig) -> Self {
        Self {
            cfg,
            next_id: 1,
            tracks: BTreeMap::new(),
            unique_count: 0,
            inside_ids: HashSet::new(),
        }
    }

    /// Update with the current frame's detections.
    ///
    /// Greedy first-come-first-served assignment: detections are matched
    /// in supplied order against the not-yet-consumed track with the
    /// smallest centroid distance, accepted only under
    /// `max_match_distance`. Unmatched detections spawn fresh tracks;
    /// tracks unmatched for more than `max_track_lost_frames` frames are
    /// removed in the same call.
    pub fn update(&mut self, detections: &[Detection]) {
        for track in self.tracks.values_mut() {
            track.age += 1;
        }

        let mut used: HashSet<u64> = HashSet::new();
        for det in detections {
            let (cx, cy) = det.centroid();
            let mut best_id: Option<u64> = None;
            let mut best_dist = f64::INFINITY;
            for (&tid, track) in &self.tracks {
                if used.contains(&tid) {
                    continue;
                }
                let (tcx, tcy) = track.centroid();
                let d = ((cx - tcx) as f64).hypot((cy - tcy) as f64);
                if d < best_dist && d <= self.cfg.max_match_distance {
                    best_dist = d;
                    best_id = Some(tid);
                }
            }

            match best_id {
                Some(tid) => {
                    if let Some(track) = self.tracks.get_mut(&tid) {
                        track.bbox = det.bbox;
                        track.class = det.class;
                        track.confidence = det.confidence;
                        track.age = 0;
                        track.push_centroid((cx, cy));
                    }
                    used.insert(tid);
                }
                None => {
                    let tid = self.next_id;
                    self.next_id += 1;
                    self.unique_count += 1;
                    let mut path = VecDeque::with_capacity(PATH_CAPACITY);
                    path.push_back((cx, cy));
                    self.tracks.insert(
                        tid,
                        Track {
                            bbox: det.bbox,
                            class: det.class,
                            confidence: det.confidence,
                            path,
                            age: 0,
                            enter_time: None,
                        },
                    );
                    // A track born this frame is consumed: a later
                    // detection in the same frame must not steal it.
                    used.insert(tid);
                    debug!(track_id = tid, "new track");
                }
            }
        }

        let max_lost = self.cfg.max_track_lost_frames;
        let stale: Vec<u64> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.age > max_lost)
            .map(|(&tid, _)| tid)
            .collect();
        for tid in stale {
            self.tracks.remove(&tid);
            self.inside_ids.remove(&tid);
            debug!(track_id = tid, "track retired (stale)");
        }
    }

    /// Recompute zone membership and return exit events for tracks that
    /// left the zone since the previous computation.
    ///
    /// With no zone configured nothing is inside; the permissive
    /// everything-inside fallback belongs to the global counting layer,
    /// not the tracker.
    pub fn update_occupancy_at(
        &mut self,
        zone: Option<&Zone>,
        now: DateTime<Utc>,
    ) -> Vec<ExitEvent> {
        let prev_inside = std::mem::take(&mut self.inside_ids);

        let mut inside: HashSet<u64> = HashSet::new();
        for (&tid, track) in self.tracks.iter_mut() {
            let ins = zone.map(|z| z.contains(track.centroid())).unwrap_or(false);
            if ins {
                inside.insert(tid);
                if track.enter_time.is_none() {
                    track.enter_time = Some(now);
                }
            }
        }

        let mut exits = Vec::new();
        for &tid in &prev_inside {
            if inside.contains(&tid) {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&tid) {
                if let Some(entered_at) = track.enter_time.take() {
                    let dwell_secs = now.signed_duration_since(entered_at).num_seconds();
                    exits.push(ExitEvent {
                        track_id: tid,
                        entered_at,
                        exited_at: now,
                        dwell_secs,
                    });
                }
            }
        }
        // Stable order for consumers and logs.
        exits.sort_by_key(|e| e.track_id);

        self.inside_ids = inside;
        exits
    }

    /// Convenience wrapper using wall-clock time.
    pub fn update_occupancy(&mut self, zone: Option<&Zone>) -> Vec<ExitEvent> {
        self.update_occupancy_at(zone, Utc::now())
    }

    /// Tracks currently inside the zone, as of the latest occupancy pass.
    pub fn occupancy(&self) -> usize {
        self.inside_ids.len()
    }

    /// Total tracks ever created over the tracker's lifetime.
    pub fn unique_count(&self) -> u64 {
        self.unique_count
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Longest current dwell among inside tracks, in whole seconds.
    pub fn longest_dwell_at(&self, now: DateTime<Utc>) -> i64 {
        self.inside_ids
            .iter()
            .filter_map(|tid| self.tracks.get(tid))
            .filter_map(|t| t.enter_time)
            .map(|entered| now.signed_duration_since(entered).num_seconds())
            .max()
            .unwrap_or(0)
    }

    /// Read-only snapshot of every live track, copied out for consumers.
    pub fn status_at(&self, now: DateTime<Utc>) -> BTreeMap<u64, TrackStatus> {
        let mut out = BTreeMap::new();
        for (&tid, track) in &self.tracks {
            let inside = self.inside_ids.contains(&tid);
            let dwell_sec = match (inside, track.enter_time) {
                (true, Some(entered)) => now.signed_duration_since(entered).num_seconds(),
                _ => 0,
            };
            out.insert(
                tid,
                TrackStatus {
                    bbox: track.bbox,
                    class: track.class,
                    confidence: track.confidence,
                    path: track.path.iter().copied().collect(),
                    inside,
                    dwell_sec,
                },
            );
        }
        out
    }

    /// Discard all state and restart id numbering from 1.
    pub fn reset(&mut self) {
        self.next_id = 1;
        self.tracks.clear();
        self.unique_count = 0;
        self.inside_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg() -> TrackingConfig {
        TrackingConfig {
            // Wide enough that the zone-exit scenarios below (a 100 px
            // centroid hop from (50,50) to (150,50)) stay the same track
            // instead of spawning a fresh id.
            max_match_distance: 120.0,
            max_track_lost_frames: 3,
            min_detection_size: 0,
        }
    }

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(Rect::new(x1, y1, x2, y2), 0, 0.9)
    }

    #[test]
    fn ids_are_never_reused() {
        let mut t = Tracker::new(cfg());
        t.update(&[det(0, 0, 10, 10)]);
        assert_eq!(t.unique_count(), 1);

        // Age the track out completely.
        for _ in 0..4 {
            t.update(&[]);
        }
        assert_eq!(t.live_track_count(), 0);

        // A new object in the same place gets a fresh id.
        t.update(&[det(0, 0, 10, 10)]);
        let ids: Vec<u64> = t.status_at(Utc::now()).into_keys().collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(t.unique_count(), 2);
    }

    #[test]
    fn empty_updates_age_out_after_bound_plus_one() {
        let mut t = Tracker::new(cfg());
        t.update(&[det(0, 0, 10, 10)]);

        // max_track_lost_frames = 3: survives 3 empty updates, gone on the 4th.
        for i in 0..3 {
            t.update(&[]);
            assert_eq!(t.live_track_count(), 1, "still alive after {} empty frames", i + 1);
        }
        t.update(&[]);
        assert_eq!(t.live_track_count(), 0);
    }

    #[test]
    fn matching_follows_detection_input_order() {
        let mut t = Tracker::new(cfg());
        // Two tracks at x=0 and x=100.
        t.update(&[det(0, 0, 10, 10), det(100, 0, 110, 10)]);

        // Both detections are nearer to track 1 than track 2; the first
        // detection in input order consumes track 1, the second falls to
        // track 2 even though track 1 would have been closer.
        t.update(&[det(20, 0, 30, 10), det(40, 0, 50, 10)]);
        let status = t.status_at(Utc::now());
        assert_eq!(status[&1].bbox, Rect::new(20, 0, 30, 10));
        assert_eq!(status[&2].bbox, Rect::new(40, 0, 50, 10));
        assert_eq!(t.unique_count(), 2);
    }

    #[test]
    fn deterministic_tie_break_prefers_lowest_id() {
        for _ in 0..10 {
            let mut t = Tracker::new(cfg());
            // Two tracks equidistant from the next detection.
            t.update(&[det(0, 0, 10, 10), det(40, 0, 50, 10)]);
            t.update(&[det(20, 0, 30, 10)]);
            let status = t.status_at(Utc::now());
            assert_eq!(status[&1].bbox, Rect::new(20, 0, 30, 10));
            assert_eq!(status[&2].bbox, Rect::new(40, 0, 50, 10));
        }
    }

    #[test]
    fn far_detection_spawns_instead_of_matching() {
        let mut t = Tracker::new(cfg());
        t.update(&[det(0, 0, 10, 10)]);
        t.update(&[det(500, 500, 510, 510)]);
        assert_eq!(t.unique_count(), 2);
    }

    #[test]
    fn same_frame_spawn_is_not_match_candidate() {
        let mut t = Tracker::new(cfg());
        // Second detection is right next to the first; it must spawn its
        // own track, not match the one created a moment earlier.
        t.update(&[det(0, 0, 10, 10), det(2, 0, 12, 10)]);
        assert_eq!(t.unique_count(), 2);
    }

    #[test]
    fn occupancy_and_enter_time() {
        let mut t = Tracker::new(cfg());
        let zone = Zone::Rect(Rect::new(0, 0, 100, 100));
        let t0 = Utc::now();

        t.update(&[det(40, 40, 60, 60)]); // centroid (50,50) inside
        let exits = t.update_occupancy_at(Some(&zone), t0);
        assert!(exits.is_empty());
        assert_eq!(t.occupancy(), 1);

        t.update(&[det(140, 40, 160, 60)]); // centroid (150,50) outside
        // Same identity stepped out, no second track spawned.
        assert_eq!(t.unique_count(), 1);
        let exits = t.update_occupancy_at(Some(&zone), t0 + Duration::seconds(7));
        assert_eq!(t.occupancy(), 0);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].track_id, 1);
        assert_eq!(exits[0].dwell_secs, 7);

        // One event per entry/exit cycle.
        let exits = t.update_occupancy_at(Some(&zone), t0 + Duration::seconds(8));
        assert!(exits.is_empty());
    }

    #[test]
    fn reentry_starts_a_fresh_dwell_session() {
        let mut t = Tracker::new(cfg());
        let zone = Zone::Rect(Rect::new(0, 0, 100, 100));
        let t0 = Utc::now();

        // In at t0, out at t0+10: exit clears the entry stamp.
        t.update(&[det(40, 40, 60, 60)]);
        t.update_occupancy_at(Some(&zone), t0);
        t.update(&[det(140, 40, 160, 60)]);
        let exits = t.update_occupancy_at(Some(&zone), t0 + Duration::seconds(10));
        assert_eq!(exits[0].dwell_secs, 10);

        // Back in at t0+20: dwell counts from the new entry, not t0.
        t.update(&[det(40, 40, 60, 60)]);
        t.update_occupancy_at(Some(&zone), t0 + Duration::seconds(20));
        assert_eq!(t.longest_dwell_at(t0 + Duration::seconds(23)), 3);

        let exits = t.update_occupancy_at(None, t0 + Duration::seconds(25));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].track_id, 1);
        assert_eq!(exits[0].dwell_secs, 5);
    }

    #[test]
    fn no_zone_means_nothing_inside() {
        let mut t = Tracker::new(cfg());
        t.update(&[det(40, 40, 60, 60)]);
        t.update_occupancy_at(None, Utc::now());
        assert_eq!(t.occupancy(), 0);
    }

    #[test]
    fn longest_dwell_over_inside_set() {
        let mut t = Tracker::new(cfg());
        let zone = Zone::Rect(Rect::new(0, 0, 200, 200));
        let t0 = Utc::now();

        t.update(&[det(10, 10, 20, 20)]);
        t.update_occupancy_at(Some(&zone), t0);

        t.update(&[det(10, 10, 20, 20), det(100, 100, 120, 120)]);
        t.update_occupancy_at(Some(&zone), t0 + Duration::seconds(5));

        assert_eq!(t.longest_dwell_at(t0 + Duration::seconds(9)), 9);
        assert_eq!(t.occupancy(), 2);
    }

    #[test]
    fn path_is_bounded() {
        let mut t = Tracker::new(cfg());
        for i in 0..100 {
            t.update(&[det(i, 0, i + 10, 10)]);
        }
        let status = t.status_at(Utc::now());
        assert_eq!(status[&1].path.len(), 64);
        // Oldest evicted first: front of the path is frame 36's centroid.
        assert_eq!(status[&1].path[0], (36 + 5, 5));
    }

    #[test]
    fn reset_restarts_ids() {
        let mut t = Tracker::new(cfg());
        t.update(&[det(0, 0, 10, 10), det(100, 0, 110, 10)]);
        t.reset();
        assert_eq!(t.unique_count(), 0);
        t.update(&[det(0, 0, 10, 10)]);
        let ids: Vec<u64> = t.status_at(Utc::now()).into_keys().collect();
        assert_eq!(ids, vec![1]);
    }
}
