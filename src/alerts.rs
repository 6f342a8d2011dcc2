//! Alert Engine — threshold evaluation, per-key cooldowns, bounded log.
//!
//! Evaluated once per processed frame. Pure observer of tracker state:
//! it never mutates tracks, only its own history/cooldown/log state.
//! Fired alerts are appended to a bounded FIFO log and optionally routed
//! to a persistence sink whose failures are swallowed — alerting never
//! fails because a database write did.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::AlertConfig;
use crate::occupancy::Summary;
use crate::tracker::TrackStatus;

/// Occupancy history retention window.
const HISTORY_WINDOW_SECS: i64 = 600;
/// Alert log capacity; oldest entries are evicted first.
const LOG_CAPACITY: usize = 120;

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    /// Occupancy exceeded the configured capacity.
    Capacity,
    /// Occupancy rose faster than the surge threshold over the interval.
    Surge,
    /// A track stayed inside the zone past the dwell threshold.
    Dwell,
    /// Area transitioned from empty to occupied.
    Occupied,
    /// Area transitioned from occupied to empty.
    Clear,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Capacity => "CAPACITY",
            AlertKind::Surge => "SURGE",
            AlertKind::Dwell => "DWELL",
            AlertKind::Occupied => "OCCUPIED",
            AlertKind::Clear => "CLEAR",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fired alert. Consumers receive copies, never log references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub time: DateTime<Utc>,
    pub kind: AlertKind,
    pub message: String,
    pub occupancy: Option<i32>,
    pub meta: Map<String, Value>,
}

/// Persistence collaborator. Failures are logged and discarded by the
/// engine; in-memory state always updates regardless of sink outcome.
pub trait AlertSink {
    fn insert_alert(&self, record: &AlertRecord) -> anyhow::Result<()>;
    fn insert_snapshot(&self, summary: &Summary, note: Option<&str>) -> anyhow::Result<()>;
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct AlertEngine {
    cfg: AlertConfig,
    /// Last fire time per alert key ("capacity", "surge", "dwell_<id>").
    last_fire: HashMap<String, DateTime<Utc>>,
    /// (timestamp, occupancy) samples within the retention window.
    history: VecDeque<(DateTime<Utc>, i32)>,
    log: VecDeque<AlertRecord>,
    sink: Option<Box<dyn AlertSink>>,
    last_area_occupied: Option<bool>,
}

impl AlertEngine {
    pub fn new(cfg: AlertConfig) -> Self {
        Self {
            cfg,
            last_fire: HashMap::new(),
            history: VecDeque::new(),
            log: VecDeque::new(),
            sink: None,
            last_area_occupied: None,
        }
    }

    pub fn with_sink(cfg: AlertConfig, sink: Box<dyn AlertSink>) -> Self {
        let mut engine = Self::new(cfg);
        engine.sink = Some(sink);
        engine
    }

    /// Run every check against the current frame's state. Returns the
    /// alerts fired during this pass, in firing order.
    pub fn evaluate_at(
        &mut self,
        now: DateTime<Utc>,
        occupancy: i32,
        tracks: &BTreeMap<u64, TrackStatus>,
        _summary: &Summary,
    ) -> Vec<AlertRecord> {
        self.record_occupancy(now, occupancy);

        let mut fired = Vec::new();
        if let Some(a) = self.check_capacity(now, occupancy) {
            fired.push(a);
        }
        if let Some(a) = self.check_surge(now) {
            fired.push(a);
        }
        fired.extend(self.check_dwell(now, tracks));
        if let Some(a) = self.check_area_state(now, occupancy) {
            fired.push(a);
        }
        fired
    }

    /// Convenience wrapper using wall-clock time.
    pub fn evaluate(
        &mut self,
        occupancy: i32,
        tracks: &BTreeMap<u64, TrackStatus>,
        summary: &Summary,
    ) -> Vec<AlertRecord> {
        self.evaluate_at(Utc::now(), occupancy, tracks, summary)
    }

    /// Most recent `n` alerts, insertion order preserved.
    pub fn recent(&self, n: usize) -> Vec<AlertRecord> {
        let skip = self.log.len().saturating_sub(n);
        self.log.iter().skip(skip).cloned().collect()
    }

    /// Empty the alert log. Cooldown clocks and occupancy history survive.
    pub fn clear(&mut self) {
        self.log.clear();
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    // ─── Checks ──────────────────────────────────────────────────────────────

    fn record_occupancy(&mut self, now: DateTime<Utc>, occupancy: i32) {
        self.history.push_back((now, occupancy));
        let cutoff = now - Duration::seconds(HISTORY_WINDOW_SECS);
        while matches!(self.history.front(), Some(&(t, _)) if t < cutoff) {
            self.history.pop_front();
        }
    }

    fn check_capacity(&mut self, now: DateTime<Utc>, occupancy: i32) -> Option<AlertRecord> {
        let cap = self.cfg.capacity_threshold;
        if cap > 0 && occupancy > cap && self.cooldown_ready("capacity", now) {
            return Some(self.fire(
                now,
                AlertKind::Capacity,
                format!("Occupancy {} > {}", occupancy, cap),
                Some(occupancy),
                Map::new(),
            ));
        }
        None
    }

    fn check_surge(&mut self, now: DateTime<Utc>) -> Option<AlertRecord> {
        let need = self.cfg.surge_count;
        let interval = self.cfg.surge_interval_sec;
        if need <= 0 || self.history.is_empty() {
            return None;
        }
        let current = self.history.back().map(|&(_, o)| o)?;
        // First sample at least `interval` older than now, scanning
        // newest to oldest. A single snapshot, not an average.
        let baseline = self
            .history
            .iter()
            .rev()
            .find(|&&(t, _)| now.signed_duration_since(t).num_seconds() >= interval)
            .map(|&(_, o)| o)?;
        let delta = current - baseline;
        if delta >= need && self.cooldown_ready("surge", now) {
            let mut meta = Map::new();
            meta.insert("delta".into(), json!(delta));
            return Some(self.fire(
                now,
                AlertKind::Surge,
                format!("+{} in {}s", delta, interval),
                Some(current),
                meta,
            ));
        }
        None
    }

    fn check_dwell(
        &mut self,
        now: DateTime<Utc>,
        tracks: &BTreeMap<u64, TrackStatus>,
    ) -> Vec<AlertRecord> {
        let th = self.cfg.dwell_time_sec;
        if th <= 0 {
            return Vec::new();
        }
        let mut fired = Vec::new();
        for (&tid, status) in tracks {
            if !status.inside || status.dwell_sec < th {
                continue;
            }
            let key = format!("dwell_{}", tid);
            if self.cooldown_ready(&key, now) {
                let mut meta = Map::new();
                meta.insert("track_id".into(), json!(tid));
                fired.push(self.fire(
                    now,
                    AlertKind::Dwell,
                    format!("Track {} {}s >= {}", tid, status.dwell_sec, th),
                    None,
                    meta,
                ));
            }
        }
        fired
    }

    fn check_area_state(&mut self, now: DateTime<Utc>, occupancy: i32) -> Option<AlertRecord> {
        if !self.cfg.area_transitions {
            return None;
        }
        let occupied = occupancy > 0;
        if self.last_area_occupied == Some(occupied) {
            return None;
        }
        let first = self.last_area_occupied.is_none();
        self.last_area_occupied = Some(occupied);
        // Startup with an empty area is not a transition worth reporting.
        if first && !occupied {
            return None;
        }
        let (kind, message) = if occupied {
            (AlertKind::Occupied, format!("AREA OCCUPIED ({})", occupancy))
        } else {
            (AlertKind::Clear, "AREA CLEAR".to_string())
        };
        Some(self.fire(now, kind, message, Some(occupancy), Map::new()))
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Get-and-set readiness: a successful check also stamps the clock,
    /// so one evaluation pass can never double-fire a key.
    fn cooldown_ready(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let ready = match self.last_fire.get(key) {
            Some(&last) => now.signed_duration_since(last).num_seconds() >= self.cfg.cooldown_sec,
            None => true,
        };
        if ready {
            self.last_fire.insert(key.to_string(), now);
        }
        ready
    }

    fn fire(
        &mut self,
        now: DateTime<Utc>,
        kind: AlertKind,
        message: String,
        occupancy: Option<i32>,
        meta: Map<String, Value>,
    ) -> AlertRecord {
        let record = AlertRecord { time: now, kind, message, occupancy, meta };
        info!(kind = kind.as_str(), message = %record.message, "alert fired");

        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(record.clone());

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.insert_alert(&record) {
                warn!("alert sink error: {}", e);
            }
        }
        record
    }
}
