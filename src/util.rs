//! Small shared helpers — rate limiting and duration formatting.

use chrono::{DateTime, Duration, Utc};

/// Get-and-set rate limiter: `ready` succeeds at most once per interval.
pub struct Throttle {
    interval: Duration,
    last: Option<DateTime<Utc>>,
}

impl Throttle {
    pub fn new(interval_sec: u64) -> Self {
        Self {
            interval: Duration::seconds(interval_sec as i64),
            last: None,
        }
    }

    pub fn ready_at(&mut self, now: DateTime<Utc>) -> bool {
        let ready = match self.last {
            Some(last) => now.signed_duration_since(last) >= self.interval,
            None => true,
        };
        if ready {
            self.last = Some(now);
        }
        ready
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Utc::now())
    }
}

/// Human-readable duration: "1h 2m 3s", "2m 3s" or "3s".
pub fn fmt_hms(seconds: i64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
