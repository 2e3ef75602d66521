//! Monotonic tick clock for a watched root.
//!
//! Every change recorded in the view is stamped with the tick that was current
//! when it was applied. A clock position handed to a client therefore answers
//! "since" questions exactly: a file changed after the position was taken has
//! a strictly greater tick.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use chrono::Utc;

/// Wall-clock seconds at which this process first touched a clock.
static PROCESS_START: LazyLock<i64> = LazyLock::new(unix_now);

static NEXT_ROOT_NUMBER: AtomicU32 = AtomicU32::new(1);

/// Allocates the process-unique number identifying a watched root.
pub fn next_root_number() -> u32 {
    NEXT_ROOT_NUMBER.fetch_add(1, Ordering::Relaxed)
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// A tick paired with the wall-clock time it was observed at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockStamp {
    pub ticks: u32,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Identifies a point in the change history of one root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPosition {
    pub root_number: u32,
    pub ticks: u32,
    /// Unix seconds at which the position was taken.
    pub timestamp: i64,
}

impl ClockPosition {
    /// Renders the `c:<start>:<pid>:<root>:<tick>` form given to clients.
    pub fn to_clock_string(self) -> String {
        format!(
            "c:{}:{}:{}:{}",
            *PROCESS_START,
            std::process::id(),
            self.root_number,
            self.ticks
        )
    }

    /// Parses a clock string, returning `None` if it was minted by another
    /// process instance. The string carries no wall-clock time, so
    /// `timestamp` is zero.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.strip_prefix("c:")?.split(':');
        let start: i64 = parts.next()?.parse().ok()?;
        let pid: u32 = parts.next()?.parse().ok()?;
        let root_number = parts.next()?.parse().ok()?;
        let ticks = parts.next()?.parse().ok()?;
        if parts.next().is_some() || start != *PROCESS_START || pid != std::process::id() {
            return None;
        }
        Some(Self {
            root_number,
            ticks,
            timestamp: 0,
        })
    }

    pub fn stamp(self) -> ClockStamp {
        ClockStamp {
            ticks: self.ticks,
            timestamp: self.timestamp,
        }
    }
}

impl fmt::Display for ClockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_clock_string())
    }
}

/// Tick counter for one root. Reads are lock-free.
#[derive(Debug)]
pub struct Clock {
    root_number: u32,
    ticks: AtomicU32,
}

impl Clock {
    pub fn new(root_number: u32) -> Self {
        // Force the process start time to be captured no later than the first clock.
        LazyLock::force(&PROCESS_START);
        Self {
            root_number,
            ticks: AtomicU32::new(1),
        }
    }

    pub fn root_number(&self) -> u32 {
        self.root_number
    }

    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advances the tick and returns the new value.
    pub fn advance(&self) -> u32 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn position(&self) -> ClockPosition {
        ClockPosition {
            root_number: self.root_number,
            ticks: self.ticks(),
            timestamp: unix_now(),
        }
    }

    /// Stamps the current tick with the given wall-clock time.
    pub fn stamp_at(&self, timestamp: i64) -> ClockStamp {
        ClockStamp {
            ticks: self.ticks(),
            timestamp,
        }
    }

    pub fn stamp(&self) -> ClockStamp {
        self.stamp_at(unix_now())
    }
}
