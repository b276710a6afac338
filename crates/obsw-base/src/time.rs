//! Mission time types.
//!
//! Wire formats carry [`GpsTime`] (seconds + milliseconds since the GPS
//! epoch, 1980-01-06T00:00:00 UTC, no leap-second correction). On-board
//! scheduling uses [`SpacecraftElapsedTime`], a monotonic duration since
//! boot produced by a [`Clock`].

use std::ops::{Add, Sub};
use std::time::{Duration, Instant};

use time::macros::datetime;
use time::OffsetDateTime;

/// The GPS epoch as calendar time.
pub const GPS_EPOCH: OffsetDateTime = datetime!(1980-01-06 00:00:00 UTC);

/// Time since the GPS epoch with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GpsTime {
    seconds: u32,
    milliseconds: u16,
}

impl GpsTime {
    /// Creates a time stamp; `milliseconds` is normalized into `seconds`.
    pub const fn new(seconds: u32, milliseconds: u16) -> Self {
        Self {
            seconds: seconds.wrapping_add((milliseconds / 1000) as u32),
            milliseconds: milliseconds % 1000,
        }
    }

    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    pub const fn milliseconds(&self) -> u16 {
        self.milliseconds
    }

    /// Calendar representation of this time stamp.
    pub fn to_calendar(self) -> OffsetDateTime {
        GPS_EPOCH
            + Duration::new(u64::from(self.seconds), u32::from(self.milliseconds) * 1_000_000)
    }

    /// Converts calendar time to GPS time. Times before the epoch clamp to
    /// the epoch.
    pub fn from_calendar(when: OffsetDateTime) -> Self {
        let delta = when - GPS_EPOCH;
        if delta.is_negative() {
            return Self::default();
        }
        Self {
            seconds: delta.whole_seconds() as u32,
            milliseconds: (delta.subsec_milliseconds()) as u16,
        }
    }
}

impl Add<Duration> for GpsTime {
    type Output = GpsTime;

    fn add(self, rhs: Duration) -> GpsTime {
        let millis = u64::from(self.milliseconds) + u64::from(rhs.subsec_millis());
        GpsTime {
            seconds: self
                .seconds
                .wrapping_add(rhs.as_secs() as u32)
                .wrapping_add((millis / 1000) as u32),
            milliseconds: (millis % 1000) as u16,
        }
    }
}

/// Monotonic time since boot.
///
/// Ordering and subtraction are well defined between two values taken from
/// the same [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SpacecraftElapsedTime {
    since_boot: Duration,
}

impl SpacecraftElapsedTime {
    pub const fn from_duration(since_boot: Duration) -> Self {
        Self { since_boot }
    }

    pub const fn since_boot(&self) -> Duration {
        self.since_boot
    }
}

impl Add<Duration> for SpacecraftElapsedTime {
    type Output = SpacecraftElapsedTime;

    fn add(self, rhs: Duration) -> SpacecraftElapsedTime {
        SpacecraftElapsedTime::from_duration(self.since_boot + rhs)
    }
}

impl Sub for SpacecraftElapsedTime {
    type Output = Duration;

    fn sub(self, rhs: SpacecraftElapsedTime) -> Duration {
        self.since_boot.saturating_sub(rhs.since_boot)
    }
}

/// Source of monotonic on-board time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SpacecraftElapsedTime;
}

/// [`Clock`] backed by [`Instant`]; the boot reference is taken at
/// construction.
#[derive(Debug)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { boot: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SpacecraftElapsedTime {
        SpacecraftElapsedTime::from_duration(self.boot.elapsed())
    }
}
