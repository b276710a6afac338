//! Watchdog heartbeat interface.
//!
//! Long-running threads report liveness with an *allowance*: the maximum
//! time until their next report. The watchdog implementation lives in the
//! application; library threads only hold a [`Heartbeat`] handle.

use std::time::Duration;

/// Identifies the reporting thread towards the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatSource(pub u16);

pub trait Heartbeat: Send + Sync {
    /// Reports liveness. The watchdog must not fire for this source within
    /// `allowance`.
    fn send(&self, source: HeartbeatSource, allowance: Duration);

    /// Announces that the source is intentionally dormant (e.g. suspended at
    /// a checkpoint) and must not be supervised until the next `send`.
    fn suspend(&self, source: HeartbeatSource);
}

/// Heartbeat sink that discards all reports. Default for tests and tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHeartbeat;

impl Heartbeat for NullHeartbeat {
    fn send(&self, _source: HeartbeatSource, _allowance: Duration) {}

    fn suspend(&self, _source: HeartbeatSource) {}
}
