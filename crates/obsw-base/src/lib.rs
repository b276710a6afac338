//! Foundation types shared by every `obsw` crate: mission time, bounded
//! slice helpers, the heartbeat interface consumed by long-running threads
//! and the cooperative checkpoint primitive.

#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod heartbeat;
pub mod slice;
pub mod time;

pub use checkpoint::{Checkpoint, CheckpointState};
pub use heartbeat::{Heartbeat, HeartbeatSource, NullHeartbeat};
pub use slice::{SliceExt, SliceMutExt, copy_prefix_from};
pub use time::{Clock, GpsTime, SpacecraftElapsedTime, SystemClock};
