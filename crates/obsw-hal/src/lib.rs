//! Hardware abstraction layer: byte-stream and frame transports, the
//! SpaceWire link interface with its multi-protocol dispatcher, and the
//! file-system abstraction.
//!
//! Everything here is an interface plus reference implementations usable
//! on a host (loopback streams, in-memory file system); real link and
//! flash drivers live in platform crates.

pub mod file_system;
pub mod loopback;
pub mod memory_fs;
pub mod spacewire;
pub mod spw_dispatcher;
pub mod transport;

pub use file_system::{
    DirHandle, FileHandle, FileKind, FileSystem, FsError, FsResult, Info, OpenMask, Permission,
    SeekMode, MAX_PATH_LENGTH,
};
pub use memory_fs::MemoryFileSystem;
pub use spacewire::{
    EndMarker, ReceiveBuffer, SpaceWire, SpwError, TimeCode, TimeCodeDispatcher, TransmitBuffer,
};
pub use spw_dispatcher::{
    BusChannel, DispatcherStats, MessageId, PacketFilter, SpaceWireDispatcher, SpwMessage,
};
pub use transport::{
    ByteStreamRx, ByteStreamTx, CobsFrameTransport, FrameTransportRx, FrameTransportTx,
    TransportError,
};
