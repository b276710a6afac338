//! Storage and buffering core: a fixed-capacity chunk pool with an
//! intrusive free list, reference-counted shared buffers with child views,
//! a generic ring-buffer framework over pluggable storages, a
//! variable-chunked framing layer on top, and a bounded queue of shared
//! handles.
//!
//! Everything here is allocation-free at steady state: each container
//! allocates its backing memory exactly once at construction.

pub mod memory_pool;
pub mod object_pool;
pub mod reference_queue;
pub mod ring_buffer;
pub mod shared_buffer;

pub use memory_pool::{Chunk, MemoryPool};
pub use object_pool::{ObjectHandle, ObjectPool};
pub use reference_queue::{QueueError, ReferenceQueue};
pub use ring_buffer::{
    ArrayStorage, ChunkError, ChunkLen, ChunkedRingBuffer, DirectRingStorage,
    PersistentArrayStorage, RingBuffer, RingBufferError, RingState, RingStorage,
};
pub use shared_buffer::{SharedBufferPool, SharedBufferPointer, SharedChildPointer};
