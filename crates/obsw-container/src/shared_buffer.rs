//! Reference-counted, pool-backed byte buffers with child views.
//!
//! A [`SharedBufferPool`] owns a contiguous arena split into fixed-size
//! chunks, each paired with an atomic reference count. Handles
//! ([`SharedBufferPointer`]) behave like `Arc`: cloning bumps the count,
//! dropping releases it, and when the last reference disappears the chunk
//! goes back on the pool's free list. A [`SharedChildPointer`] is a
//! `(offset, length, kind)` window into its parent chunk that keeps the
//! chunk alive on its own.
//!
//! # Mutation rule
//!
//! A chunk is writable only through a *unique* handle
//! ([`SharedBufferPointer::as_mut_slice`] returns `None` otherwise). Once
//! views have been handed out the data is frozen until all of them drop.
//!
//! # Synchronization
//!
//! The arena is stored as `UnsafeCell<u8>` cells. Safety rests on the
//! reference-count protocol:
//!
//! - `&mut [u8]` to a chunk is only created while its count is 1 and the
//!   caller holds `&mut` on the only handle, so no other reference to the
//!   chunk's cells can exist.
//! - `&[u8]` is only created through a live handle and dies with its
//!   borrow; a handle keeps the count above 0, so the chunk cannot be
//!   recycled or handed to a new owner while any reader exists.
//! - The count is decremented with `Release` and the final decrement is
//!   followed by an `Acquire` fence before the chunk is recycled, ordering
//!   all prior accesses before reuse (the `Arc` protocol).

use std::sync::atomic::{AtomicU16, Ordering, fence};
use std::cell::UnsafeCell;
use std::sync::{Arc, Mutex};

use crossbeam_utils::CachePadded;

struct PoolInner {
    chunk_size: usize,
    storage: Box<[UnsafeCell<u8>]>,
    refcounts: Box<[CachePadded<AtomicU16>]>,
    free: Mutex<Vec<u32>>,
}

// SAFETY: access to the `UnsafeCell` storage follows the reference-count
// protocol described in the module documentation; the free list is behind a
// mutex and the counts are atomic.
unsafe impl Send for PoolInner {}
unsafe impl Sync for PoolInner {}

impl PoolInner {
    fn chunk_ptr(&self, index: u32) -> *mut u8 {
        let start = index as usize * self.chunk_size;
        self.storage[start..start + self.chunk_size]
            .as_ptr()
            .cast_mut()
            .cast::<u8>()
    }

    fn release(&self, index: u32) {
        self.free.lock().unwrap().push(index);
    }
}

/// Pool of reference-counted byte chunks. Cloning the pool handle is cheap
/// and shares the arena.
#[derive(Clone)]
pub struct SharedBufferPool {
    inner: Arc<PoolInner>,
}

impl SharedBufferPool {
    /// Allocates the arena for `chunk_count` chunks of `chunk_size` bytes.
    /// This is the only allocation the pool ever performs.
    pub fn new(chunk_size: usize, chunk_count: usize) -> Self {
        assert!(chunk_count <= 1 << 16, "chunk count exceeds the supported pool size");
        let storage = (0..chunk_size * chunk_count)
            .map(|_| UnsafeCell::new(0))
            .collect();
        let refcounts = (0..chunk_count)
            .map(|_| CachePadded::new(AtomicU16::new(0)))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                chunk_size,
                storage,
                refcounts,
                free: Mutex::new((0..chunk_count as u32).rev().collect()),
            }),
        }
    }

    /// Takes a free chunk and returns a unique handle to it (reference
    /// count 1). Never blocks; `None` when the pool is exhausted.
    pub fn allocate(&self) -> Option<SharedBufferPointer> {
        let index = self.inner.free.lock().unwrap().pop()?;
        self.inner.refcounts[index as usize].store(1, Ordering::Release);
        Some(SharedBufferPointer {
            inner: Arc::clone(&self.inner),
            index,
        })
    }

    /// Number of chunks currently on the free list.
    pub fn free_chunks(&self) -> usize {
        self.inner.free.lock().unwrap().len()
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    pub fn capacity(&self) -> usize {
        self.inner.refcounts.len()
    }
}

/// Owning handle to one pool chunk.
pub struct SharedBufferPointer {
    inner: Arc<PoolInner>,
    index: u32,
}

impl SharedBufferPointer {
    pub fn len(&self) -> usize {
        self.inner.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current reference count of the underlying chunk (handles plus two
    /// per live child). Mainly useful for assertions.
    pub fn refcount(&self) -> u16 {
        self.inner.refcounts[self.index as usize].load(Ordering::Acquire)
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `self` keeps the count above 0, and writers require a
        // unique handle, so no `&mut` to these cells can coexist with this
        // borrow (see the module documentation).
        unsafe { std::slice::from_raw_parts(self.inner.chunk_ptr(self.index), self.len()) }
    }

    /// Mutable view of the chunk; available only while this is the sole
    /// reference.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if self.inner.refcounts[self.index as usize].load(Ordering::Acquire) != 1 {
            return None;
        }
        // SAFETY: the count is 1 and we hold `&mut` on the only handle, so
        // this is the only live access path to the chunk's cells.
        Some(unsafe {
            std::slice::from_raw_parts_mut(self.inner.chunk_ptr(self.index), self.len())
        })
    }

    /// Creates a child view covering `length` bytes starting at `offset`,
    /// tagged with `kind`.
    ///
    /// Fails when the window does not fit the chunk. A zero-length window
    /// is always valid (even on a zero-length chunk).
    pub fn child(&self, offset: usize, length: usize, kind: u16) -> Option<SharedChildPointer> {
        if offset.checked_add(length)? > self.len() {
            return None;
        }
        Some(SharedChildPointer {
            parent: self.clone(),
            own: self.clone(),
            offset,
            length,
            kind,
        })
    }
}

impl Clone for SharedBufferPointer {
    fn clone(&self) -> Self {
        self.inner.refcounts[self.index as usize].fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::clone(&self.inner),
            index: self.index,
        }
    }
}

impl Drop for SharedBufferPointer {
    fn drop(&mut self) {
        if self.inner.refcounts[self.index as usize].fetch_sub(1, Ordering::Release) == 1 {
            // last reference: all prior accesses happen-before the recycle
            fence(Ordering::Acquire);
            self.inner.release(self.index);
        }
    }
}

impl std::fmt::Debug for SharedBufferPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBufferPointer")
            .field("index", &self.index)
            .field("len", &self.len())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Window into a parent chunk.
///
/// Holds two references to the chunk: its own and the retained parent
/// link, so the parent handle may be dropped without invalidating the
/// child.
#[derive(Clone)]
pub struct SharedChildPointer {
    parent: SharedBufferPointer,
    own: SharedBufferPointer,
    offset: usize,
    length: usize,
    kind: u16,
}

impl SharedChildPointer {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn parent(&self) -> &SharedBufferPointer {
        &self.parent
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.own.as_slice()[self.offset..self.offset + self.length]
    }
}

impl std::fmt::Debug for SharedChildPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChildPointer")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("kind", &self.kind)
            .finish()
    }
}
