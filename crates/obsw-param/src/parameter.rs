//! Seqlock parameters and the sorted parameter store.
//!
//! Each parameter keeps two copies of its value. A writer fills the
//! inactive copy and then bumps the counter with release ordering; a
//! reader loads the counter with acquire ordering, copies the active
//! slot, and accepts the copy only when a relaxed re-read of the counter
//! (behind an acquire fence) still matches. A bounded retry count turns
//! pathological writer pressure into an error instead of a livelock.

use std::any::Any;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering, fence};

use obsw_base::SpacecraftElapsedTime;
use thiserror::Error;

/// ID value marking an uninitialized parameter.
pub const INVALID_ID: u16 = 0xFFFF;

/// Retry bound of the read-side seqlock loop.
pub const MAX_READ_TRIES: u32 = 8;

/// Upper bound of parameters in one store.
pub const MAX_ELEMENTS: usize = 256;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter holds a different type")]
    IncorrectType,
    #[error("another write is in progress")]
    ConcurrentWrite,
    #[error("not initialized")]
    NotInitialized,
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("invalid parameter arguments")]
    InvalidParameter,
    #[error("reader starved by concurrent writes")]
    TooManyConcurrentWrites,
    #[error("no parameter with the requested id")]
    NoSuchId,
    #[error("two parameters share an id")]
    DuplicatedId,
    #[error("a registered parameter is uninitialized")]
    UninitializedParameter,
    #[error("too many parameters in the list")]
    TooManyElements,
}

#[derive(Clone, Copy)]
struct Element<T> {
    data: T,
    change_time: SpacecraftElapsedTime,
}

/// A single parameter cell.
///
/// Single-writer parameters skip the write-side flag entirely; parameters
/// shared between writers serialize through a test-and-set flag and
/// report [`ParameterError::ConcurrentWrite`] to the loser.
pub struct Parameter<T> {
    id: u16,
    elements: [UnsafeCell<Element<T>>; 2],
    write_counter: AtomicU32,
    multiple_writers: bool,
    write_in_progress: AtomicBool,
}

impl<T> std::fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter").field("id", &self.id).finish()
    }
}

// SAFETY: the elements are only accessed through the seqlock protocol
// below: writers fill the slot the counter does not point at and publish
// with a release increment; readers copy (`T: Copy`) and discard the copy
// unless the counter stayed put around the read.
unsafe impl<T: Copy + Send> Sync for Parameter<T> {}
unsafe impl<T: Copy + Send> Send for Parameter<T> {}

impl<T: Copy> Parameter<T> {
    /// Initialized parameter. `None` when `id` is the invalid marker.
    pub fn new(
        id: u16,
        initial_value: T,
        time: SpacecraftElapsedTime,
        multiple_writers: bool,
    ) -> Option<Self> {
        if id == INVALID_ID {
            return None;
        }
        let element = Element { data: initial_value, change_time: time };
        Some(Self {
            id,
            elements: [UnsafeCell::new(element), UnsafeCell::new(element)],
            write_counter: AtomicU32::new(0),
            multiple_writers,
            write_in_progress: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.id != INVALID_ID
    }

    pub fn has_multiple_writers(&self) -> bool {
        self.multiple_writers
    }

    /// Consistent snapshot of value and change time.
    pub fn value(&self) -> Result<(T, SpacecraftElapsedTime), ParameterError> {
        let mut tries = 0;
        while tries < MAX_READ_TRIES {
            // the acquire load orders the element read after it
            let before = self.write_counter.load(Ordering::Acquire);
            // SAFETY: T is Copy; a concurrently torn copy is discarded by
            // the counter comparison below.
            let element = unsafe { std::ptr::read_volatile(self.elements[(before % 2) as usize].get()) };
            // the element read must not sink below the counter re-read
            fence(Ordering::Acquire);
            let after = self.write_counter.load(Ordering::Relaxed);

            if before == after {
                return Ok((element.data, element.change_time));
            }
            tries += 1;
        }
        Err(ParameterError::TooManyConcurrentWrites)
    }

    /// Commits a new value. With multiple writers enabled, a concurrent
    /// writer holding the flag makes this fail with `ConcurrentWrite`.
    pub fn set_value(
        &self,
        data: T,
        time: SpacecraftElapsedTime,
    ) -> Result<(), ParameterError> {
        if self.multiple_writers {
            if self.write_in_progress.swap(true, Ordering::Acquire) {
                return Err(ParameterError::ConcurrentWrite);
            }
            self.write_unlocked(data, time);
            self.write_in_progress.store(false, Ordering::Release);
        } else {
            // a single writer needs no flag; the counter alone publishes
            self.write_unlocked(data, time);
        }
        Ok(())
    }

    fn write_unlocked(&self, data: T, time: SpacecraftElapsedTime) {
        let counter = self.write_counter.load(Ordering::Relaxed);
        let inactive = ((counter + 1) % 2) as usize;
        // SAFETY: readers only dereference the slot the counter points
        // at; this writes the other one. Competing writers are excluded
        // by the single-writer contract or the flag above.
        unsafe {
            std::ptr::write_volatile(
                self.elements[inactive].get(),
                Element { data, change_time: time },
            );
        }
        // release publishes the element write together with the counter
        self.write_counter.fetch_add(1, Ordering::Release);
    }
}

/// Type-erased handle used by the store.
pub trait AnyParameter: Send + Sync {
    fn id(&self) -> u16;
    fn is_initialized(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Copy + Send + 'static> AnyParameter for Parameter<T> {
    fn id(&self) -> u16 {
        self.id
    }

    fn is_initialized(&self) -> bool {
        Parameter::is_initialized(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of parameters with binary-search lookup by ID.
///
/// Registration happens at application startup; [`initialize`] validates
/// the set and sorts the index, after which lookups are allowed.
///
/// [`initialize`]: ParameterStore::initialize
#[derive(Default)]
pub struct ParameterStore {
    parameters: Vec<Arc<dyn AnyParameter>>,
    initialized: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parameter: Arc<dyn AnyParameter>) -> Result<(), ParameterError> {
        if self.initialized {
            return Err(ParameterError::AlreadyInitialized);
        }
        if self.parameters.len() >= MAX_ELEMENTS {
            return Err(ParameterError::TooManyElements);
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Validates and sorts the registered set. Fails on uninitialized
    /// entries and duplicated IDs.
    pub fn initialize(&mut self) -> Result<(), ParameterError> {
        if self.initialized {
            return Err(ParameterError::AlreadyInitialized);
        }
        if self.parameters.iter().any(|parameter| !parameter.is_initialized()) {
            return Err(ParameterError::UninitializedParameter);
        }

        self.parameters.sort_by_key(|parameter| parameter.id());
        if self
            .parameters
            .windows(2)
            .any(|pair| pair[0].id() == pair[1].id())
        {
            return Err(ParameterError::DuplicatedId);
        }

        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Typed lookup by ID.
    pub fn get<T: Copy + Send + 'static>(
        &self,
        id: u16,
    ) -> Result<&Parameter<T>, ParameterError> {
        let parameter = self.find(id)?;
        parameter
            .as_any()
            .downcast_ref::<Parameter<T>>()
            .ok_or(ParameterError::IncorrectType)
    }

    /// Parameters in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AnyParameter>> {
        self.parameters.iter()
    }

    fn find(&self, id: u16) -> Result<&Arc<dyn AnyParameter>, ParameterError> {
        if !self.initialized {
            return Err(ParameterError::NotInitialized);
        }
        if id == INVALID_ID {
            return Err(ParameterError::InvalidParameter);
        }
        self.parameters
            .binary_search_by_key(&id, |parameter| parameter.id())
            .map(|index| &self.parameters[index])
            .map_err(|_| ParameterError::NoSuchId)
    }
}
