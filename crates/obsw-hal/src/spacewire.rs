//! SpaceWire link interface (ECSS-E-ST-50-12C).
//!
//! Packets are exchanged through driver-owned buffers: the sender requests
//! a [`TransmitBuffer`], fills it and hands it back with `send`; the
//! receiver obtains a [`ReceiveBuffer`] and releases it after processing.
//! Time codes distributed over the link are fanned out to registered
//! queues by the [`TimeCodeDispatcher`].

use std::sync::Arc;
use std::time::Duration;

use obsw_container::ReferenceQueue;
use thiserror::Error;

/// Trailing control symbol of a SpaceWire packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndMarker {
    /// Packet left open; more data follows (or the receiver truncated it).
    Partial = 0,
    /// Normal end of packet.
    #[default]
    Eop = 1,
    /// Error end of packet.
    Eep = 2,
    Unknown = 3,
}

/// Two-byte control value distributed over the link for clock
/// distribution. Six value bits, two control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCode {
    pub value: u8,
    pub control: u8,
}

impl TimeCode {
    pub fn new(value: u8, control: u8) -> Self {
        Self { value: value & 0x3F, control: control & 0x03 }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpwError {
    #[error("link operation failed")]
    Failure,
    #[error("timed out")]
    Timeout,
}

/// Driver-owned send buffer. Requested from the link, filled, then handed
/// back through [`SpaceWire::send`].
#[derive(Debug, Default)]
pub struct TransmitBuffer {
    data: Vec<u8>,
    length: usize,
    end: EndMarker,
}

impl TransmitBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            length: 0,
            end: EndMarker::Eop,
        }
    }

    /// Usable buffer memory.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Marks the first `length` bytes as the packet content.
    pub fn set_len(&mut self, length: usize) {
        debug_assert!(length <= self.data.len());
        self.length = length.min(self.data.len());
    }

    pub fn end_marker(&self) -> EndMarker {
        self.end
    }

    pub fn set_end_marker(&mut self, end: EndMarker) {
        self.end = end;
    }
}

/// Driver-owned receive buffer; must be given back through
/// [`SpaceWire::release_buffer`].
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    end: EndMarker,
}

impl ReceiveBuffer {
    pub fn new(data: Vec<u8>, end: EndMarker) -> Self {
        Self { data, end }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn end_marker(&self) -> EndMarker {
        self.end
    }
}

/// SpaceWire link.
pub trait SpaceWire: Send {
    /// Maximum length of a packet on this link.
    fn max_packet_length(&self) -> usize;

    fn open(&mut self) -> bool;

    fn close(&mut self);

    fn up(&mut self, timeout: Duration) -> bool;

    fn down(&mut self, timeout: Duration);

    fn is_up(&self) -> bool;

    /// Requests a send buffer. The link is blocked until the buffer is
    /// returned via [`send`](Self::send).
    fn request_buffer(&mut self, timeout: Duration) -> Result<TransmitBuffer, SpwError>;

    /// Sends a filled buffer, releasing it back to the driver.
    fn send(&mut self, buffer: TransmitBuffer, timeout: Duration) -> Result<(), SpwError>;

    /// Receives one packet.
    fn receive(&mut self, timeout: Duration) -> Result<ReceiveBuffer, SpwError>;

    /// Returns a receive buffer to the driver.
    fn release_buffer(&mut self, buffer: ReceiveBuffer);

    /// Discards everything waiting in the receive buffers.
    fn flush_receive_buffer(&mut self);

    /// Registers a queue for time-code distribution. Returns `false` when
    /// all listener slots are taken.
    fn add_time_code_listener(&mut self, queue: Arc<ReferenceQueue<TimeCode>>) -> bool;
}

/// Fans received time codes out to registered listener queues.
pub struct TimeCodeDispatcher {
    listeners: Vec<Arc<ReferenceQueue<TimeCode>>>,
    max_listeners: usize,
    dropped: u32,
}

impl TimeCodeDispatcher {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            listeners: Vec::with_capacity(max_listeners),
            max_listeners,
            dropped: 0,
        }
    }

    pub fn add_listener(&mut self, queue: Arc<ReferenceQueue<TimeCode>>) -> bool {
        if self.listeners.len() >= self.max_listeners {
            return false;
        }
        self.listeners.push(queue);
        true
    }

    /// Delivers `time_code` to every listener. Full queues drop the code
    /// for that listener only.
    pub fn dispatch(&mut self, time_code: TimeCode) {
        for listener in &self.listeners {
            if listener.send(&time_code).is_err() {
                self.dropped = self.dropped.wrapping_add(1);
                log::debug!("time code dropped, listener queue full");
            }
        }
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
