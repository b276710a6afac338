//! Multi-protocol packet dispatcher for a SpaceWire link.
//!
//! A reader loop pulls packets from the link, copies each into a pooled
//! shared buffer and routes it by its protocol identifier (packet byte 1)
//! to the first matching registered channel. Packets nobody wants, full
//! channel queues and pool exhaustion drop the packet and bump a counter.

use std::sync::Arc;
use std::time::Duration;

use obsw_base::{Heartbeat, HeartbeatSource};
use obsw_base::slice::copy_prefix_from;
use obsw_container::{ReferenceQueue, SharedBufferPool, SharedChildPointer};

use crate::spacewire::{EndMarker, SpaceWire, SpwError, TimeCode, TimeCodeDispatcher};

/// Offset of the protocol identifier inside a SpaceWire packet (after the
/// logical address byte).
const PROTOCOL_BYTE_OFFSET: usize = 1;

/// How long one reader iteration waits for a packet.
const PACKET_WAIT_TIME: Duration = Duration::from_secs(1);

/// Routing tag of a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId {
    pub protocol: u8,
    pub end: EndMarker,
}

/// A received packet: a child view into a pooled buffer plus its routing
/// tag.
#[derive(Debug, Clone)]
pub struct SpwMessage {
    pub buffer: SharedChildPointer,
    pub id: MessageId,
}

/// Per-channel acceptance filter.
#[derive(Debug, Clone, Copy)]
pub struct PacketFilter {
    pub protocol: u8,
    pub max_size: usize,
    pub allow_partial: bool,
}

impl PacketFilter {
    fn matches(&self, id: &MessageId, length: usize) -> bool {
        id.protocol == self.protocol
            && length <= self.max_size
            && (self.allow_partial || id.end == EndMarker::Eop)
    }
}

/// Registered consumer endpoint: filter plus bounded queue.
pub struct BusChannel {
    filter: PacketFilter,
    queue: Arc<ReferenceQueue<SpwMessage>>,
}

impl BusChannel {
    pub fn new(filter: PacketFilter, queue: Arc<ReferenceQueue<SpwMessage>>) -> Self {
        Self { filter, queue }
    }
}

/// Drop accounting of the reader loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub received: u32,
    pub dispatched: u32,
    pub dropped_no_channel: u32,
    pub dropped_queue_full: u32,
    pub dropped_no_buffer: u32,
}

pub struct SpaceWireDispatcher<L: SpaceWire> {
    link: L,
    pool: SharedBufferPool,
    channels: Vec<BusChannel>,
    time_codes: TimeCodeDispatcher,
    heartbeat: Arc<dyn Heartbeat>,
    heartbeat_source: HeartbeatSource,
    stats: DispatcherStats,
}

impl<L: SpaceWire> SpaceWireDispatcher<L> {
    /// `max_packets` pooled buffers of `max_packet_size` bytes bound the
    /// number of in-flight packets.
    pub fn new(
        link: L,
        max_packets: usize,
        max_packet_size: usize,
        heartbeat: Arc<dyn Heartbeat>,
        heartbeat_source: HeartbeatSource,
    ) -> Self {
        Self {
            link,
            pool: SharedBufferPool::new(max_packet_size, max_packets),
            channels: Vec::new(),
            time_codes: TimeCodeDispatcher::new(8),
            heartbeat,
            heartbeat_source,
            stats: DispatcherStats::default(),
        }
    }

    /// Registers a channel. Matching happens in registration order; the
    /// first match wins.
    pub fn add_channel(&mut self, channel: BusChannel) {
        self.channels.push(channel);
    }

    pub fn add_time_code_listener(&mut self, queue: Arc<ReferenceQueue<TimeCode>>) -> bool {
        self.time_codes.add_listener(queue)
    }

    /// Distributes a time-code interrupt to every registered listener.
    pub fn handle_time_code(&mut self, time_code: TimeCode) {
        self.time_codes.dispatch(time_code);
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Sends `buffer` over the link through a driver transmit buffer.
    pub fn send(&mut self, buffer: &[u8], timeout: Duration) -> bool {
        let Ok(mut transmit) = self.link.request_buffer(timeout) else {
            return false;
        };
        // better to reject long packets than to cut them
        if transmit.capacity() < buffer.len() {
            return false;
        }
        if !copy_prefix_from(transmit.data_mut(), buffer) {
            return false;
        }
        transmit.set_len(buffer.len());
        transmit.set_end_marker(EndMarker::Eop);
        self.link.send(transmit, timeout).is_ok()
    }

    /// Endless reader loop; exits when the link reports a hard failure.
    pub fn run(&mut self) {
        loop {
            self.heartbeat
                .send(self.heartbeat_source, PACKET_WAIT_TIME * 2);
            match self.dispatch_once(PACKET_WAIT_TIME) {
                Ok(()) | Err(SpwError::Timeout) => {}
                Err(SpwError::Failure) => {
                    log::warn!("spacewire link failed, dispatcher exiting");
                    return;
                }
            }
        }
    }

    /// One reader iteration: receives a packet (or times out) and routes
    /// it.
    pub fn dispatch_once(&mut self, timeout: Duration) -> Result<(), SpwError> {
        if !self.link.is_up() {
            self.link.up(timeout);
            return Err(SpwError::Timeout);
        }

        let receive_buffer = self.link.receive(timeout)?;
        let received_size = receive_buffer.len();

        if received_size < PROTOCOL_BYTE_OFFSET + 1 {
            self.link.release_buffer(receive_buffer);
            return Ok(());
        }

        let max_packet_size = self.pool.chunk_size();
        let Some(mut pointer) = self.pool.allocate() else {
            self.stats.dropped_no_buffer += 1;
            log::debug!("packet dropped, buffer pool exhausted");
            self.link.release_buffer(receive_buffer);
            return Ok(());
        };

        let copy_size = received_size.min(max_packet_size);
        let target = pointer.as_mut_slice().expect("freshly allocated buffer is unique");
        target[..copy_size].copy_from_slice(&receive_buffer.data()[..copy_size]);

        let id = MessageId {
            protocol: pointer.as_slice()[PROTOCOL_BYTE_OFFSET],
            end: if received_size > max_packet_size {
                // the packet was cut
                EndMarker::Partial
            } else {
                receive_buffer.end_marker()
            },
        };
        self.link.release_buffer(receive_buffer);
        self.stats.received += 1;

        let child = pointer
            .child(0, copy_size, u16::from(id.protocol))
            .expect("window within the chunk");
        let message = SpwMessage { buffer: child, id };

        match self
            .channels
            .iter()
            .find(|channel| channel.filter.matches(&id, copy_size))
        {
            Some(channel) => {
                if channel.queue.send(&message).is_ok() {
                    self.stats.dispatched += 1;
                } else {
                    self.stats.dropped_queue_full += 1;
                    log::debug!("packet dropped, channel queue full (protocol {:#04x})", id.protocol);
                }
            }
            None => {
                self.stats.dropped_no_channel += 1;
                log::debug!("packet dropped, no channel for protocol {:#04x}", id.protocol);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacewire::{ReceiveBuffer, TransmitBuffer};
    use obsw_base::NullHeartbeat;
    use std::collections::VecDeque;

    /// Scripted link: hands out queued packets, records sent ones.
    struct ScriptedLink {
        incoming: VecDeque<(Vec<u8>, EndMarker)>,
        sent: Vec<Vec<u8>>,
        up: bool,
    }

    impl ScriptedLink {
        fn new(packets: Vec<(Vec<u8>, EndMarker)>) -> Self {
            Self {
                incoming: packets.into(),
                sent: Vec::new(),
                up: true,
            }
        }
    }

    impl SpaceWire for ScriptedLink {
        fn max_packet_length(&self) -> usize {
            4096
        }

        fn open(&mut self) -> bool {
            true
        }

        fn close(&mut self) {}

        fn up(&mut self, _timeout: Duration) -> bool {
            self.up = true;
            true
        }

        fn down(&mut self, _timeout: Duration) {
            self.up = false;
        }

        fn is_up(&self) -> bool {
            self.up
        }

        fn request_buffer(&mut self, _timeout: Duration) -> Result<TransmitBuffer, SpwError> {
            Ok(TransmitBuffer::with_capacity(self.max_packet_length()))
        }

        fn send(&mut self, buffer: TransmitBuffer, _timeout: Duration) -> Result<(), SpwError> {
            self.sent.push(buffer.data().to_vec());
            Ok(())
        }

        fn receive(&mut self, _timeout: Duration) -> Result<ReceiveBuffer, SpwError> {
            match self.incoming.pop_front() {
                Some((data, end)) => Ok(ReceiveBuffer::new(data, end)),
                None => Err(SpwError::Timeout),
            }
        }

        fn release_buffer(&mut self, _buffer: ReceiveBuffer) {}

        fn flush_receive_buffer(&mut self) {
            self.incoming.clear();
        }

        fn add_time_code_listener(
            &mut self,
            _queue: Arc<ReferenceQueue<TimeCode>>,
        ) -> bool {
            false
        }
    }

    fn dispatcher_with(
        packets: Vec<(Vec<u8>, EndMarker)>,
    ) -> SpaceWireDispatcher<ScriptedLink> {
        SpaceWireDispatcher::new(
            ScriptedLink::new(packets),
            4,
            64,
            Arc::new(NullHeartbeat),
            HeartbeatSource(1),
        )
    }

    #[test]
    fn routes_by_protocol_byte() {
        let mut dispatcher = dispatcher_with(vec![
            (vec![0xFE, 0x01, 0xAA], EndMarker::Eop),
            (vec![0xFE, 0x02, 0xBB], EndMarker::Eop),
        ]);

        let rmap = Arc::new(ReferenceQueue::new(2));
        let custom = Arc::new(ReferenceQueue::new(2));
        dispatcher.add_channel(BusChannel::new(
            PacketFilter { protocol: 0x01, max_size: 64, allow_partial: false },
            Arc::clone(&rmap),
        ));
        dispatcher.add_channel(BusChannel::new(
            PacketFilter { protocol: 0x02, max_size: 64, allow_partial: false },
            Arc::clone(&custom),
        ));

        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        dispatcher.dispatch_once(Duration::ZERO).unwrap();

        let first = rmap.receive(Duration::ZERO).unwrap();
        assert_eq!(first.id.protocol, 0x01);
        assert_eq!(first.buffer.as_slice(), &[0xFE, 0x01, 0xAA]);

        let second = custom.receive(Duration::ZERO).unwrap();
        assert_eq!(second.buffer.as_slice(), &[0xFE, 0x02, 0xBB]);
        assert_eq!(dispatcher.stats().dispatched, 2);
    }

    #[test]
    fn unmatched_protocol_is_dropped() {
        let mut dispatcher = dispatcher_with(vec![(vec![0xFE, 0x77, 0x00], EndMarker::Eop)]);
        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        assert_eq!(dispatcher.stats().dropped_no_channel, 1);
    }

    #[test]
    fn partial_packets_need_permission() {
        let mut dispatcher = dispatcher_with(vec![
            (vec![0xFE, 0x01, 0x01], EndMarker::Eep),
            (vec![0xFE, 0x01, 0x02], EndMarker::Partial),
        ]);
        let strict = Arc::new(ReferenceQueue::new(4));
        dispatcher.add_channel(BusChannel::new(
            PacketFilter { protocol: 0x01, max_size: 64, allow_partial: false },
            Arc::clone(&strict),
        ));

        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        assert_eq!(dispatcher.stats().dropped_no_channel, 2);
        assert!(strict.is_empty());
    }

    #[test]
    fn oversized_packet_is_truncated_to_partial() {
        let big = vec![0xFE; 100]; // pool chunks are 64 bytes
        let mut dispatcher = dispatcher_with(vec![(big, EndMarker::Eop)]);
        let queue = Arc::new(ReferenceQueue::new(2));
        dispatcher.add_channel(BusChannel::new(
            PacketFilter { protocol: 0xFE, max_size: 64, allow_partial: true },
            Arc::clone(&queue),
        ));

        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        let message = queue.receive(Duration::ZERO).unwrap();
        assert_eq!(message.id.end, EndMarker::Partial);
        assert_eq!(message.buffer.len(), 64);
    }

    #[test]
    fn pool_exhaustion_drops_packets() {
        let mut dispatcher = dispatcher_with(vec![
            (vec![0xFE, 0x01, 0x01], EndMarker::Eop),
            (vec![0xFE, 0x01, 0x02], EndMarker::Eop),
        ]);
        // a dispatcher with a single-buffer pool
        dispatcher.pool = SharedBufferPool::new(64, 1);

        let queue = Arc::new(ReferenceQueue::new(4));
        dispatcher.add_channel(BusChannel::new(
            PacketFilter { protocol: 0x01, max_size: 64, allow_partial: false },
            Arc::clone(&queue),
        ));

        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        // the first message still holds the only pool buffer
        dispatcher.dispatch_once(Duration::ZERO).unwrap();
        assert_eq!(dispatcher.stats().dropped_no_buffer, 1);

        // releasing the message frees the buffer again
        drop(queue.receive(Duration::ZERO).unwrap());
    }

    #[test]
    fn send_uses_a_driver_buffer() {
        let mut dispatcher = dispatcher_with(vec![]);
        assert!(dispatcher.send(&[1, 2, 3], Duration::ZERO));
        assert_eq!(dispatcher.link_mut().sent, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn time_codes_reach_all_listeners() {
        let mut dispatcher = dispatcher_with(vec![]);
        let queue = Arc::new(ReferenceQueue::new(2));
        assert!(dispatcher.add_time_code_listener(Arc::clone(&queue)));

        dispatcher.handle_time_code(TimeCode::new(9, 1));
        assert_eq!(queue.receive(Duration::ZERO).unwrap(), TimeCode::new(9, 1));
    }
}
