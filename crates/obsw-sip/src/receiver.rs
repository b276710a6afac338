//! Response receiver thread of the coordinator.
//!
//! Loops on the packet transport, converts every valid packet into a
//! [`ResponseData`] snapshot and feeds the coordinator's response queue.
//! Malformed packets are dropped and counted; the link resynchronizes at
//! the framing layer below.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use obsw_base::{Heartbeat, HeartbeatSource};

use crate::coordinator::{Coordinator, ResponseData};
use crate::transport::{PacketTransportRx, PacketTransportTx};
use crate::{MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH};

/// Outcome of one receive iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Success,
    /// Nothing valid arrived within the timeout.
    ReceiveError,
    /// A frame arrived but did not validate as a packet.
    ReadError,
    /// The response slot was already occupied.
    QueueError,
}

pub struct CoordinatorPacketReceiver<R, T: PacketTransportTx> {
    transport: R,
    coordinator: Arc<Coordinator<T>>,
    heartbeat: Arc<dyn Heartbeat>,
    heartbeat_source: HeartbeatSource,
    running: Arc<AtomicBool>,
    dropped: u32,
}

impl<R: PacketTransportRx, T: PacketTransportTx> CoordinatorPacketReceiver<R, T> {
    /// How long one loop iteration waits for a packet.
    pub const PACKET_WAIT_TIME: Duration = Duration::from_secs(1);

    pub fn new(
        transport: R,
        coordinator: Arc<Coordinator<T>>,
        heartbeat: Arc<dyn Heartbeat>,
        heartbeat_source: HeartbeatSource,
    ) -> Self {
        Self {
            transport,
            coordinator,
            heartbeat,
            heartbeat_source,
            running: Arc::new(AtomicBool::new(true)),
            dropped: 0,
        }
    }

    /// Flag that makes [`run`](Self::run) return after the current
    /// iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Packets that arrived but could not be parsed or enqueued.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Receiver loop: one heartbeat and one receive attempt per
    /// iteration.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            self.heartbeat
                .send(self.heartbeat_source, Self::PACKET_WAIT_TIME * 2);
            self.receive_packet(Self::PACKET_WAIT_TIME);
        }
    }

    /// One receive attempt.
    pub fn receive_packet(&mut self, timeout: Duration) -> ReceiveOutcome {
        let mut buffer = [0u8; MAX_PACKET_LENGTH];
        let reader = match self.transport.receive(&mut buffer, timeout) {
            Ok(reader) => reader,
            Err(crate::SipError::Timeout) => return ReceiveOutcome::ReceiveError,
            Err(error) => {
                self.dropped = self.dropped.wrapping_add(1);
                log::debug!("response packet dropped: {error}");
                return ReceiveOutcome::ReadError;
            }
        };

        let mut data = ResponseData {
            length: reader.length(),
            worker_id: reader.worker_id(),
            counter: reader.counter(),
            packet_type: reader.packet_type(),
            payload_length: reader.payload().len() as u16,
            payload: [0; MAX_PAYLOAD_LENGTH],
        };
        data.payload[..reader.payload().len()].copy_from_slice(reader.payload());

        if self.coordinator.push_response(data) {
            ReceiveOutcome::Success
        } else {
            self.dropped = self.dropped.wrapping_add(1);
            log::debug!("response queue full, packet dropped");
            ReceiveOutcome::QueueError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketReader, PacketWriter};
    use crate::SipError;
    use obsw_base::NullHeartbeat;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedRx {
        frames: Mutex<VecDeque<Vec<u8>>>,
    }

    impl PacketTransportRx for ScriptedRx {
        fn receive<'a>(
            &mut self,
            buffer: &'a mut [u8],
            _timeout: Duration,
        ) -> Result<PacketReader<'a>, SipError> {
            let Some(frame) = self.frames.lock().unwrap().pop_front() else {
                return Err(SipError::Timeout);
            };
            buffer[..frame.len()].copy_from_slice(&frame);
            let mut reader = PacketReader::new(&buffer[..frame.len()]);
            reader.read_packet()?;
            Ok(reader)
        }
    }

    struct NullTx;

    impl PacketTransportTx for NullTx {
        fn transmit(&mut self, packet: &PacketReader<'_>) -> Result<usize, SipError> {
            Ok(packet.slice().len())
        }
    }

    fn packet(worker_id: u8, counter: u8, packet_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut buffer = [0u8; MAX_PACKET_LENGTH];
        let mut writer = PacketWriter::new(&mut buffer);
        writer.set_worker_id(worker_id);
        writer.set_counter(counter);
        writer.set_type(packet_type);
        writer.set_payload(payload).unwrap();
        writer.update().unwrap();
        writer.slice_if_finalized().unwrap().to_vec()
    }

    fn receiver_with(
        frames: Vec<Vec<u8>>,
    ) -> (
        CoordinatorPacketReceiver<ScriptedRx, NullTx>,
        Arc<Coordinator<NullTx>>,
    ) {
        let coordinator = Arc::new(Coordinator::new(NullTx));
        let receiver = CoordinatorPacketReceiver::new(
            ScriptedRx { frames: Mutex::new(frames.into()) },
            Arc::clone(&coordinator),
            Arc::new(NullHeartbeat),
            HeartbeatSource(7),
        );
        (receiver, coordinator)
    }

    #[test]
    fn valid_packet_lands_in_the_queue() {
        let (mut receiver, coordinator) =
            receiver_with(vec![packet(0x09, 0x02, 0x30, &[1, 2, 3])]);

        assert_eq!(receiver.receive_packet(Duration::ZERO), ReceiveOutcome::Success);
        // the queued snapshot makes the next request with matching
        // expectations succeed
        assert_eq!(coordinator.send_request(0x09, 0x02, 0x00, 0x30, &[]), Ok(()));
    }

    #[test]
    fn timeout_reports_receive_error() {
        let (mut receiver, _) = receiver_with(vec![]);
        assert_eq!(
            receiver.receive_packet(Duration::ZERO),
            ReceiveOutcome::ReceiveError
        );
    }

    #[test]
    fn corrupt_packet_reports_read_error() {
        let mut bad = packet(0x01, 0x01, 0x01, &[9]);
        *bad.last_mut().unwrap() ^= 0xFF;
        let (mut receiver, _) = receiver_with(vec![bad]);
        assert_eq!(receiver.receive_packet(Duration::ZERO), ReceiveOutcome::ReadError);
        assert_eq!(receiver.dropped(), 1);
    }

    #[test]
    fn occupied_slot_reports_queue_error() {
        let (mut receiver, _) = receiver_with(vec![
            packet(0x01, 0x01, 0x01, &[]),
            packet(0x01, 0x02, 0x01, &[]),
        ]);
        assert_eq!(receiver.receive_packet(Duration::ZERO), ReceiveOutcome::Success);
        assert_eq!(receiver.receive_packet(Duration::ZERO), ReceiveOutcome::QueueError);
    }
}
