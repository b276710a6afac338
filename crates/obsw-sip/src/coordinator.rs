//! Request side of the protocol.
//!
//! The coordinator serializes a request, hands it to the packet transport
//! and blocks on a single-slot response queue which the
//! [`CoordinatorPacketReceiver`](crate::CoordinatorPacketReceiver) thread
//! fills. Parallel transactions are not allowed, therefore one slot is
//! enough and responses correlate by worker id and expected type alone.

use std::sync::Mutex;
use std::time::Duration;

use obsw_container::ReferenceQueue;

use crate::packet::PacketWriter;
use crate::transport::PacketTransportTx;
use crate::{MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH, SipError};

/// Snapshot of a received response packet.
#[derive(Clone)]
pub struct ResponseData {
    pub length: u16,
    pub worker_id: u8,
    pub counter: u8,
    pub packet_type: u8,
    pub payload_length: u16,
    pub payload: [u8; MAX_PAYLOAD_LENGTH],
}

impl ResponseData {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_length as usize]
    }
}

impl std::fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseData")
            .field("worker_id", &self.worker_id)
            .field("counter", &self.counter)
            .field("packet_type", &self.packet_type)
            .field("payload_length", &self.payload_length)
            .finish()
    }
}

pub struct Coordinator<T: PacketTransportTx> {
    transport: Mutex<T>,
    // Parallel transactions are not allowed, therefore one response slot
    // is enough.
    response_queue: ReferenceQueue<ResponseData>,
}

impl<T: PacketTransportTx> Coordinator<T> {
    /// How long a request waits for its response.
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            response_queue: ReferenceQueue::new(1),
        }
    }

    /// Sends a request and awaits a response of `expected_response_type`
    /// from `worker_id`.
    pub fn send_request(
        &self,
        worker_id: u8,
        counter: u8,
        packet_type: u8,
        expected_response_type: u8,
        payload: &[u8],
    ) -> Result<(), SipError> {
        self.transact(worker_id, counter, packet_type, expected_response_type, payload)
            .map(|_| ())
    }

    /// Like [`send_request`](Self::send_request), additionally copying the
    /// response payload into `response_buffer`. Returns the payload
    /// length.
    pub fn send_request_response_data(
        &self,
        worker_id: u8,
        counter: u8,
        packet_type: u8,
        expected_response_type: u8,
        payload: &[u8],
        response_buffer: &mut [u8],
    ) -> Result<usize, SipError> {
        let response =
            self.transact(worker_id, counter, packet_type, expected_response_type, payload)?;
        let data = response.payload();
        if response_buffer.len() < data.len() {
            return Err(SipError::BufferError);
        }
        response_buffer[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Queue feed used by the receiver thread. Returns `false` when the
    /// slot is already taken.
    pub fn push_response(&self, data: ResponseData) -> bool {
        self.response_queue.send(&data).is_ok()
    }

    fn transact(
        &self,
        worker_id: u8,
        counter: u8,
        packet_type: u8,
        expected_response_type: u8,
        payload: &[u8],
    ) -> Result<ResponseData, SipError> {
        let mut buffer = [0u8; MAX_PACKET_LENGTH];
        let mut writer = PacketWriter::new(&mut buffer);
        writer.set_worker_id(worker_id);
        writer.set_counter(counter);
        writer.set_type(packet_type);
        writer.set_payload(payload)?;
        let packet = writer.reader()?;

        self.transport
            .lock()
            .unwrap()
            .transmit(&packet)
            .map_err(|_| SipError::TransmitError)?;

        let response = self
            .response_queue
            .receive(Self::RESPONSE_TIMEOUT)
            .map_err(|_| SipError::ResponseError)?;

        if response.worker_id != worker_id {
            return Err(SipError::WorkerIdError);
        }
        if response.packet_type != expected_response_type {
            return Err(SipError::ResponseTypeError);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;
    use std::sync::Arc;
    use std::sync::mpsc;

    /// Transport that records transmitted packets on a channel.
    struct RecordingTransport {
        sent: mpsc::Sender<Vec<u8>>,
    }

    impl PacketTransportTx for RecordingTransport {
        fn transmit(&mut self, packet: &PacketReader<'_>) -> Result<usize, SipError> {
            self.sent.send(packet.slice().to_vec()).unwrap();
            Ok(packet.slice().len())
        }
    }

    fn response(worker_id: u8, counter: u8, packet_type: u8, payload: &[u8]) -> ResponseData {
        let mut data = ResponseData {
            length: (payload.len() + 3) as u16,
            worker_id,
            counter,
            packet_type,
            payload_length: payload.len() as u16,
            payload: [0; MAX_PAYLOAD_LENGTH],
        };
        data.payload[..payload.len()].copy_from_slice(payload);
        data
    }

    fn coordinator() -> (Arc<Coordinator<RecordingTransport>>, mpsc::Receiver<Vec<u8>>) {
        let (sent, wire) = mpsc::channel();
        (
            Arc::new(Coordinator::new(RecordingTransport { sent })),
            wire,
        )
    }

    #[test]
    fn matching_response_completes_the_request() {
        let (coordinator, wire) = coordinator();

        let responder = {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || {
                let request = wire.recv().unwrap();
                // worker id is byte 2, counter byte 3
                assert_eq!(request[2], 0x05);
                coordinator.push_response(response(0x05, request[3], 0x20, &[]));
            })
        };

        coordinator
            .send_request(0x05, 0x01, 0x10, 0x20, &[0xAA, 0xBB])
            .unwrap();
        responder.join().unwrap();
    }

    #[test]
    fn missing_response_times_out() {
        let (coordinator, _wire) = coordinator();
        assert_eq!(
            coordinator.send_request(0x05, 0x01, 0x10, 0x20, &[]),
            Err(SipError::ResponseError)
        );
    }

    #[test]
    fn wrong_worker_id_is_flagged() {
        let (coordinator, _wire) = coordinator();
        coordinator.push_response(response(0x06, 0x01, 0x20, &[]));
        assert_eq!(
            coordinator.send_request(0x05, 0x01, 0x10, 0x20, &[]),
            Err(SipError::WorkerIdError)
        );
    }

    #[test]
    fn wrong_response_type_is_flagged() {
        let (coordinator, _wire) = coordinator();
        coordinator.push_response(response(0x05, 0x01, 0x7F, &[]));
        assert_eq!(
            coordinator.send_request(0x05, 0x01, 0x10, 0x20, &[]),
            Err(SipError::ResponseTypeError)
        );
    }

    #[test]
    fn response_payload_reaches_the_caller() {
        let (coordinator, _wire) = coordinator();
        coordinator.push_response(response(0x05, 0x01, 0x20, &[0xDE, 0xAD, 0xBE, 0xEF]));

        let mut data = [0u8; 16];
        let n = coordinator
            .send_request_response_data(0x05, 0x01, 0x10, 0x20, &[], &mut data)
            .unwrap();
        assert_eq!(&data[..n], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn single_slot_refuses_a_second_response() {
        let (coordinator, _wire) = coordinator();
        assert!(coordinator.push_response(response(1, 1, 1, &[])));
        assert!(!coordinator.push_response(response(1, 2, 1, &[])));
    }
}
