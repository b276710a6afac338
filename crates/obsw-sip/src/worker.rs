//! Response side of the protocol.

use crate::packet::PacketWriter;
use crate::transport::PacketTransportTx;
use crate::{MAX_PACKET_LENGTH, SipError};

/// Worker endpoint: answers coordinator requests with response packets
/// carrying its own id.
pub struct Worker<T: PacketTransportTx> {
    worker_id: u8,
    transport: T,
}

impl<T: PacketTransportTx> Worker<T> {
    pub fn new(worker_id: u8, transport: T) -> Self {
        Self { worker_id, transport }
    }

    pub fn id(&self) -> u8 {
        self.worker_id
    }

    /// Builds a response packet and hands it to the transport. Returns the
    /// bytes put on the wire.
    pub fn send_response(
        &mut self,
        counter: u8,
        packet_type: u8,
        payload: &[u8],
    ) -> Result<usize, SipError> {
        let mut buffer = [0u8; MAX_PACKET_LENGTH];
        let mut writer = PacketWriter::new(&mut buffer);
        writer.set_worker_id(self.worker_id);
        writer.set_counter(counter);
        writer.set_type(packet_type);
        writer.set_payload(payload)?;
        let packet = writer.reader()?;
        self.transport.transmit(&packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;
    use std::sync::mpsc;

    struct RecordingTransport {
        sent: mpsc::Sender<Vec<u8>>,
    }

    impl PacketTransportTx for RecordingTransport {
        fn transmit(&mut self, packet: &PacketReader<'_>) -> Result<usize, SipError> {
            self.sent.send(packet.slice().to_vec()).unwrap();
            Ok(packet.slice().len())
        }
    }

    #[test]
    fn response_carries_the_worker_id() {
        let (sent, wire) = mpsc::channel();
        let mut worker = Worker::new(0x42, RecordingTransport { sent });

        let n = worker.send_response(0x05, 0x21, &[0xCA, 0xFE]).unwrap();
        assert_eq!(n, 9);

        let packet = wire.recv().unwrap();
        let mut reader = PacketReader::new(&packet);
        reader.read_packet().unwrap();
        assert_eq!(reader.worker_id(), 0x42);
        assert_eq!(reader.counter(), 0x05);
        assert_eq!(reader.packet_type(), 0x21);
        assert_eq!(reader.payload(), &[0xCA, 0xFE]);
    }

    #[test]
    fn transport_errors_propagate() {
        struct FailingTransport;
        impl PacketTransportTx for FailingTransport {
            fn transmit(&mut self, _packet: &PacketReader<'_>) -> Result<usize, SipError> {
                Err(SipError::SerialStopped)
            }
        }

        let mut worker = Worker::new(1, FailingTransport);
        assert_eq!(worker.send_response(0, 0, &[]), Err(SipError::SerialStopped));
    }
}
