//! End-to-end request/response exchange between a coordinator and a
//! worker over COBS-framed loopback byte streams.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use obsw_base::{HeartbeatSource, NullHeartbeat};
use obsw_hal::{CobsFrameTransport, loopback::LoopbackByteStream};
use obsw_sip::{
    Coordinator, CoordinatorPacketReceiver, PacketTransportRx, PacketTransportWrapper, Worker,
};

const PING: u8 = 0x10;
const PONG: u8 = 0x20;
const WORKER_ID: u8 = 0x05;

#[test]
fn request_response_round_trip() {
    // two byte links: one carries requests, one carries responses
    let (request_near, request_far) = LoopbackByteStream::pair();
    let (response_near, response_far) = LoopbackByteStream::pair();

    let coordinator = Arc::new(Coordinator::new(PacketTransportWrapper::new(
        CobsFrameTransport::new(request_near, 2048),
    )));

    let mut receiver = CoordinatorPacketReceiver::new(
        PacketTransportWrapper::new(CobsFrameTransport::new(response_far, 2048)),
        Arc::clone(&coordinator),
        Arc::new(NullHeartbeat),
        HeartbeatSource(1),
    );
    let stop = receiver.stop_handle();
    let receiver_thread = std::thread::spawn(move || {
        receiver.run();
        receiver
    });

    // worker side: answer each valid request with a PONG echoing the
    // counter and payload
    let worker_thread = std::thread::spawn(move || {
        let mut request_rx =
            PacketTransportWrapper::new(CobsFrameTransport::new(request_far, 2048));
        let mut worker = Worker::new(
            WORKER_ID,
            PacketTransportWrapper::new(CobsFrameTransport::new(response_near, 2048)),
        );

        for _ in 0..2 {
            let mut buffer = [0u8; 2048];
            let request = request_rx
                .receive(&mut buffer, Duration::from_secs(2))
                .expect("request arrives");
            assert_eq!(request.packet_type(), PING);
            let counter = request.counter();
            let mut echo = [0u8; 64];
            let payload = request.payload();
            echo[..payload.len()].copy_from_slice(payload);
            let length = payload.len();
            worker
                .send_response(counter, PONG, &echo[..length])
                .expect("response goes out");
        }
    });

    let mut response = [0u8; 64];
    let n = coordinator
        .send_request_response_data(WORKER_ID, 0x01, PING, PONG, &[0xAA, 0x00, 0xBB], &mut response)
        .expect("first transaction");
    assert_eq!(&response[..n], &[0xAA, 0x00, 0xBB]);

    // sequential second transaction reuses the single response slot
    coordinator
        .send_request(WORKER_ID, 0x02, PING, PONG, &[])
        .expect("second transaction");

    worker_thread.join().unwrap();
    stop.store(false, Ordering::Release);
    let receiver = receiver_thread.join().unwrap();
    assert_eq!(receiver.dropped(), 0);
}
