//! Long-running compression thread.
//!
//! Consumes raw blocks from an input queue, transforms and encodes each
//! into a freshly pooled output block and forwards it with bounded
//! retries. A checkpoint suspends the loop cleanly between blocks; the
//! heartbeat allowance always covers one full worst-case iteration so
//! the watchdog cannot fire mid-cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use obsw_base::{Checkpoint, CheckpointState, Heartbeat, HeartbeatSource};
use obsw_container::{ReferenceQueue, SharedBufferPool};

use crate::data_block::DataBlock;
use crate::nls::NlsEncoder;

pub struct DataProcessorThread {
    heartbeat: Arc<dyn Heartbeat>,
    heartbeat_source: HeartbeatSource,
    input_queue: Arc<ReferenceQueue<DataBlock>>,
    output_queue: Arc<ReferenceQueue<DataBlock>>,
    pool: SharedBufferPool,
    checkpoint: Checkpoint,
    running: AtomicBool,
    incoming_blocks: AtomicU32,
    processed_blocks: AtomicU32,
    forwarded_blocks: AtomicU32,
    lost_blocks: AtomicU32,
    retry_timeout: Duration,
    max_send_retries: u8,
}

impl DataProcessorThread {
    /// How long one iteration waits for an incoming block.
    pub const WAIT_FOR_BLOCK_TIMEOUT: Duration = Duration::from_secs(5);
    /// Allowance for transforming and encoding one block.
    pub const PROCESSING_TIMEOUT: Duration = Duration::from_secs(1);

    pub const DEFAULT_SEND_RETRIES: u8 = 5;
    pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new(
        heartbeat: Arc<dyn Heartbeat>,
        heartbeat_source: HeartbeatSource,
        pool: SharedBufferPool,
        input_queue: Arc<ReferenceQueue<DataBlock>>,
        output_queue: Arc<ReferenceQueue<DataBlock>>,
        max_send_retries: u8,
        retry_timeout: Duration,
    ) -> Self {
        Self {
            heartbeat,
            heartbeat_source,
            input_queue,
            output_queue,
            pool,
            checkpoint: Checkpoint::new(CheckpointState::Suspending),
            running: AtomicBool::new(true),
            incoming_blocks: AtomicU32::new(0),
            processed_blocks: AtomicU32::new(0),
            forwarded_blocks: AtomicU32::new(0),
            lost_blocks: AtomicU32::new(0),
            retry_timeout,
            max_send_retries,
        }
    }

    /// Thread body: suspend at the checkpoint, then process one block.
    pub fn run(&self) {
        while self.running.load(Ordering::Acquire) {
            self.heartbeat.suspend(self.heartbeat_source);
            self.checkpoint.pass();
            self.process_single_block(Self::WAIT_FOR_BLOCK_TIMEOUT);
        }
    }

    /// Makes [`run`](Self::run) return after the current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.checkpoint.resume();
    }

    pub fn enable(&self) {
        self.checkpoint.resume();
    }

    pub fn disable(&self) {
        self.checkpoint.suspend();
    }

    pub fn is_enabled(&self) -> bool {
        self.checkpoint.state() == CheckpointState::Running
    }

    pub fn received_blocks(&self) -> u32 {
        self.incoming_blocks.load(Ordering::Relaxed)
    }

    pub fn processed_blocks(&self) -> u32 {
        self.processed_blocks.load(Ordering::Relaxed)
    }

    pub fn forwarded_blocks(&self) -> u32 {
        self.forwarded_blocks.load(Ordering::Relaxed)
    }

    pub fn lost_blocks(&self) -> u32 {
        self.lost_blocks.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.incoming_blocks.store(0, Ordering::Relaxed);
        self.processed_blocks.store(0, Ordering::Relaxed);
        self.forwarded_blocks.store(0, Ordering::Relaxed);
        self.lost_blocks.store(0, Ordering::Relaxed);
    }

    /// One full processing cycle: receive, compress, forward with
    /// retries.
    pub fn process_single_block(&self, timeout: Duration) {
        // allowance covers the wait, the processing and every retry pause
        self.heartbeat.send(
            self.heartbeat_source,
            timeout
                + Self::PROCESSING_TIMEOUT * 2
                + self.retry_timeout * u32::from(self.max_send_retries),
        );

        let Ok(mut block) = self.input_queue.receive(timeout) else {
            return;
        };
        self.incoming_blocks.fetch_add(1, Ordering::Relaxed);

        let Some(encoded) = self.compress(&mut block) else {
            self.lost_blocks.fetch_add(1, Ordering::Relaxed);
            log::debug!("block dropped, compression failed");
            return;
        };
        self.processed_blocks.fetch_add(1, Ordering::Relaxed);

        let mut sent = false;
        for _ in 0..self.max_send_retries {
            if self.output_queue.send(&encoded).is_ok() {
                sent = true;
                break;
            }
            std::thread::sleep(self.retry_timeout);
        }
        if sent {
            self.forwarded_blocks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.lost_blocks.fetch_add(1, Ordering::Relaxed);
            log::warn!("encoded block lost, output queue stayed full");
        }
    }

    fn compress(&self, block: &mut DataBlock) -> Option<DataBlock> {
        if !block.apply_wavelet_transform() {
            return None;
        }
        let pointer = self.pool.allocate()?;
        let mut output = DataBlock::new(
            pointer,
            block.parameter_id(),
            block.start_time(),
            block.sampling_rate(),
            block.blocksize(),
        );
        let mut encoder = NlsEncoder::new();
        if !block.encode(&mut output, &mut encoder) {
            return None;
        }
        Some(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_block::{Blocksize, HEADER_SIZE, SamplingRate};
    use crate::fixedpoint::Fixedpoint;
    use obsw_base::{GpsTime, NullHeartbeat};

    const BUFFER_SIZE: usize = 16 * 4 + HEADER_SIZE;

    fn raw_block(pool: &SharedBufferPool) -> DataBlock {
        let mut block = DataBlock::new(
            pool.allocate().unwrap(),
            7,
            GpsTime::new(100, 0),
            SamplingRate::Hz100,
            Blocksize::Bs16,
        );
        for i in 0..16 {
            assert!(block.push(Fixedpoint::from_int(i % 5)));
        }
        block
    }

    fn processor(
        output_capacity: usize,
        retries: u8,
        retry_timeout: Duration,
    ) -> (Arc<DataProcessorThread>, SharedBufferPool) {
        let pool = SharedBufferPool::new(BUFFER_SIZE, 4);
        let processor = DataProcessorThread::new(
            Arc::new(NullHeartbeat),
            HeartbeatSource(3),
            pool.clone(),
            Arc::new(ReferenceQueue::new(4)),
            Arc::new(ReferenceQueue::new(output_capacity)),
            retries,
            retry_timeout,
        );
        (Arc::new(processor), pool)
    }

    #[test]
    fn processes_a_block_end_to_end() {
        let (processor, pool) = processor(2, 2, Duration::from_millis(1));
        let block = raw_block(&pool);
        processor.input_queue.send(&block).unwrap();
        drop(block);

        processor.process_single_block(Duration::ZERO);

        assert_eq!(processor.received_blocks(), 1);
        assert_eq!(processor.processed_blocks(), 1);
        assert_eq!(processor.forwarded_blocks(), 1);
        assert_eq!(processor.lost_blocks(), 0);

        let encoded = processor.output_queue.receive(Duration::ZERO).unwrap();
        assert!(encoded.is_encoded());
        assert_eq!(encoded.parameter_id(), 7);
        assert!(!encoded.encoded_data().is_empty());
    }

    #[test]
    fn empty_input_queue_is_not_an_error() {
        let (processor, _pool) = processor(1, 1, Duration::from_millis(1));
        processor.process_single_block(Duration::ZERO);
        assert_eq!(processor.received_blocks(), 0);
        assert_eq!(processor.lost_blocks(), 0);
    }

    #[test]
    fn incomplete_block_is_counted_lost() {
        let (processor, pool) = processor(1, 1, Duration::from_millis(1));
        let mut partial = DataBlock::new(
            pool.allocate().unwrap(),
            1,
            GpsTime::default(),
            SamplingRate::Hz1,
            Blocksize::Bs16,
        );
        partial.push(Fixedpoint::from_int(1));
        processor.input_queue.send(&partial).unwrap();
        drop(partial);

        processor.process_single_block(Duration::ZERO);
        assert_eq!(processor.received_blocks(), 1);
        assert_eq!(processor.lost_blocks(), 1);
        assert_eq!(processor.processed_blocks(), 0);
    }

    #[test]
    fn full_output_queue_exhausts_retries() {
        let (processor, pool) = processor(1, 3, Duration::from_millis(1));
        // occupy the single output slot
        let blocker = raw_block(&pool);
        processor.output_queue.send(&blocker).unwrap();

        let block = raw_block(&pool);
        processor.input_queue.send(&block).unwrap();
        drop(block);

        processor.process_single_block(Duration::ZERO);
        assert_eq!(processor.processed_blocks(), 1);
        assert_eq!(processor.forwarded_blocks(), 0);
        assert_eq!(processor.lost_blocks(), 1);
    }

    #[test]
    fn checkpoint_gates_the_loop() {
        let (processor, pool) = processor(2, 1, Duration::from_millis(1));
        assert!(!processor.is_enabled());

        let block = raw_block(&pool);
        processor.input_queue.send(&block).unwrap();
        drop(block);

        let worker = {
            let processor = Arc::clone(&processor);
            std::thread::spawn(move || processor.run())
        };

        // suspended: nothing is consumed
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(processor.received_blocks(), 0);

        processor.enable();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while processor.forwarded_blocks() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(processor.forwarded_blocks(), 1);

        processor.stop();
        worker.join().unwrap();
    }
}
