//! In-process byte streams for host-side testing and tools.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::transport::{ByteStreamRx, ByteStreamTx, TransportError};

#[derive(Default)]
struct Pipe {
    bytes: Mutex<VecDeque<u8>>,
    readable: Condvar,
}

impl Pipe {
    fn push(&self, data: &[u8]) {
        self.bytes.lock().unwrap().extend(data.iter().copied());
        self.readable.notify_all();
    }

    fn pull(&self, dst: &mut [u8], timeout: Duration) -> usize {
        let bytes = self.bytes.lock().unwrap();
        let (mut bytes, _) = self
            .readable
            .wait_timeout_while(bytes, timeout, |bytes| bytes.is_empty())
            .unwrap();
        let n = dst.len().min(bytes.len());
        for slot in dst[..n].iter_mut() {
            *slot = bytes.pop_front().unwrap();
        }
        n
    }
}

/// One endpoint of a bidirectional in-memory byte stream.
pub struct LoopbackByteStream {
    tx: Arc<Pipe>,
    rx: Arc<Pipe>,
}

impl LoopbackByteStream {
    /// Creates two connected endpoints: what one writes, the other reads.
    pub fn pair() -> (Self, Self) {
        let forward = Arc::new(Pipe::default());
        let backward = Arc::new(Pipe::default());
        (
            Self { tx: Arc::clone(&forward), rx: Arc::clone(&backward) },
            Self { tx: backward, rx: forward },
        )
    }
}

impl ByteStreamTx for LoopbackByteStream {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.tx.push(data);
        Ok(data.len())
    }
}

impl ByteStreamRx for LoopbackByteStream {
    fn read(&mut self, dst: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        Ok(self.rx.pull(dst, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_cross_the_pair() {
        let (mut a, mut b) = LoopbackByteStream::pair();
        a.write(&[1, 2, 3]).unwrap();

        let mut out = [0u8; 8];
        let n = b.read(&mut out, Duration::from_millis(50)).unwrap();
        assert_eq!(&out[..n], &[1, 2, 3]);

        b.write(&[9]).unwrap();
        let n = a.read(&mut out, Duration::from_millis(50)).unwrap();
        assert_eq!(&out[..n], &[9]);
    }

    #[test]
    fn read_times_out_empty() {
        let (mut a, _b) = LoopbackByteStream::pair();
        let mut out = [0u8; 4];
        assert_eq!(a.read(&mut out, Duration::from_millis(5)), Ok(0));
    }
}
