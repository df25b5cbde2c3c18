//! Buffered log sink.
//!
//! # Responsibilities
//! - Batch small log writes in memory
//! - Flush on capacity pressure, on a timer, and on teardown
//! - Return destination I/O errors to the caller unchanged
//!
//! # Design Decisions
//! - One lock guards the buffer for writers and the flush timer alike
//! - A payload is never split across two destination writes by the buffer
//! - Wrapping an already buffered sink returns it unchanged

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;

/// Default in-memory buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;
/// Default interval between timer flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// A byte destination that can be shared between threads.
pub trait WriteSync: Send + Sync + 'static {
    /// Write some bytes, returning how many were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Push everything written so far to durable storage.
    fn sync(&self) -> io::Result<()>;

    /// True for sinks that already buffer in memory.
    fn is_buffered(&self) -> bool {
        false
    }

    /// Write the whole payload.
    fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn WriteSync>;

/// Standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl WriteSync for StdoutSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().lock().write(buf)
    }

    fn sync(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// In-memory accumulator in front of a destination.
struct LogBuffer {
    dest: SharedSink,
    buf: Vec<u8>,
    capacity: usize,
}

impl LogBuffer {
    fn available(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Hand every buffered byte to the destination.
    ///
    /// On error the bytes already accepted are dropped from the buffer and
    /// the rest are kept, so nothing is lost or written twice.
    fn flush(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.buf.len() {
                break Ok(());
            }
            match self.dest.write(&self.buf[written..]) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        self.buf.drain(..written);
        if written > 0 || result.is_err() {
            metrics::record_flush(result.is_ok());
        }
        result
    }
}

/// A [`WriteSync`] decorator that batches writes.
pub struct BufferedSink {
    inner: Mutex<LogBuffer>,
}

impl BufferedSink {
    /// Wrap `dest` without starting a flush timer.
    ///
    /// Most callers want [`buffer`], which also schedules periodic flushes.
    pub fn new(dest: SharedSink, capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_BUFFER_SIZE } else { capacity };
        Self {
            inner: Mutex::new(LogBuffer {
                dest,
                buf: Vec::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Bytes currently held in memory.
    pub fn buffered(&self) -> usize {
        self.inner.lock().buf.len()
    }
}

impl WriteSync for BufferedSink {
    fn write(&self, bs: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();

        if bs.len() > inner.available() && !inner.buf.is_empty() {
            inner.flush()?;
        }

        if bs.len() > inner.available() {
            // Larger than the whole buffer; the buffer is empty here.
            inner.dest.write_all(bs)?;
        } else {
            inner.buf.extend_from_slice(bs);
        }
        Ok(bs.len())
    }

    fn sync(&self) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.flush()?;
        inner.dest.sync()
    }

    fn is_buffered(&self) -> bool {
        true
    }
}

/// Stops the flush timer and flushes one last time.
#[must_use = "dropping the handle without calling close() can lose buffered log lines"]
pub struct CloseHandle {
    timer: Option<CancellationToken>,
    sink: Option<SharedSink>,
}

impl CloseHandle {
    /// A handle whose close does nothing.
    pub fn noop() -> Self {
        Self {
            timer: None,
            sink: None,
        }
    }

    /// Cancel the flush timer and sync the sink one last time.
    pub fn close(self) -> io::Result<()> {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
        match self.sink {
            Some(sink) => sink.sync(),
            None => Ok(()),
        }
    }
}

/// Wrap `dest` in a [`BufferedSink`] flushed every `flush_interval`.
///
/// Zero values select the defaults. If `dest` is already buffered it is
/// returned as-is with a no-op [`CloseHandle`]. The timer runs on the
/// current Tokio runtime; outside a runtime only capacity and close
/// flushes happen.
pub fn buffer(dest: SharedSink, capacity: usize, flush_interval: Duration) -> (SharedSink, CloseHandle) {
    if dest.is_buffered() {
        return (dest, CloseHandle::noop());
    }

    let flush_interval = if flush_interval.is_zero() {
        DEFAULT_FLUSH_INTERVAL
    } else {
        flush_interval
    };
    let sink: SharedSink = Arc::new(BufferedSink::new(dest, capacity));

    let timer = match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let token = CancellationToken::new();
            handle.spawn(flush_loop(Arc::clone(&sink), flush_interval, token.clone()));
            Some(token)
        }
        Err(_) => None,
    };

    let close = CloseHandle {
        timer,
        sink: Some(Arc::clone(&sink)),
    };
    (sink, close)
}

async fn flush_loop(sink: SharedSink, every: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are counted in metrics; logging here would write into this sink.
                let _ = sink.sync();
            }
            _ = token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every write call separately.
    #[derive(Default)]
    struct MemorySink {
        writes: Mutex<Vec<Vec<u8>>>,
        syncs: AtomicUsize,
        fail: AtomicBool,
    }

    impl MemorySink {
        fn bytes(&self) -> Vec<u8> {
            self.writes.lock().concat()
        }

        fn write_calls(&self) -> usize {
            self.writes.lock().len()
        }
    }

    impl WriteSync for MemorySink {
        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.writes.lock().push(buf.to_vec());
            Ok(buf.len())
        }

        fn sync(&self) -> io::Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_small_writes_are_batched() {
        let mem = Arc::new(MemorySink::default());
        let sink = BufferedSink::new(mem.clone(), 16);

        sink.write(b"abc").unwrap();
        sink.write(b"def").unwrap();
        assert_eq!(mem.write_calls(), 0);
        assert_eq!(sink.buffered(), 6);

        sink.sync().unwrap();
        assert_eq!(mem.bytes(), b"abcdef");
        assert_eq!(mem.write_calls(), 1);
        assert_eq!(mem.syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_that_does_not_fit_flushes_first() {
        let mem = Arc::new(MemorySink::default());
        let sink = BufferedSink::new(mem.clone(), 8);

        sink.write(b"12345").unwrap();
        sink.write(b"6789").unwrap();

        // The second payload is never split across two writes.
        assert_eq!(*mem.writes.lock(), vec![b"12345".to_vec()]);
        assert_eq!(sink.buffered(), 4);
    }

    #[test]
    fn test_oversized_payload_goes_straight_through() {
        let mem = Arc::new(MemorySink::default());
        let sink = BufferedSink::new(mem.clone(), 4);

        sink.write(b"ab").unwrap();
        sink.write(b"0123456789").unwrap();

        assert_eq!(*mem.writes.lock(), vec![b"ab".to_vec(), b"0123456789".to_vec()]);
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn test_random_writes_preserve_bytes() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let capacity = rng.gen_range(1..64);
            let mem = Arc::new(MemorySink::default());
            let sink = BufferedSink::new(mem.clone(), capacity);
            let mut expected = Vec::new();

            for _ in 0..rng.gen_range(1..40) {
                let len = rng.gen_range(0..(capacity * 2));
                let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                sink.write(&payload).unwrap();
                expected.extend_from_slice(&payload);
                assert!(sink.buffered() <= capacity);
            }
            sink.sync().unwrap();

            assert_eq!(mem.bytes(), expected);
        }
    }

    #[test]
    fn test_destination_error_is_returned() {
        let mem = Arc::new(MemorySink::default());
        let sink = BufferedSink::new(mem.clone(), 8);
        sink.write(b"abc").unwrap();

        mem.fail.store(true, Ordering::SeqCst);
        let err = sink.sync().unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(sink.buffered(), 3);

        mem.fail.store(false, Ordering::SeqCst);
        sink.sync().unwrap();
        assert_eq!(mem.bytes(), b"abc");
    }

    #[test]
    fn test_wrapping_twice_is_identity() {
        let mem = Arc::new(MemorySink::default());
        let (once, close) = buffer(mem, 32, Duration::from_secs(1));
        let (twice, noop) = buffer(Arc::clone(&once), 64, Duration::from_secs(5));

        assert!(Arc::ptr_eq(&once, &twice));
        noop.close().unwrap();
        close.close().unwrap();
    }

    #[tokio::test]
    async fn test_timer_flushes_and_close_syncs() {
        let mem = Arc::new(MemorySink::default());
        let (sink, close) = buffer(mem.clone(), 1024, Duration::from_millis(20));

        sink.write(b"tick").unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(mem.bytes(), b"tick");

        sink.write(b"tock").unwrap();
        close.close().unwrap();
        assert_eq!(mem.bytes(), b"ticktock");
    }
}
