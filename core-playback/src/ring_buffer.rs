//! # Prefetch Ring Buffer
//!
//! Hides byte source latency from the decode path. A dedicated prefetch
//! thread owns the [`ByteSource`] and keeps a fixed-size byte ring topped up;
//! the decode thread drains it without ever blocking.
//!
//! ## Design
//!
//! - **Metadata lock**: `write_pos`, `read_pos`, `filled`, the EOF/error flags
//!   and the seek generation live behind one `parking_lot::Mutex`, held only
//!   for counter updates.
//! - **Data lock**: the byte arena has its own lock, held only for the copy
//!   in or out. Neither lock is held across a `ByteSource` call.
//! - **Seek generation**: `seek` bumps a generation counter and clears the
//!   ring. A chunk read under an older generation is dropped when the
//!   producer tries to publish it, so no pre-seek byte is observed after a
//!   seek returns.
//! - **Sticky errors**: a failed source read or seek is recorded once; the
//!   ring keeps draining buffered bytes and then reports exhaustion.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::ring_buffer::{PrefetchRingBuffer, PrefetchOptions};
//!
//! let mut ring = PrefetchRingBuffer::start(source, PrefetchOptions::default(), 0)?;
//! let mut buf = [0u8; 4096];
//! let n = ring.read(&mut buf); // 0 when nothing is buffered yet
//! ```

use bridge_traits::source::ByteSource;
use parking_lot::{Condvar, Mutex};
use std::io::SeekFrom;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};

/// Sizing and pacing of the prefetch thread.
#[derive(Debug, Clone)]
pub struct PrefetchOptions {
    /// Ring capacity in bytes.
    pub capacity: usize,
    /// Bytes requested per `ByteSource::read`.
    pub chunk_size: usize,
    /// Park time when there is nothing to do.
    pub idle_wait: Duration,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PrefetchOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capacity: config.ring_capacity_bytes,
            chunk_size: config.read_chunk_bytes,
            idle_wait: config.prefetch_idle_wait,
        }
    }
}

/// A failed source read or seek recorded by the prefetch thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Source offset of the operation that failed.
    pub offset: u64,
    pub message: String,
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug, Default)]
struct RingMeta {
    read_pos: usize,
    write_pos: usize,
    filled: usize,
    generation: u64,
    pending_seek: Option<u64>,
    source_eof: bool,
    read_error: Option<SourceFailure>,
    bytes_prefetched: u64,
}

struct Shared {
    meta: Mutex<RingMeta>,
    data: Mutex<Box<[u8]>>,
    capacity: usize,
    /// Producer parks here when the ring is full or the source is done.
    space_available: Condvar,
    /// `init` parks here while probing an empty ring.
    data_available: Condvar,
}

impl Shared {
    /// Copy `chunk` into the arena at `write_pos` and publish it if no seek
    /// happened since `generation` was sampled.
    fn publish(&self, generation: u64, write_pos: usize, chunk: &[u8]) -> bool {
        {
            let mut data = self.data.lock();
            let first = chunk.len().min(self.capacity - write_pos);
            data[write_pos..write_pos + first].copy_from_slice(&chunk[..first]);
            data[..chunk.len() - first].copy_from_slice(&chunk[first..]);
        }

        let mut meta = self.meta.lock();
        if meta.generation != generation {
            return false;
        }
        meta.write_pos = (write_pos + chunk.len()) % self.capacity;
        meta.filled += chunk.len();
        meta.bytes_prefetched += chunk.len() as u64;
        drop(meta);

        self.data_available.notify_all();
        true
    }

    fn mark_eof(&self, generation: u64) {
        let mut meta = self.meta.lock();
        if meta.generation == generation {
            meta.source_eof = true;
        }
        drop(meta);
        self.data_available.notify_all();
    }

    fn fail(&self, generation: u64, failure: SourceFailure) {
        let mut meta = self.meta.lock();
        if meta.generation == generation && meta.read_error.is_none() {
            error!(
                offset = failure.offset,
                error = %failure.message,
                "Byte source failed, draining buffered bytes"
            );
            meta.read_error = Some(failure);
        }
        drop(meta);
        self.data_available.notify_all();
    }
}

// ============================================================================
// Prefetch Thread
// ============================================================================

struct PrefetchWorker {
    shared: Arc<Shared>,
    source: Box<dyn ByteSource>,
    cancel: CancellationToken,
    chunk_size: usize,
    idle_wait: Duration,
}

/// Work picked up by the producer under the metadata lock.
struct FillJob {
    generation: u64,
    write_pos: usize,
    want: usize,
    seek_to: Option<u64>,
}

impl PrefetchWorker {
    fn run(mut self) {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut source_pos = 0u64;
        debug!(source = %self.source.description(), "Prefetch thread started");

        while !self.cancel.is_cancelled() {
            let Some(job) = self.next_job() else {
                continue;
            };

            if let Some(offset) = job.seek_to {
                match self.source.seek(SeekFrom::Start(offset)) {
                    Ok(pos) => {
                        trace!(offset = pos, generation = job.generation, "Source repositioned");
                        source_pos = pos;
                    }
                    Err(err) => {
                        self.shared.fail(
                            job.generation,
                            SourceFailure {
                                offset,
                                message: err.to_string(),
                            },
                        );
                        continue;
                    }
                }
            }

            // No new reads once a stop has been requested.
            if self.cancel.is_cancelled() {
                break;
            }

            match self.source.read(&mut chunk[..job.want]) {
                Ok(0) => {
                    debug!(offset = source_pos, "Byte source reached end of data");
                    self.shared.mark_eof(job.generation);
                }
                Ok(n) => {
                    source_pos += n as u64;
                    if !self.shared.publish(job.generation, job.write_pos, &chunk[..n]) {
                        trace!(bytes = n, "Dropped chunk read before seek");
                    }
                }
                Err(err) => self.shared.fail(
                    job.generation,
                    SourceFailure {
                        offset: source_pos,
                        message: err.to_string(),
                    },
                ),
            }
        }

        if let Err(err) = self.source.close() {
            warn!(error = %err, "Failed to close byte source");
        }
        debug!("Prefetch thread stopped");
    }

    /// Sample the ring state. Parks and returns `None` when there is nothing
    /// to do.
    fn next_job(&self) -> Option<FillJob> {
        let mut meta = self.shared.meta.lock();
        let seek_to = meta.pending_seek.take();
        let free = self.shared.capacity - meta.filled;

        if seek_to.is_none() && (meta.source_eof || meta.read_error.is_some() || free == 0) {
            self.shared
                .space_available
                .wait_for(&mut meta, self.idle_wait);
            return None;
        }

        Some(FillJob {
            generation: meta.generation,
            write_pos: meta.write_pos,
            want: free.min(self.chunk_size),
            seek_to,
        })
    }
}

// ============================================================================
// Consumer Handle
// ============================================================================

/// Single-producer/single-consumer byte ring fed by a prefetch thread.
///
/// The handle is owned by the decode thread; consumer operations take
/// `&mut self` so there is exactly one reader.
pub struct PrefetchRingBuffer {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl PrefetchRingBuffer {
    /// Spawn the prefetch thread. Prefetching starts at `start_offset`.
    pub fn start(
        source: Box<dyn ByteSource>,
        options: PrefetchOptions,
        start_offset: u64,
    ) -> Result<Self> {
        if options.capacity == 0 || options.chunk_size == 0 {
            return Err(PlaybackError::InvalidConfig(
                "prefetch ring capacity and chunk size must be > 0".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            meta: Mutex::new(RingMeta {
                pending_seek: Some(start_offset),
                ..Default::default()
            }),
            data: Mutex::new(vec![0u8; options.capacity].into_boxed_slice()),
            capacity: options.capacity,
            space_available: Condvar::new(),
            data_available: Condvar::new(),
        });
        let cancel = CancellationToken::new();

        let worker = PrefetchWorker {
            shared: Arc::clone(&shared),
            source,
            cancel: cancel.clone(),
            chunk_size: options.chunk_size.min(options.capacity),
            idle_wait: options.idle_wait,
        };

        let handle = std::thread::Builder::new()
            .name("audio-prefetch".to_string())
            .spawn(move || worker.run())?;

        debug!(
            capacity = options.capacity,
            chunk_size = options.chunk_size,
            start_offset,
            "Started prefetch ring buffer"
        );

        Ok(Self {
            shared,
            cancel,
            worker: Some(handle),
        })
    }

    /// Copy up to `dst.len()` buffered bytes into `dst`.
    ///
    /// Never blocks. Returns 0 when the ring is empty; use
    /// [`is_exhausted`](Self::is_exhausted) to tell "not yet" from "never".
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let capacity = self.shared.capacity;
        let (read_pos, n) = {
            let meta = self.shared.meta.lock();
            (meta.read_pos, meta.filled.min(dst.len()))
        };
        if n == 0 {
            return 0;
        }

        {
            let data = self.shared.data.lock();
            let first = n.min(capacity - read_pos);
            dst[..first].copy_from_slice(&data[read_pos..read_pos + first]);
            dst[first..n].copy_from_slice(&data[..n - first]);
        }

        {
            let mut meta = self.shared.meta.lock();
            meta.read_pos = (read_pos + n) % capacity;
            meta.filled -= n;
        }
        self.shared.space_available.notify_one();
        n
    }

    /// Discard buffered bytes and restart prefetching at `offset`.
    ///
    /// Returns immediately; the prefetch thread repositions the source
    /// before its next read. Clears EOF and any recorded error.
    pub fn seek(&mut self, offset: u64) {
        {
            let mut meta = self.shared.meta.lock();
            meta.generation += 1;
            meta.read_pos = 0;
            meta.write_pos = 0;
            meta.filled = 0;
            meta.source_eof = false;
            meta.read_error = None;
            meta.pending_seek = Some(offset);
        }
        self.shared.space_available.notify_all();
        debug!(offset, "Prefetch ring invalidated for seek");
    }

    /// `true` once the source hit EOF or failed and every buffered byte has
    /// been read.
    pub fn is_exhausted(&self) -> bool {
        let meta = self.shared.meta.lock();
        meta.filled == 0 && (meta.source_eof || meta.read_error.is_some())
    }

    /// The sticky source failure, if any.
    pub fn read_error(&self) -> Option<SourceFailure> {
        self.shared.meta.lock().read_error.clone()
    }

    /// Wait up to `timeout` for bytes, EOF or an error. Used while probing.
    pub fn wait_for_data(&self, timeout: Duration) {
        let mut meta = self.shared.meta.lock();
        if meta.filled == 0 && !meta.source_eof && meta.read_error.is_none() {
            self.shared.data_available.wait_for(&mut meta, timeout);
        }
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.shared.meta.lock().filled
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffer fill fraction (0.0 - 1.0).
    pub fn fill_level(&self) -> f32 {
        self.available() as f32 / self.shared.capacity as f32
    }

    /// Total bytes published by the prefetch thread.
    pub fn bytes_prefetched(&self) -> u64 {
        self.shared.meta.lock().bytes_prefetched
    }

    /// Stop the prefetch thread and wait for it to exit. The thread closes
    /// the byte source on its way out. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.cancel.cancel();
        self.shared.space_available.notify_all();
        self.shared.data_available.notify_all();

        if handle.join().is_err() {
            error!("Prefetch thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for PrefetchRingBuffer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::source::MemorySource;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn small_options() -> PrefetchOptions {
        PrefetchOptions {
            capacity: 4096,
            chunk_size: 1000,
            idle_wait: Duration::from_millis(2),
        }
    }

    fn drain(ring: &mut PrefetchRingBuffer, step: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = Vec::new();
        let mut buf = vec![0u8; step];
        while Instant::now() < deadline {
            let n = ring.read(&mut buf);
            if n == 0 {
                if ring.is_exhausted() {
                    break;
                }
                ring.wait_for_data(Duration::from_millis(5));
                continue;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    /// Serves `good` bytes of pattern, then fails every read.
    struct FailingSource {
        inner: MemorySource,
        good: u64,
    }

    impl ByteSource for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
            let pos = self.inner.position();
            if pos >= self.good {
                return Err(BridgeError::OperationFailed("connection reset".to_string()));
            }
            let limit = buf.len().min((self.good - pos) as usize);
            self.inner.read(&mut buf[..limit])
        }

        fn seek(&mut self, pos: SeekFrom) -> BridgeResult<u64> {
            self.inner.seek(pos)
        }

        fn length(&self) -> Option<u64> {
            self.inner.length()
        }

        fn at_end(&self) -> bool {
            self.inner.at_end()
        }
    }

    /// Never returns data quickly; counts reads and records close.
    struct SlowSource {
        reads: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl ByteSource for SlowSource {
        fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            buf[0] = 0xAB;
            Ok(1)
        }

        fn seek(&mut self, pos: SeekFrom) -> BridgeResult<u64> {
            match pos {
                SeekFrom::Start(offset) => Ok(offset),
                _ => Ok(0),
            }
        }

        fn length(&self) -> Option<u64> {
            None
        }

        fn at_end(&self) -> bool {
            false
        }

        fn close(&mut self) -> BridgeResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_ring_buffer_fifo_across_threads() {
        let data = pattern(100_000);
        let source = MemorySource::new(data.clone());
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();

        // Odd read size so consumer and producer boundaries never line up.
        let out = drain(&mut ring, 733);
        assert_eq!(out.len(), data.len());
        assert!(out == data, "bytes reordered or duplicated");
        assert_eq!(ring.bytes_prefetched(), data.len() as u64);
    }

    #[test]
    fn test_ring_buffer_starts_at_offset() {
        let data = pattern(10_000);
        let source = MemorySource::new(data.clone());
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 9_000).unwrap();

        let out = drain(&mut ring, 512);
        assert_eq!(out, data[9_000..]);
    }

    #[test]
    fn test_ring_buffer_seek_discards_buffered_bytes() {
        let data = pattern(50_000);
        let source = MemorySource::new(data.clone());
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();

        // Let the producer fill the ring, consume a little.
        let mut buf = [0u8; 100];
        let deadline = Instant::now() + Duration::from_secs(5);
        while ring.available() < 1000 && Instant::now() < deadline {
            ring.wait_for_data(Duration::from_millis(5));
        }
        assert_eq!(ring.read(&mut buf), 100);
        assert_eq!(&buf[..], &data[..100]);

        ring.seek(30_000);
        assert_eq!(ring.available(), 0);

        let out = drain(&mut ring, 1024);
        assert_eq!(out, data[30_000..]);
    }

    #[test]
    fn test_ring_buffer_read_error_is_sticky_after_drain() {
        let source = FailingSource {
            inner: MemorySource::new(pattern(20_000)),
            good: 5_000,
        };
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();

        let out = drain(&mut ring, 256);
        assert_eq!(out, pattern(5_000));
        assert!(ring.is_exhausted());

        let failure = ring.read_error().expect("error recorded");
        assert_eq!(failure.offset, 5_000);
        assert!(failure.message.contains("connection reset"));

        // Still exhausted, still erroring, no data.
        let mut buf = [0u8; 16];
        assert_eq!(ring.read(&mut buf), 0);
        assert!(ring.read_error().is_some());
    }

    #[test]
    fn test_ring_buffer_seek_clears_error() {
        let source = FailingSource {
            inner: MemorySource::new(pattern(20_000)),
            good: 5_000,
        };
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();
        drain(&mut ring, 512);
        assert!(ring.read_error().is_some());

        ring.seek(100);
        assert!(ring.read_error().is_none());
        let out = drain(&mut ring, 512);
        assert_eq!(out, pattern(5_000)[100..]);
    }

    #[test]
    fn test_ring_buffer_read_never_blocks() {
        let reads = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let source = SlowSource {
            reads: Arc::clone(&reads),
            closed: Arc::clone(&closed),
        };
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();

        let started = Instant::now();
        let mut buf = [0u8; 64];
        let _ = ring.read(&mut buf);
        assert!(started.elapsed() < Duration::from_millis(15));
        assert!(!ring.is_exhausted());

        ring.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ring_buffer_stop_halts_reads() {
        let reads = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let source = SlowSource {
            reads: Arc::clone(&reads),
            closed: Arc::clone(&closed),
        };
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        ring.stop();
        assert!(!ring.is_running());
        let after_stop = reads.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(reads.load(Ordering::SeqCst), after_stop);

        // Idempotent
        ring.stop();
    }

    #[test]
    fn test_ring_buffer_invalid_options() {
        let options = PrefetchOptions {
            capacity: 0,
            ..small_options()
        };
        let result = PrefetchRingBuffer::start(Box::new(MemorySource::new(vec![1u8])), options, 0);
        assert!(matches!(result, Err(PlaybackError::InvalidConfig(_))));
    }

    #[test]
    fn test_ring_buffer_fill_level() {
        let source = MemorySource::new(pattern(3000));
        let mut ring = PrefetchRingBuffer::start(Box::new(source), small_options(), 0).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ring.available() < 3000 && Instant::now() < deadline {
            ring.wait_for_data(Duration::from_millis(5));
        }
        assert!((ring.fill_level() - 3000.0 / 4096.0).abs() < 0.001);
        assert_eq!(ring.capacity(), 4096);
        ring.stop();
    }
}
