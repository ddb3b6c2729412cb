//! Audio sources: one ingress stream plus the buffer the mixer drains.
//!
//! A source is filled in one of two ways, selected by [`FillMode`]:
//!
//! - `Direct`: the mixer thread reads the ingress stream itself on every
//!   tick. No extra thread or copy, but a read that blocks stalls the whole
//!   mixer and every other source with it.
//! - `Background`: a dedicated filler thread keeps the buffer topped up and
//!   parks on a condition variable while the buffer is full. The mixer
//!   never blocks on the ingress stream.
//!
//! Both variants share one buffer layout: valid bytes always start at
//! offset 0, and draining shifts the residual bytes down.

use super::atomic::AtomicF32;
use super::error::{Completion, Error, Result};
use super::format::FRAME_BYTES;
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A readable PCM ingress stream.
pub(crate) type Ingress = Box<dyn Read + Send>;

pub(crate) type CompletionRx = oneshot::Receiver<Result<Completion>>;
type CompletionTx = oneshot::Sender<Result<Completion>>;

/// Gains closer than this to 1.0 skip the per-sample multiply.
const UNITY_EPSILON: f32 = 0.01;

/// Selects how a source pulls bytes from its ingress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Read synchronously on the mixer thread.
    ///
    /// Only suitable for streams that always produce data promptly, such as
    /// local files or already-buffered pipes.
    #[default]
    Direct,
    /// Read on a dedicated filler thread with backpressure.
    ///
    /// Use this for anything that might stall: network streams, transcoder
    /// pipes, slow disks.
    Background,
}

/// Wakes the mixer loop out of its idle wait when new data arrives.
///
/// The pending flag keeps a notification that lands before the loop starts
/// waiting from being lost.
pub(crate) struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Waits for a notification, at most `timeout`.
    pub fn wait(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

/// Fixed-capacity byte buffer; `data[..len]` holds the valid bytes.
struct SourceBuffer {
    data: Vec<u8>,
    len: usize,
}

impl SourceBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            len: 0,
        }
    }

    fn free(&self) -> usize {
        self.data.len() - self.len
    }

    fn append(&mut self, bytes: &[u8]) {
        let end = self.len + bytes.len();
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
    }

    fn drain(&mut self, n: usize) {
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

/// One playing stream inside the mixer.
pub(crate) struct AudioSource {
    mode: FillMode,
    capacity: usize,

    buf: Mutex<SourceBuffer>,
    /// Signaled whenever the mixer drains bytes, or the source terminates.
    drained: Condvar,

    /// `None` once released, or while a filler thread owns the stream.
    ingress: Mutex<Option<Ingress>>,
    completion: Mutex<Option<CompletionTx>>,

    gain: AtomicF32,
    done: AtomicBool,
    canceled: AtomicBool,
    filler_started: AtomicBool,
    consumed: AtomicU64,

    wakeup: Arc<Wakeup>,
}

impl AudioSource {
    /// Creates a source with a buffer of `capacity` bytes.
    ///
    /// `capacity` must be a positive multiple of [`FRAME_BYTES`] so a full
    /// buffer always holds whole frames.
    pub fn new(
        ingress: Ingress,
        mode: FillMode,
        capacity: usize,
        wakeup: Arc<Wakeup>,
    ) -> (Arc<Self>, CompletionRx) {
        debug_assert!(capacity > 0 && capacity % FRAME_BYTES == 0);
        let (tx, rx) = oneshot::channel();
        let source = Arc::new(Self {
            mode,
            capacity,
            buf: Mutex::new(SourceBuffer::new(capacity)),
            drained: Condvar::new(),
            ingress: Mutex::new(Some(ingress)),
            completion: Mutex::new(Some(tx)),
            gain: AtomicF32::new(1.0),
            done: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            filler_started: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
            wakeup,
        });
        (source, rx)
    }

    pub fn mode(&self) -> FillMode {
        self.mode
    }

    pub fn gain(&self) -> f32 {
        self.gain.load(Ordering::Relaxed)
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain, Ordering::Relaxed);
    }

    /// Returns true once the source reached end-of-stream, failed, or was
    /// canceled. Buffered bytes may still be waiting to be mixed.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Total bytes mixed out of this source so far. Always whole frames.
    pub fn bytes_processed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Pulls more data from the ingress stream.
    ///
    /// For `Direct` sources this reads on the calling thread and may block.
    /// For `Background` sources the first call starts the filler thread and
    /// every call returns immediately.
    pub fn fill(self: &Arc<Self>) {
        if self.is_done() {
            // A cancel that raced a direct read could not take the stream.
            if self.is_canceled() {
                self.ingress.lock().take();
            }
            return;
        }
        match self.mode {
            FillMode::Direct => self.fill_direct(),
            FillMode::Background => self.start_filler(),
        }
    }

    fn fill_direct(&self) {
        let mut ingress = self.ingress.lock();
        let Some(reader) = ingress.as_mut() else {
            return;
        };

        let mut buf = self.buf.lock();
        let free = buf.free();
        if free == 0 {
            return;
        }

        let buf = &mut *buf;
        let start = buf.len;
        match reader.read(&mut buf.data[start..start + free]) {
            Ok(0) => {
                ingress.take();
                self.finish(Ok(Completion::Finished));
            }
            Ok(n) => buf.len += n.min(free),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("pcm source: ingress read failed: {}", e);
                ingress.take();
                self.finish(Err(Error::Ingress(Arc::new(e))));
            }
        }

        // Canceled while the read was in flight.
        if self.is_canceled() {
            buf.len = 0;
            ingress.take();
        }
    }

    fn start_filler(self: &Arc<Self>) {
        if self.filler_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(reader) = self.ingress.lock().take() else {
            return;
        };

        let source = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("pcm-filler".to_string())
            .spawn(move || source.fill_loop(reader));
        if let Err(e) = spawned {
            warn!("pcm source: cannot start filler: {}", e);
            self.finish(Err(Error::Spawn {
                what: "filler",
                source: Arc::new(e),
            }));
        }
    }

    /// Body of the background filler thread. Owns the ingress stream and
    /// drops it on exit.
    fn fill_loop(self: Arc<Self>, mut reader: Ingress) {
        debug!("pcm filler started");
        // Reads land here first so the buffer lock is never held across a
        // potentially slow read.
        let mut scratch = vec![0u8; self.capacity];

        loop {
            let space = {
                let mut buf = self.buf.lock();
                loop {
                    if self.is_done() {
                        debug!("pcm filler stopped");
                        return;
                    }
                    let free = buf.free();
                    if free > 0 {
                        break free;
                    }
                    self.drained.wait(&mut buf);
                }
            };

            match reader.read(&mut scratch[..space]) {
                Ok(0) => {
                    self.finish(Ok(Completion::Finished));
                    break;
                }
                Ok(n) => {
                    let mut buf = self.buf.lock();
                    if self.is_canceled() {
                        break;
                    }
                    // The mixer only ever frees space, so `space` still fits.
                    buf.append(&scratch[..n.min(space)]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("pcm source: ingress read failed: {}", e);
                    self.finish(Err(Error::Ingress(Arc::new(e))));
                    break;
                }
            }
            self.wakeup.notify();
        }

        self.wakeup.notify();
        debug!("pcm filler stopped");
    }

    /// Returns how many bytes are ready to mix.
    ///
    /// Once the source is done a trailing partial frame can never complete,
    /// so it is dropped here to let the source drain and be removed.
    pub fn available(&self) -> usize {
        let mut buf = self.buf.lock();
        if self.is_canceled() {
            buf.len = 0;
        } else if self.is_done() {
            buf.len -= buf.len % FRAME_BYTES;
        }
        buf.len
    }

    /// Adds the first `n` buffered bytes into `acc` as 16-bit samples scaled
    /// by this source's gain, then drains them from the buffer.
    ///
    /// `acc` must hold `n / 2` samples. Returns false, contributing nothing,
    /// if the source was canceled since `available` was called.
    pub fn mix_into(&self, acc: &mut [f32], n: usize) -> bool {
        let mut buf = self.buf.lock();
        if self.is_canceled() {
            buf.len = 0;
            return false;
        }
        if buf.len < n {
            return false;
        }

        let gain = self.gain();
        let samples = buf.data[..n]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32);
        if (1.0 - gain).abs() < UNITY_EPSILON {
            for (a, s) in acc.iter_mut().zip(samples) {
                *a += s;
            }
        } else {
            for (a, s) in acc.iter_mut().zip(samples) {
                *a += s * gain;
            }
        }

        buf.drain(n);
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        self.drained.notify_one();
        true
    }

    /// Cancels the source: discards buffered bytes, releases the ingress
    /// stream and resolves the completion with `Canceled`.
    ///
    /// A no-op if the source is already done.
    pub fn cancel(&self) {
        if self.is_done() {
            return;
        }
        debug!("pcm source canceled");
        self.terminate(Ok(Completion::Canceled));
    }

    /// Terminates the source with `err`, even if it already reached
    /// end-of-stream. Used when the mixer itself stops on a failure.
    pub fn fail(&self, err: Error) {
        self.terminate(Err(err));
    }

    /// Like [`cancel`](Self::cancel), but also discards the tail of a
    /// source that already reached end-of-stream.
    pub fn discard(&self) {
        self.terminate(Ok(Completion::Canceled));
    }

    fn terminate(&self, result: Result<Completion>) {
        self.canceled.store(true, Ordering::Release);
        self.finish(result);

        // A direct read may be in flight on the mixer thread; if so the
        // stream is released right after that read returns.
        if let Some(mut ingress) = self.ingress.try_lock() {
            ingress.take();
        }
        if self.mode == FillMode::Background {
            let mut buf = self.buf.lock();
            buf.len = 0;
            self.drained.notify_all();
        }
        self.wakeup.notify();
    }

    /// Marks the source done and resolves its completion. Only the first
    /// resolution is delivered.
    fn finish(&self, result: Result<Completion>) {
        self.done.store(true, Ordering::Release);
        if let Some(tx) = self.completion.lock().take() {
            // The handle may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        }
    }
}
