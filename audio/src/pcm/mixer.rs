//! Multi-source real-time PCM mixer.
//!
//! The mixer owns an egress sink and a set of active sources. While at
//! least one source is active a dedicated thread runs the mixing loop;
//! each tick it:
//!
//! 1. re-snapshots the source set if it changed since the last tick,
//! 2. fills every source and keeps those holding whole stereo frames,
//! 3. mixes the smallest amount any ready source offers, so every
//!    contributing source drains exactly what it had,
//! 4. sums the sources into a float accumulator, scales by the mixer gain,
//!    clips to the 16-bit range and writes the result to the egress sink.
//!
//! Sources that are done and fully drained are dropped from the set. When
//! the set becomes empty the thread exits; adding a source starts it again.

use super::atomic::AtomicF32;
use super::error::{Error, Result};
use super::format::{FRAME_BYTES, Format};
use super::handle::MixerHandle;
use super::source::{AudioSource, FillMode, Wakeup};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Options for configuring a Mixer.
#[derive(Debug, Clone)]
pub struct MixerOptions {
    /// Largest amount of audio mixed in one tick. Also the buffer capacity
    /// of every source.
    pub buffer_duration: Duration,
    /// Longest pause while no source has data ready.
    pub idle_delay: Duration,
    /// Mixer-wide linear gain applied before clipping.
    pub gain: f32,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self {
            buffer_duration: Duration::from_secs(1),
            idle_delay: Duration::from_millis(10),
            gain: 1.0,
        }
    }
}

impl MixerOptions {
    /// Sets the tick budget and source buffer size.
    pub fn with_buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    /// Sets the idle wait bound.
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Sets the initial mixer gain.
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Returns the tick budget in bytes, at least one frame.
    pub fn buffer_bytes(&self) -> usize {
        let bytes = Format::STEREO_48K.bytes_in_duration(self.buffer_duration) as usize;
        bytes.max(FRAME_BYTES)
    }
}

/// Authoritative source set, guarded by one lock.
struct SourceSet {
    list: Vec<Arc<AudioSource>>,
    /// True while a loop thread owns the mixing work.
    running: bool,
    closed: bool,
}

/// State only the loop thread touches.
struct Engine {
    egress: Box<dyn Write + Send>,
    acc: Vec<f32>,
    out: Vec<u8>,
}

impl Engine {
    fn new(egress: Box<dyn Write + Send>, buffer_bytes: usize) -> Self {
        Self {
            egress,
            acc: vec![0.0; buffer_bytes / 2],
            out: vec![0u8; buffer_bytes],
        }
    }

    /// Mixes `n` bytes from every working source and writes them out.
    fn mix(&mut self, working: &[Arc<AudioSource>], n: usize, gain: f32) -> Result<()> {
        let acc = &mut self.acc[..n / 2];
        acc.fill(0.0);
        for source in working {
            source.mix_into(acc, n);
        }

        for (out, &sum) in self.out[..n].chunks_exact_mut(2).zip(acc.iter()) {
            // Saturate; a wrapped sample is a loud click.
            let sample = (sum * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            out.copy_from_slice(&sample.to_le_bytes());
        }

        self.egress
            .write_all(&self.out[..n])
            .map_err(|e| Error::Egress(Arc::new(e)))
    }
}

/// What the loop should do after inspecting its sources.
enum Step {
    Mix(usize),
    Idle,
    Retry,
    Stop,
}

/// A real-time mixer of 48kHz 16-bit stereo PCM streams.
///
/// Create it with [`Mixer::new`], then add sources with
/// [`add_source`](Mixer::add_source). Mixed audio is written to the egress
/// sink as fast as sources provide it; pacing is up to the sink.
pub struct Mixer {
    sources: Mutex<SourceSet>,
    /// Set whenever the source set changes; the loop re-snapshots then.
    stale: AtomicBool,
    engine: Mutex<Engine>,
    thread: Mutex<Option<JoinHandle<Result<()>>>>,
    wakeup: Arc<Wakeup>,
    gain: AtomicF32,
    buffer_bytes: usize,
    idle_delay: Duration,
}

impl Mixer {
    /// Creates a mixer writing to `egress`. No thread runs until the first
    /// source is added.
    pub fn new<W: Write + Send + 'static>(egress: W, opts: MixerOptions) -> Arc<Self> {
        let buffer_bytes = opts.buffer_bytes();
        Arc::new(Self {
            sources: Mutex::new(SourceSet {
                list: Vec::new(),
                running: false,
                closed: false,
            }),
            stale: AtomicBool::new(false),
            engine: Mutex::new(Engine::new(Box::new(egress), buffer_bytes)),
            thread: Mutex::new(None),
            wakeup: Arc::new(Wakeup::new()),
            gain: AtomicF32::new(opts.gain),
            buffer_bytes,
            idle_delay: opts.idle_delay,
        })
    }

    /// Returns the PCM format the mixer consumes and produces.
    pub fn format(&self) -> Format {
        Format::STEREO_48K
    }

    /// Returns the tick budget in bytes.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Returns the mixer-wide gain.
    pub fn gain(&self) -> f32 {
        self.gain.load(Ordering::Relaxed)
    }

    /// Sets the mixer-wide gain, applied from the next tick.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain, Ordering::Relaxed);
    }

    /// Returns the number of sources still in the active set.
    pub fn source_count(&self) -> usize {
        self.sources.lock().list.len()
    }

    /// Returns true while the mixing thread is running.
    pub fn is_running(&self) -> bool {
        self.sources.lock().running
    }

    /// Adds a PCM stream to the mix and starts the mixing thread if needed.
    ///
    /// `ingress` must produce interleaved 16-bit little-endian stereo
    /// samples at 48kHz. See [`FillMode`] for choosing how it is read.
    pub fn add_source<R: Read + Send + 'static>(
        self: &Arc<Self>,
        ingress: R,
        mode: FillMode,
    ) -> Result<MixerHandle> {
        let (source, done) =
            AudioSource::new(Box::new(ingress), mode, self.buffer_bytes, self.wakeup.clone());

        let mut set = self.sources.lock();
        if set.closed {
            return Err(Error::Closed);
        }
        if !set.running {
            self.spawn_loop()?;
            set.running = true;
        }
        set.list.push(source.clone());
        self.stale.store(true, Ordering::Release);
        let count = set.list.len();
        drop(set);

        self.wakeup.notify();
        debug!("pcm mixer: added {:?} source ({} active)", mode, count);
        Ok(MixerHandle::new(source, done))
    }

    /// Waits for the mixing thread to stop on its own, which happens once
    /// every source has finished and drained.
    ///
    /// Returns the egress error if that is what stopped it.
    pub fn join(&self) -> Result<()> {
        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => handle.join().unwrap_or(Err(Error::Panicked)),
            None => Ok(()),
        }
    }

    /// Shuts the mixer down regardless of what is playing.
    ///
    /// Every source is canceled and its unmixed audio discarded, the mixing
    /// thread is stopped and joined, and later `add_source` calls fail with
    /// [`Error::Closed`]. Closing twice is harmless.
    pub fn close(&self) -> Result<()> {
        let sources = {
            let mut set = self.sources.lock();
            set.closed = true;
            self.stale.store(true, Ordering::Release);
            set.list.clone()
        };
        for source in &sources {
            source.discard();
        }
        self.wakeup.notify();
        debug!("pcm mixer: closed with {} active sources", sources.len());
        self.join()
    }

    fn spawn_loop(self: &Arc<Self>) -> Result<()> {
        let mixer = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("pcm-mixer".to_string())
            .spawn(move || mixer.run())
            .map_err(|e| Error::Spawn {
                what: "mixer",
                source: Arc::new(e),
            })?;
        // A replaced handle belongs to a loop that has already given up
        // the running flag and is only finishing its exit path.
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Body of the mixing thread.
    fn run(&self) -> Result<()> {
        // Held for the whole run; a loop started right after this one stopped
        // waits here until the previous thread has flushed and exited.
        let mut engine = self.engine.lock();
        debug!("pcm mixer: loop started");

        let mut local: Vec<Arc<AudioSource>> = Vec::new();
        let mut working: Vec<Arc<AudioSource>> = Vec::new();
        let mut ticks: u64 = 0;
        let mut mixed: u64 = 0;

        let result = loop {
            if self.stale.load(Ordering::Acquire) {
                self.snapshot(&mut local);
            }

            match self.select(&mut local, &mut working) {
                Step::Mix(n) => {
                    if let Err(e) = engine.mix(&working, n, self.gain()) {
                        break Err(e);
                    }
                    ticks += 1;
                    mixed += n as u64;
                }
                Step::Idle => self.wakeup.wait(self.idle_delay),
                Step::Retry => {}
                Step::Stop => break Ok(()),
            }
        };
        working.clear();

        if let Err(err) = &result {
            error!("pcm mixer: {}; stopping", err);
            self.abort(err);
        }
        if let Err(e) = engine.egress.flush() {
            warn!("pcm mixer: egress flush failed: {}", e);
        }

        debug!("pcm mixer: loop stopped after {} ticks, {} bytes", ticks, mixed);
        result
    }

    fn snapshot(&self, local: &mut Vec<Arc<AudioSource>>) {
        let set = self.sources.lock();
        local.clear();
        local.extend(set.list.iter().cloned());
        self.stale.store(false, Ordering::Release);
    }

    /// Fills every source, collects the ready ones into `working` and
    /// removes the exhausted ones.
    fn select(
        &self,
        local: &mut Vec<Arc<AudioSource>>,
        working: &mut Vec<Arc<AudioSource>>,
    ) -> Step {
        working.clear();
        let mut bytes_to_mix = usize::MAX;
        let mut removed = false;

        local.retain(|source| {
            source.fill();
            let available = source.available();
            if available > 0 && available % FRAME_BYTES == 0 {
                bytes_to_mix = bytes_to_mix.min(available);
                working.push(source.clone());
                true
            } else if available == 0 && source.is_done() {
                self.remove(source);
                removed = true;
                false
            } else {
                true
            }
        });

        if !working.is_empty() {
            return Step::Mix(bytes_to_mix);
        }
        if local.iter().any(|s| !s.is_done()) {
            return Step::Idle;
        }
        if (removed || local.is_empty()) && self.stop_if_empty() {
            return Step::Stop;
        }
        Step::Retry
    }

    fn remove(&self, source: &Arc<AudioSource>) {
        let mut set = self.sources.lock();
        set.list.retain(|s| !Arc::ptr_eq(s, source));
        self.stale.store(true, Ordering::Release);
        debug!("pcm mixer: removed source ({} active)", set.list.len());
    }

    /// Gives up the running flag if no source is left. Decided under the
    /// set lock so a concurrent add either lands before this check or
    /// starts a fresh loop.
    fn stop_if_empty(&self) -> bool {
        let mut set = self.sources.lock();
        if set.list.is_empty() {
            set.running = false;
            true
        } else {
            false
        }
    }

    /// Fails every active source with `err` and empties the set.
    fn abort(&self, err: &Error) {
        let sources = {
            let mut set = self.sources.lock();
            set.running = false;
            self.stale.store(true, Ordering::Release);
            std::mem::take(&mut set.list)
        };
        for source in sources {
            source.fail(err.clone());
        }
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = self.sources.lock();
        f.debug_struct("Mixer")
            .field("sources", &set.list.len())
            .field("running", &set.running)
            .field("closed", &set.closed)
            .field("gain", &self.gain())
            .field("buffer_bytes", &self.buffer_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn filled(data: Vec<u8>, gain: f32) -> Arc<AudioSource> {
        let (source, _rx) = AudioSource::new(
            Box::new(Cursor::new(data)),
            FillMode::Direct,
            64,
            Arc::new(Wakeup::new()),
        );
        source.set_gain(gain);
        source.fill();
        source
    }

    #[test]
    fn test_options_buffer_bytes() {
        assert_eq!(MixerOptions::default().buffer_bytes(), 192_000);
        let opts = MixerOptions::default().with_buffer_duration(Duration::from_millis(20));
        assert_eq!(opts.buffer_bytes(), 3840);
        // Never below one frame.
        let opts = MixerOptions::default().with_buffer_duration(Duration::ZERO);
        assert_eq!(opts.buffer_bytes(), FRAME_BYTES);
    }

    #[test]
    fn test_engine_saturates_instead_of_wrapping() {
        let sink = Sink::default();
        let mut engine = Engine::new(Box::new(sink.clone()), 64);
        let a = filled(pcm(&[i16::MAX, i16::MIN, 20000, -20000]), 1.0);
        let b = filled(pcm(&[i16::MAX, i16::MIN, 20000, -20000]), 1.0);

        engine.mix(&[a, b], 8, 1.0).unwrap();
        assert_eq!(
            samples(&sink.0.lock()),
            vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN]
        );
    }

    #[test]
    fn test_engine_opposite_phase_cancels() {
        let sink = Sink::default();
        let mut engine = Engine::new(Box::new(sink.clone()), 64);
        let a = filled(pcm(&[i16::MAX, -i16::MAX, 1234, -1234]), 1.0);
        let b = filled(pcm(&[-i16::MAX, i16::MAX, -1234, 1234]), 1.0);

        engine.mix(&[a, b], 8, 1.0).unwrap();
        assert_eq!(samples(&sink.0.lock()), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_engine_gain_truncates_toward_zero() {
        let sink = Sink::default();
        let mut engine = Engine::new(Box::new(sink.clone()), 64);
        let a = filled(pcm(&[3, -3, 1001, -1001]), 1.0);

        engine.mix(&[a], 8, 0.5).unwrap();
        assert_eq!(samples(&sink.0.lock()), vec![1, -1, 500, -500]);
    }

    #[test]
    fn test_engine_source_and_mixer_gain() {
        let sink = Sink::default();
        let mut engine = Engine::new(Box::new(sink.clone()), 64);
        let a = filled(pcm(&[1000, 1000]), 0.5);
        let b = filled(pcm(&[1000, -1000]), 2.0);

        engine.mix(&[a, b], 4, 0.5).unwrap();
        // (500 + 2000) * 0.5, (500 - 2000) * 0.5
        assert_eq!(samples(&sink.0.lock()), vec![1250, -750]);
    }

    #[test]
    fn test_engine_egress_error() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("voice socket closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut engine = Engine::new(Box::new(Broken), 64);
        let a = filled(pcm(&[1, 2]), 1.0);
        match engine.mix(&[a], 4, 1.0) {
            Err(Error::Egress(e)) => assert_eq!(e.to_string(), "voice socket closed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_new_mixer_is_idle() {
        let mixer = Mixer::new(Sink::default(), MixerOptions::default());
        assert!(!mixer.is_running());
        assert_eq!(mixer.source_count(), 0);
        assert_eq!(mixer.format(), Format::STEREO_48K);
        assert!(mixer.join().is_ok());
    }
}
