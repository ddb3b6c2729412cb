//! External handles to sources playing in a [`Mixer`](super::Mixer).

use super::error::{Completion, Error, Result};
use super::format::Format;
use super::source::{AudioSource, CompletionRx, FillMode};
use std::sync::Arc;
use std::time::Duration;

/// Returned by [`Mixer::add_source`](super::Mixer::add_source).
///
/// Owns the source's completion signal. Only one party can await it; hand
/// out [`SourceCtrl`] clones to anyone else who needs to cancel or adjust
/// the source.
pub struct MixerHandle {
    ctrl: SourceCtrl,
    done: Option<CompletionRx>,
}

impl MixerHandle {
    pub(crate) fn new(source: Arc<AudioSource>, done: CompletionRx) -> Self {
        Self {
            ctrl: SourceCtrl { source },
            done: Some(done),
        }
    }

    /// Returns a controller for this source.
    pub fn ctrl(&self) -> SourceCtrl {
        self.ctrl.clone()
    }

    /// Cancels the source. See [`SourceCtrl::cancel`].
    pub fn cancel(&self) {
        self.ctrl.cancel();
    }

    /// Sets the source gain. See [`SourceCtrl::set_gain`].
    pub fn set_gain(&self, gain: f32) {
        self.ctrl.set_gain(gain);
    }

    /// Waits until the source finishes, fails, or is canceled.
    ///
    /// A natural end resolves as soon as the ingress stream reports
    /// end-of-stream; the last buffered bytes may still be mixing.
    /// Calling this again after it returned yields `Error::Abandoned`.
    pub async fn wait(&mut self) -> Result<Completion> {
        match self.done.take() {
            Some(rx) => rx.await.unwrap_or(Err(Error::Abandoned)),
            None => Err(Error::Abandoned),
        }
    }

    /// Blocking variant of [`wait`](Self::wait).
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait_blocking(&mut self) -> Result<Completion> {
        match self.done.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(Error::Abandoned)),
            None => Err(Error::Abandoned),
        }
    }
}

impl std::fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerHandle")
            .field("ctrl", &self.ctrl)
            .field("awaited", &self.done.is_none())
            .finish()
    }
}

/// Controller for one source in the mixer.
///
/// Carries no access to buffered audio. Cloning is cheap.
#[derive(Clone)]
pub struct SourceCtrl {
    source: Arc<AudioSource>,
}

impl SourceCtrl {
    /// Returns how this source is filled.
    pub fn mode(&self) -> FillMode {
        self.source.mode()
    }

    /// Returns the current linear gain of the source.
    pub fn gain(&self) -> f32 {
        self.source.gain()
    }

    /// Sets the linear gain of the source, applied from the next tick.
    ///
    /// 1.0 is unchanged, 0.0 is silence. No range is enforced; the mixed
    /// output is clipped at the end.
    pub fn set_gain(&self, gain: f32) {
        self.source.set_gain(gain);
    }

    /// Cancels the source immediately.
    ///
    /// Buffered but unmixed audio is discarded, the ingress stream is
    /// released, and the completion resolves with
    /// [`Completion::Canceled`]. Canceling a source that is already done
    /// does nothing.
    pub fn cancel(&self) {
        self.source.cancel();
    }

    /// Returns true once the source stopped reading its ingress stream.
    pub fn is_done(&self) -> bool {
        self.source.is_done()
    }

    /// Total bytes of this source mixed into the output so far.
    pub fn bytes_processed(&self) -> u64 {
        self.source.bytes_processed()
    }

    /// Number of stereo sample frames played so far.
    pub fn samples_played(&self) -> u64 {
        Format::STEREO_48K.samples(self.bytes_processed())
    }

    /// Playback position of the source.
    pub fn time_played(&self) -> Duration {
        Format::STEREO_48K.duration(self.bytes_processed())
    }
}

impl std::fmt::Debug for SourceCtrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCtrl")
            .field("mode", &self.mode())
            .field("gain", &self.gain())
            .field("done", &self.is_done())
            .field("bytes_processed", &self.bytes_processed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::source::Wakeup;
    use std::io::Cursor;

    fn handle(data: Vec<u8>) -> (Arc<AudioSource>, MixerHandle) {
        let (source, rx) = AudioSource::new(
            Box::new(Cursor::new(data)),
            FillMode::Direct,
            1920,
            Arc::new(Wakeup::new()),
        );
        (source.clone(), MixerHandle::new(source, rx))
    }

    #[tokio::test]
    async fn test_wait_canceled() {
        let (_source, mut handle) = handle(vec![0u8; 16]);
        let ctrl = handle.ctrl();
        ctrl.cancel();
        assert!(ctrl.is_done());
        assert_eq!(handle.wait().await.unwrap(), Completion::Canceled);

        // The signal resolves once.
        assert!(matches!(handle.wait().await, Err(Error::Abandoned)));
    }

    #[test]
    fn test_wait_blocking_finished() {
        let (source, mut handle) = handle(vec![0u8; 8]);
        source.fill();
        source.fill();
        assert_eq!(handle.wait_blocking().unwrap(), Completion::Finished);
    }

    #[test]
    fn test_abandoned_when_source_dropped() {
        let (orphan, done) = AudioSource::new(
            Box::new(Cursor::new(Vec::new())),
            FillMode::Direct,
            4,
            Arc::new(Wakeup::new()),
        );
        drop(orphan);

        let (source, _) = handle(Vec::new());
        let mut handle = MixerHandle {
            ctrl: SourceCtrl { source },
            done: Some(done),
        };
        assert!(matches!(handle.wait_blocking(), Err(Error::Abandoned)));
    }

    #[test]
    fn test_playback_position() {
        let (source, handle) = handle(vec![0u8; 1920]);
        source.fill();
        let mut acc = vec![0.0f32; 960];
        assert!(source.mix_into(&mut acc, 1920));

        let ctrl = handle.ctrl();
        assert_eq!(ctrl.bytes_processed(), 1920);
        assert_eq!(ctrl.samples_played(), 480);
        assert_eq!(ctrl.time_played(), Duration::from_millis(10));
    }

    #[test]
    fn test_gain_through_handle() {
        let (source, handle) = handle(Vec::new());
        handle.set_gain(0.25);
        assert_eq!(source.gain(), 0.25);
        assert_eq!(handle.ctrl().gain(), 0.25);
    }
}
