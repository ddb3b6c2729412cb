//! Egress adapters.

use super::atomic::AtomicF32;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Wraps an egress sink and applies a linear gain to every 16-bit sample
/// written through it, clipping to the sample range.
///
/// Writes may split a sample across calls; the odd byte is held back and
/// joined with the next write.
pub struct GainWriter<W: Write> {
    inner: W,
    gain: Arc<AtomicF32>,
    carry: Option<u8>,
    scratch: Vec<u8>,
}

impl<W: Write> GainWriter<W> {
    /// Creates a writer with unity gain.
    pub fn new(inner: W) -> Self {
        Self::with_gain(inner, Arc::new(AtomicF32::new(1.0)))
    }

    /// Creates a writer whose gain is shared with the caller, so it can be
    /// changed after the writer was handed to a mixer.
    pub fn with_gain(inner: W, gain: Arc<AtomicF32>) -> Self {
        Self {
            inner,
            gain,
            carry: None,
            scratch: Vec::new(),
        }
    }

    /// Returns the shared gain.
    pub fn gain(&self) -> Arc<AtomicF32> {
        self.gain.clone()
    }

    /// Unwraps the writer, dropping a held-back odd byte.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for GainWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.scratch.clear();
        self.scratch.extend(self.carry);
        self.scratch.extend_from_slice(buf);
        let carry = if self.scratch.len() % 2 == 1 {
            self.scratch.pop()
        } else {
            None
        };

        let gain = self.gain.load(Ordering::Relaxed);
        for pair in self.scratch.chunks_exact_mut(2) {
            let s = i16::from_le_bytes([pair[0], pair[1]]) as f32 * gain;
            let s = s.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            pair.copy_from_slice(&s.to_le_bytes());
        }

        // A failed write leaves the held byte in place for a retry.
        self.inner.write_all(&self.scratch)?;
        self.carry = carry;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
