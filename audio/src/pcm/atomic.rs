//! Atomic gain storage.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be read and replaced from any thread.
///
/// Gains are stored this way so callers can change them while the mixer
/// loop is running; the loop picks up the new value on its next tick.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    /// Creates a new AtomicF32 with the given initial value.
    pub fn new(val: f32) -> Self {
        Self {
            bits: AtomicU32::new(val.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, val: f32, ordering: Ordering) {
        self.bits.store(val.to_bits(), ordering);
    }
}

impl Default for AtomicF32 {
    /// Unity gain.
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32() {
        let af = AtomicF32::new(1.5);
        assert_eq!(af.load(Ordering::Relaxed), 1.5);

        af.store(-0.25, Ordering::Relaxed);
        assert_eq!(af.load(Ordering::Relaxed), -0.25);
    }

    #[test]
    fn test_default_is_unity() {
        assert_eq!(AtomicF32::default().load(Ordering::Relaxed), 1.0);
    }
}
