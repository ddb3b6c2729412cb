//! PCM audio format definitions.

use std::time::Duration;

/// Bytes in one 16-bit stereo sample frame (2 channels x 2 bytes).
pub const FRAME_BYTES: usize = 4;

/// Describes a 16-bit signed little-endian PCM layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// True for stereo (2 channels), false for mono (1 channel).
    pub stereo: bool,
}

impl Format {
    /// 48kHz stereo, the layout voice transports expect and the mixer uses.
    pub const STEREO_48K: Format = Format::stereo(48000);

    /// Creates a stereo format with the given sample rate.
    pub const fn stereo(sample_rate: u32) -> Self {
        Self { sample_rate, stereo: true }
    }

    /// Returns the number of channels (1 for mono, 2 for stereo).
    pub fn channels(&self) -> u32 {
        if self.stereo { 2 } else { 1 }
    }

    /// Returns the number of bytes per sample frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels() as usize * 2
    }

    /// Returns the number of bytes per second.
    pub fn bytes_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Returns the number of bytes needed to hold `duration` of audio,
    /// rounded down to whole frames.
    pub fn bytes_in_duration(&self, duration: Duration) -> u64 {
        let frames = self.sample_rate as u128 * duration.as_micros() / 1_000_000;
        frames as u64 * self.frame_bytes() as u64
    }

    /// Returns the playback duration of `bytes` of audio.
    pub fn duration(&self, bytes: u64) -> Duration {
        let frames = self.samples(bytes);
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }

    /// Returns the number of whole sample frames in `bytes`.
    pub fn samples(&self, bytes: u64) -> u64 {
        bytes / self.frame_bytes() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_48k() {
        let fmt = Format::STEREO_48K;
        assert_eq!(fmt.sample_rate, 48000);
        assert_eq!(fmt.channels(), 2);
        assert_eq!(fmt.frame_bytes(), FRAME_BYTES);
        // 48000 frames * 4 bytes
        assert_eq!(fmt.bytes_rate(), 192_000);
    }

    #[test]
    fn test_bytes_in_duration() {
        let fmt = Format::STEREO_48K;
        assert_eq!(fmt.bytes_in_duration(Duration::from_secs(1)), 192_000);
        // 1920 bytes per 10ms, the usual voice packet size
        assert_eq!(fmt.bytes_in_duration(Duration::from_millis(10)), 1920);
        assert_eq!(fmt.bytes_in_duration(Duration::ZERO), 0);
    }

    #[test]
    fn test_duration_and_samples() {
        let fmt = Format::STEREO_48K;
        assert_eq!(fmt.samples(192_000), 48_000);
        assert_eq!(fmt.samples(7), 1);
        assert_eq!(fmt.duration(192_000), Duration::from_secs(1));
        assert_eq!(fmt.duration(1920), Duration::from_millis(10));
    }
}
