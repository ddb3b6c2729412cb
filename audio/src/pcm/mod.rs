//! PCM mixing engine.
//!
//! This module merges any number of concurrently playing 16-bit stereo
//! 48kHz PCM streams into a single output stream in real time.
//!
//! # Key Types
//!
//! - [`Mixer`]: owns the egress sink, the active sources and the mixing thread
//! - [`MixerHandle`]: per-source completion signal, returned by `add_source`
//! - [`SourceCtrl`]: cloneable cancel/gain/position control for one source
//! - [`FillMode`]: synchronous or background filling of a source
//! - [`GainWriter`]: egress adapter with a clipping volume stage
//!
//! # Example
//!
//! ```rust
//! use soundboard_audio::pcm::{Completion, FillMode, Mixer, MixerOptions};
//! use std::io::Cursor;
//!
//! let mixer = Mixer::new(Vec::<u8>::new(), MixerOptions::default());
//! let samples: Vec<u8> = vec![0u8; 1920];
//! let mut handle = mixer.add_source(Cursor::new(samples), FillMode::Direct).unwrap();
//!
//! assert_eq!(handle.wait_blocking().unwrap(), Completion::Finished);
//! mixer.join().unwrap();
//! ```

mod atomic;
mod error;
mod format;
mod handle;
pub mod io;
mod mixer;
mod source;

pub use atomic::AtomicF32;
pub use error::{Completion, Error, Result};
pub use format::{FRAME_BYTES, Format};
pub use handle::{MixerHandle, SourceCtrl};
pub use io::GainWriter;
pub use mixer::{Mixer, MixerOptions};
pub use source::FillMode;
