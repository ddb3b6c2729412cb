//! Audio utilities for the soundboard.
//!
//! - `pcm`: real-time mixing of concurrently playing PCM streams
//!
//! # Example
//!
//! ```rust
//! use soundboard_audio::pcm::{FillMode, Mixer, MixerOptions};
//! use std::io::Cursor;
//! use std::time::Duration;
//!
//! // Mix two short clips into an in-memory sink.
//! let opts = MixerOptions::default().with_buffer_duration(Duration::from_millis(20));
//! let mixer = Mixer::new(Vec::<u8>::new(), opts);
//!
//! let a = mixer.add_source(Cursor::new(vec![0u8; 3840]), FillMode::Direct).unwrap();
//! let b = mixer.add_source(Cursor::new(vec![0u8; 1920]), FillMode::Background).unwrap();
//! b.ctrl().set_gain(0.5);
//!
//! mixer.join().unwrap();
//! assert!(a.ctrl().is_done());
//! ```

pub mod pcm;

pub use pcm::Format;
