//! CLI utilities for the soundboard.
//!
//! This crate provides configuration loading and path resolution shared by
//! soundboard binaries.

pub mod config;
pub mod paths;

pub use config::{Config, MixerSettings, Sound, load_config};
pub use paths::Paths;
