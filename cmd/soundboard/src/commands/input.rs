//! Input resolution and opening.
//!
//! An input argument is either a sound name from the configuration or a
//! file path. Raw PCM files feed the mixer directly; everything else is
//! decoded by an ffmpeg child process writing s16le stereo 48kHz to a pipe.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::Context as _;
use soundboard_audio::Format;
use soundboard_audio::pcm::FillMode;
use soundboard_cli::Config;
use tracing::debug;

/// Extensions treated as headerless s16le stereo 48kHz PCM.
const RAW_EXTENSIONS: &[&str] = &["pcm", "raw"];

/// How an input's bytes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    Raw,
    Ffmpeg,
}

/// A resolved input, ready to open.
#[derive(Debug, Clone)]
pub struct Input {
    pub label: String,
    pub path: PathBuf,
    pub gain: f32,
    pub mode: FillMode,
    pub decode: Decode,
}

/// An opened input: the byte stream plus the decoder process, if any.
pub struct Opened {
    pub ingress: Box<dyn Read + Send>,
    pub child: Option<Child>,
}

impl Input {
    /// Resolves a command line argument against the configuration.
    ///
    /// Configured sound names win over paths with the same spelling.
    pub fn resolve(cfg: &Config, arg: &str, force_background: bool) -> Self {
        let (path, gain, background) = match cfg.sound(arg) {
            Some(sound) => (cfg.sound_path(sound), sound.gain, sound.background),
            None => (PathBuf::from(arg), 1.0, false),
        };

        let decode = if is_raw(&path) {
            Decode::Raw
        } else {
            Decode::Ffmpeg
        };
        let mode = if decode == Decode::Ffmpeg || background || force_background {
            FillMode::Background
        } else {
            FillMode::Direct
        };

        Self {
            label: arg.to_string(),
            path,
            gain,
            mode,
            decode,
        }
    }

    /// Opens the input's byte stream.
    pub fn open(&self, ffmpeg: &str) -> anyhow::Result<Opened> {
        match self.decode {
            Decode::Raw => {
                let file = File::open(&self.path)
                    .with_context(|| format!("open {}", self.path.display()))?;
                Ok(Opened {
                    ingress: Box::new(file),
                    child: None,
                })
            }
            Decode::Ffmpeg => {
                let mut child = ffmpeg_command(ffmpeg, &self.path)
                    .spawn()
                    .with_context(|| format!("spawn {ffmpeg} for {}", self.path.display()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| anyhow::anyhow!("{ffmpeg} stdout not captured"))?;
                debug!(input = %self.label, pid = child.id(), "transcoding");
                Ok(Opened {
                    ingress: Box::new(stdout),
                    child: Some(child),
                })
            }
        }
    }
}

fn is_raw(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            RAW_EXTENSIONS
                .iter()
                .any(|raw| ext.eq_ignore_ascii_case(raw))
        })
}

/// Builds the ffmpeg invocation that decodes `path` to the mixer format.
fn ffmpeg_command(ffmpeg: &str, path: &Path) -> Command {
    let format = Format::STEREO_48K;
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-f", "s16le", "-ar"])
        .arg(format.sample_rate.to_string())
        .arg("-ac")
        .arg(format.channels().to_string())
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    cmd
}
