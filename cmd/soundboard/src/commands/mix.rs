//! Mix command.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::Child;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use soundboard_audio::pcm::{
    AtomicF32, Completion, GainWriter, Mixer, MixerHandle, SourceCtrl,
};
use tracing::{info, warn};

use super::get_config;
use super::input::Input;
use crate::Cli;

/// Mix inputs into one 16-bit stereo 48kHz PCM stream.
///
/// Every input starts playing immediately. The command returns once all
/// inputs have finished and the mixed output is flushed.
///
/// Examples:
///   soundboard mix rain airhorn -o out.pcm
///   soundboard mix intro.mp3 voice.pcm --gain 0.8 | aplay -f S16_LE -r 48000 -c 2
#[derive(Args)]
pub struct MixCommand {
    /// Sound names from the config, or file paths
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Output gain applied after mixing
    #[arg(long, default_value_t = 1.0)]
    gain: f32,

    /// Fill raw PCM inputs from background threads
    #[arg(long)]
    background: bool,
}

/// One input that is playing in the mixer.
struct Playing {
    label: String,
    handle: MixerHandle,
    child: Option<Child>,
}

impl MixCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let inputs: Vec<Input> = self
            .inputs
            .iter()
            .map(|arg| Input::resolve(&cfg, arg, self.background))
            .collect();

        let egress = open_egress(self.output.as_deref())?;
        let egress = GainWriter::with_gain(egress, Arc::new(AtomicF32::new(self.gain)));
        let mixer = Mixer::new(egress, cfg.mixer.to_options());
        let playing = start(&mixer, &inputs, &cfg.ffmpeg)?;

        let ctrls: Vec<SourceCtrl> = playing.iter().map(|p| p.handle.ctrl()).collect();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, canceling all inputs");
                for ctrl in &ctrls {
                    ctrl.cancel();
                }
            }
        });

        let total = playing.len();
        let mut failed = 0;
        for p in playing {
            if !p.finish().await {
                failed += 1;
            }
        }
        interrupt.abort();

        // Completion resolves before the last frames are written; joining
        // waits for the loop to mix them and flush.
        let joined = mixer.clone();
        tokio::task::spawn_blocking(move || joined.join())
            .await
            .context("mixer join task")??;

        if failed > 0 {
            anyhow::bail!("{failed} of {total} inputs failed");
        }
        Ok(())
    }
}

impl Playing {
    /// Waits for the input to complete and reaps its decoder.
    ///
    /// Returns false if the input failed.
    async fn finish(mut self) -> bool {
        let result = self.handle.wait().await;
        let ok = match &result {
            Ok(Completion::Finished) => {
                info!(
                    input = %self.label,
                    played = ?self.handle.ctrl().time_played(),
                    "finished"
                );
                true
            }
            Ok(Completion::Canceled) => {
                info!(input = %self.label, "canceled");
                true
            }
            Err(e) => {
                warn!(input = %self.label, error = %e, "input failed");
                false
            }
        };

        if let Some(mut child) = self.child.take() {
            let finished = matches!(result, Ok(Completion::Finished));
            if !finished {
                let _ = child.kill();
            }
            match child.wait() {
                Ok(status) if finished && !status.success() => {
                    warn!(input = %self.label, %status, "decoder exited with failure");
                    return false;
                }
                Ok(_) => {}
                Err(e) => warn!(input = %self.label, error = %e, "failed to reap decoder"),
            }
        }
        ok
    }
}

/// Opens the output file, or stdout when none is given.
fn open_egress(output: Option<&str>) -> anyhow::Result<Box<dyn Write + Send>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {path}"))?,
        )),
        // Stdout flushes on every newline byte on its own.
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

/// Opens every input and adds it to the mixer.
///
/// On failure everything already started is torn down before returning.
fn start(mixer: &Arc<Mixer>, inputs: &[Input], ffmpeg: &str) -> anyhow::Result<Vec<Playing>> {
    let mut playing = Vec::with_capacity(inputs.len());
    for input in inputs {
        let opened = match input.open(ffmpeg) {
            Ok(opened) => opened,
            Err(e) => {
                close_all(mixer, playing);
                return Err(e);
            }
        };
        let handle = match mixer.add_source(opened.ingress, input.mode) {
            Ok(handle) => handle,
            Err(e) => {
                kill(opened.child);
                close_all(mixer, playing);
                return Err(e.into());
            }
        };
        handle.set_gain(input.gain);
        info!(input = %input.label, mode = ?input.mode, gain = input.gain, "playing");
        playing.push(Playing {
            label: input.label.clone(),
            handle,
            child: opened.child,
        });
    }
    Ok(playing)
}

/// Tears down everything already started after a later input failed.
fn close_all(mixer: &Mixer, playing: Vec<Playing>) {
    if let Err(e) = mixer.close() {
        warn!(error = %e, "mixer close failed");
    }
    for p in playing {
        kill(p.child);
    }
}

fn kill(child: Option<Child>) {
    if let Some(mut child) = child {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundboard_audio::pcm::{Error, FillMode, MixerOptions};
    use std::path::PathBuf;

    use super::super::input::Decode;

    fn raw_input(path: PathBuf) -> Input {
        Input {
            label: path.display().to_string(),
            path,
            gain: 1.0,
            mode: FillMode::Direct,
            decode: Decode::Raw,
        }
    }

    #[test]
    fn test_open_egress_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcm");

        let mut egress = open_egress(path.to_str()).unwrap();
        egress.write_all(&[1, 0, 2, 0, b'\n', 0]).unwrap();
        egress.flush().unwrap();
        drop(egress);

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 0, 2, 0, b'\n', 0]);
    }

    #[test]
    fn test_start_plays_raw_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.pcm");
        std::fs::write(&path, vec![0u8; 1920]).unwrap();

        let mixer = Mixer::new(Vec::<u8>::new(), MixerOptions::default());
        let mut playing = start(&mixer, &[raw_input(path)], "ffmpeg").unwrap();
        assert_eq!(playing.len(), 1);
        assert!(playing[0].child.is_none());

        playing[0].handle.wait_blocking().unwrap();
        mixer.join().unwrap();
    }

    #[test]
    fn test_start_rejected_by_mixer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.pcm");
        std::fs::write(&path, vec![0u8; 1920]).unwrap();

        let mixer = Mixer::new(Vec::<u8>::new(), MixerOptions::default());
        mixer.close().unwrap();

        let err = start(&mixer, &[raw_input(path)], "ffmpeg").err().unwrap();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Closed)));
        assert_eq!(mixer.source_count(), 0);
    }

    #[test]
    fn test_start_open_failure_closes_mixer() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pcm");
        std::fs::write(&good, vec![0u8; 192_000]).unwrap();
        let missing = dir.path().join("missing.pcm");

        let mixer = Mixer::new(Vec::<u8>::new(), MixerOptions::default());
        let err = start(&mixer, &[raw_input(good), raw_input(missing)], "ffmpeg")
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing.pcm"));

        // The mixer was shut down with the first input in it.
        assert!(!mixer.is_running());
        assert!(matches!(
            mixer.add_source(std::io::empty(), FillMode::Direct),
            Err(Error::Closed)
        ));
    }
}
