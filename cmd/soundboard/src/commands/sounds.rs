//! Configured sound listing.

use clap::Args;

use super::get_config;
use crate::Cli;

/// List the sounds defined in the configuration file.
#[derive(Args)]
pub struct SoundsCommand {}

impl SoundsCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let names = cfg.list_sounds();
        if names.is_empty() {
            println!("No sounds configured in {}", cfg.path().display());
            return Ok(());
        }

        println!("{:<20} {:<6} {:<10} PATH", "NAME", "GAIN", "FILL");
        for name in names {
            let Some(sound) = cfg.sound(name) else {
                continue;
            };
            let fill = if sound.background { "background" } else { "direct" };
            println!(
                "{:<20} {:<6.2} {:<10} {}",
                name,
                sound.gain,
                fill,
                cfg.sound_path(sound).display()
            );
        }
        Ok(())
    }
}
