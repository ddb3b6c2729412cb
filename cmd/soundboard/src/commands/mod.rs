//! CLI commands module.

mod input;
mod mix;
mod sounds;

pub use mix::MixCommand;
pub use sounds::SoundsCommand;

use soundboard_cli::{Config, load_config};

use crate::Cli;

/// Loads the configuration selected on the command line.
pub(crate) fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(cli.config.as_deref())
}
