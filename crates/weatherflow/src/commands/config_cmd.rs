//! Config subcommand handlers.

use weatherflow_config::load_config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config()?;
            let active = config::active_profile_name(global, &cfg);
            let rendered = toml::to_string_pretty(&cfg.redacted())?;

            if !cfg.profiles.contains_key(&active) {
                tracing::info!(profile = %active, "active profile is not defined in the config");
            }
            println!("# active profile: {active}");
            print!("{rendered}");
            Ok(())
        }
    }
}
