//! Clap derive structures for the `weatherflow` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

use weatherflow_api::StrikeType;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// weatherflow -- stream live data from WeatherFlow Tempest stations
#[derive(Debug, Parser)]
#[command(
    name = "weatherflow",
    version,
    about = "Stream live WeatherFlow station data from the command line",
    long_about = "Connects to the WeatherFlow streaming WebSocket, subscribes to station\n\
        devices or a lightning geofence, and prints every decoded event until\n\
        interrupted. Ctrl-C unsubscribes and closes the connection cleanly.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "WEATHERFLOW_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Personal access token (overrides profile)
    #[arg(long, env = "WEATHERFLOW_TOKEN", global = true, hide_env_values = true, hide = true)]
    pub token: Option<String>,

    /// Streaming endpoint (overrides profile)
    #[arg(long, env = "WEATHERFLOW_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WEATHERFLOW_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per event
    Plain,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to station devices and print their events
    #[command(alias = "l")]
    Listen(ListenArgs),

    /// Stream lightning strikes inside a latitude/longitude box
    Strikes(StrikesArgs),

    /// Inspect the configuration file
    Config(ConfigArgs),
}

// ── listen ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Device id to subscribe to (repeatable; defaults to the profile's devices)
    #[arg(long = "device", short = 'd', value_name = "ID")]
    pub devices: Vec<String>,

    /// Also start the 3-second rapid wind stream
    #[arg(long)]
    pub rapid_wind: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

// ── strikes ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StrikesArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat_min: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lat_max: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon_min: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon_max: f64,

    /// Restrict to cloud-to-ground or intra-cloud strikes
    #[arg(long)]
    pub strike_type: Option<StrikeTypeArg>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrikeTypeArg {
    All,
    /// Cloud-to-ground
    Cg,
    /// Intra-cloud
    Ic,
}

impl From<StrikeTypeArg> for StrikeType {
    fn from(arg: StrikeTypeArg) -> Self {
        match arg {
            StrikeTypeArg::All => Self::All,
            StrikeTypeArg::Cg => Self::CloudToGround,
            StrikeTypeArg::Ic => Self::IntraCloud,
        }
    }
}

// ── config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration with tokens masked
    Show,
}
