//! kbdflash CLI - Command-line tool for keyboard controller flash.
//!
//! ## Features
//!
//! - Identify the controller (bump) and read its firmware version
//! - Dump the full flash to an image file
//! - Read, write and check single 64-byte regions
//! - List USB devices and mark known keyboards
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use kbdflash::{ErrorKind, KeyboardFlasher, NativeUsbPort};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress bars and colors should be used.
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// kbdflash - Read and write the flash of USB keyboard controllers.
///
/// Environment variables:
///   KBDFLASH_VID     - USB vendor ID (hex, default: 04d9)
///   KBDFLASH_PID     - USB product ID (hex, default: 0141)
///   KBDFLASH_OUTPUT  - Default output path for `dump`
#[derive(Parser)]
#[command(name = "kbdflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  kbdflash dump -o flash.img\n  kbdflash read --address 0x2800")]
pub(crate) struct Cli {
    /// USB vendor ID (hex).
    #[arg(long, global = true, env = "KBDFLASH_VID", value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product ID (hex).
    #[arg(long, global = true, env = "KBDFLASH_PID", value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Send the handshake and print the controller's reply.
    Bump {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read the firmware version region.
    Version {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read one 64-byte flash region.
    Read {
        /// Region start address (hex).
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Dump the whole flash to an image file.
    Dump {
        /// Output image path [default: flash.img].
        #[arg(short, long, env = "KBDFLASH_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Write up to 52 bytes to one flash region.
    Write {
        /// Region start address (hex).
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Payload as hex bytes (e.g. deadbeef).
        #[arg(short, long, value_parser = parse_hex_data)]
        data: HexData,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Send a check frame for one flash region (no verdict is returned).
    Check {
        /// Region start address (hex).
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Payload as hex bytes.
        #[arg(short, long, value_parser = parse_hex_data)]
        data: HexData,
    },

    /// List USB devices.
    ListDevices {
        /// Output device list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Payload bytes parsed from a hex argument.
#[derive(Debug, Clone)]
pub(crate) struct HexData(pub(crate) Vec<u8>);

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let digits = hex_digits(s).ok_or_else(|| format!("Invalid hex address: '{s}'"))?;
    u32::from_str_radix(&digits, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a hexadecimal USB ID.
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = hex_digits(s).ok_or_else(|| format!("Invalid hex ID: '{s}'"))?;
    u16::from_str_radix(&digits, 16).map_err(|e| format!("Invalid hex ID: {e}"))
}

/// Strip one optional `0x` prefix and `_` separators; only hex digits may remain.
fn hex_digits(s: &str) -> Option<String> {
    let s = s.trim();
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let digits: String = s.chars().filter(|c| *c != '_').collect();
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())).then_some(digits)
}

/// Parse a hex payload.
fn parse_hex_data(s: &str) -> Result<HexData, String> {
    kbdflash::hex::from_hex(s)
        .map(HexData)
        .ok_or_else(|| format!("Invalid hex data: '{s}'"))
}

/// CLI-level errors with dedicated exit codes.
#[derive(Debug)]
pub(crate) enum CliError {
    /// Invalid usage that clap cannot catch (exit code 2).
    Usage(String),
    /// User declined a confirmation prompt (exit code 130).
    Cancelled(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(msg) | Self::Cancelled(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CliError {}

/// Map an error to the process exit code.
///
/// 1 generic, 2 usage, 3 configuration, 4 device setup, 130 cancelled.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<kbdflash::Error>().map(kbdflash::Error::kind) {
        Some(ErrorKind::Config) => 3,
        Some(ErrorKind::Setup) => 4,
        _ => 1,
    }
}

/// Open the keyboard described by the CLI flags and config.
pub(crate) fn open_flasher(cli: &Cli, config: &Config) -> Result<KeyboardFlasher<NativeUsbPort>> {
    let usb = config.usb_config(cli.vid, cli.pid);
    debug!(
        "Opening {:04x}:{:04x} (out {:#04x}, in {:#04x}, interfaces {:?})",
        usb.vid, usb.pid, usb.out_endpoint, usb.in_endpoint, usb.interfaces
    );
    if !cli.quiet {
        eprintln!(
            "{} Opening keyboard {}",
            style("🔌").cyan(),
            style(format!("{:04x}:{:04x}", usb.vid, usb.pid)).green()
        );
    }
    Ok(KeyboardFlasher::open(&usb)?)
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Bump { json } => commands::device::cmd_bump(cli, &config, *json),
        Commands::Version { json } => commands::device::cmd_version(cli, &config, *json),
        Commands::Read { address, json } => {
            commands::device::cmd_read(cli, &config, *address, *json)
        },
        Commands::Dump { output } => commands::dump::cmd_dump(cli, &config, output.clone()),
        Commands::Write { address, data, yes } => {
            commands::write::cmd_write(cli, &config, *address, &data.0, *yes)
        },
        Commands::Check { address, data } => {
            commands::write::cmd_check(cli, &config, *address, &data.0)
        },
        Commands::ListDevices { json } => {
            commands::list::cmd_list_devices(*json);
            Ok(())
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "kbdflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}
