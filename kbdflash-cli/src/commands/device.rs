//! Single-exchange commands: bump, version and region read.

use anyhow::{Context, Result};
use console::style;
use kbdflash::hex::to_hex;

use crate::config::Config;
use crate::{Cli, open_flasher};

/// Print a 64-byte reply either as hex on stdout or as a JSON object.
pub(crate) fn print_block(label: &str, address: Option<u32>, data: &[u8], json: bool) {
    if json {
        let value = serde_json::json!({
            "command": label,
            "address": address,
            "data": to_hex(data),
        });
        println!("{value}");
    } else {
        println!("{}", to_hex(data));
    }
}

/// Bump command implementation.
pub(crate) fn cmd_bump(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;
    let reply = flasher.bump().context("Bump failed")?;
    print_block("bump", None, &reply, json);
    Ok(())
}

/// Version command implementation.
pub(crate) fn cmd_version(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;
    let version = flasher
        .read_version()
        .context("Failed to read version region")?;
    if !cli.quiet && !json {
        eprintln!("{}", style("Version is:").bold());
    }
    print_block(
        "version",
        Some(kbdflash::protocol::VERSION_ADDRESS),
        &version,
        json,
    );
    Ok(())
}

/// Read command implementation.
pub(crate) fn cmd_read(cli: &Cli, config: &Config, address: u32, json: bool) -> Result<()> {
    let mut flasher = open_flasher(cli, config)?;
    let block = flasher
        .read_region(address)
        .with_context(|| format!("Failed to read region at 0x{address:08X}"))?;
    print_block("read", Some(address), &block, json);
    Ok(())
}
