//! Region write and check commands.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use kbdflash::protocol::PAYLOAD_SIZE;
use std::io::IsTerminal;

use crate::config::Config;
use crate::{Cli, CliError, open_flasher};

/// Reject payloads that cannot fit a frame before touching the device.
fn check_payload(data: &[u8]) -> Result<()> {
    if data.len() > PAYLOAD_SIZE {
        return Err(CliError::Usage(format!(
            "Payload is {} bytes, a region write carries at most {PAYLOAD_SIZE}",
            data.len()
        ))
        .into());
    }
    Ok(())
}

/// Ask before writing flash. Requires a terminal unless `--yes` was given.
fn confirm_write(address: u32, len: usize, yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }
    if !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
        return Err(CliError::Usage(
            "Refusing to write flash without confirmation; pass --yes in non-interactive use"
                .to_string(),
        )
        .into());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Write {len} bytes to flash at 0x{address:08X}?"))
        .default(false)
        .interact()
        .map_err(|e| CliError::Usage(format!("Prompt failed: {e}")))?;
    if confirmed {
        Ok(())
    } else {
        Err(CliError::Cancelled("Write cancelled".to_string()).into())
    }
}

/// Write command implementation.
///
/// Enters flash mode, writes one region and leaves flash mode again.
pub(crate) fn cmd_write(
    cli: &Cli,
    config: &Config,
    address: u32,
    data: &[u8],
    yes: bool,
) -> Result<()> {
    check_payload(data)?;
    confirm_write(address, data.len(), yes)?;

    let mut flasher = open_flasher(cli, config)?;
    flasher
        .enter_flash_mode()
        .context("Failed to enter flash mode")?;
    flasher
        .write_region(address, data)
        .with_context(|| format!("Failed to write region at 0x{address:08X}"))?;
    flasher
        .leave_flash_mode()
        .context("Failed to leave flash mode")?;

    if !cli.quiet {
        eprintln!(
            "{} Wrote {} bytes at 0x{address:08X}",
            style("✓").green(),
            data.len()
        );
    }
    Ok(())
}

/// Check command implementation.
///
/// The controller does not answer check frames; read the region back to
/// confirm its contents.
pub(crate) fn cmd_check(cli: &Cli, config: &Config, address: u32, data: &[u8]) -> Result<()> {
    check_payload(data)?;

    let mut flasher = open_flasher(cli, config)?;
    flasher
        .check_region(address, data)
        .with_context(|| format!("Failed to send check for region at 0x{address:08X}"))?;

    if !cli.quiet {
        eprintln!(
            "{} Check frame sent for 0x{address:08X} (the device returns no verdict)",
            style("ℹ").blue()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_payload_limit() {
        assert!(check_payload(&[0u8; 52]).is_ok());
        let err = check_payload(&[0u8; 53]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_confirm_skipped_with_yes() {
        assert!(confirm_write(0, 4, true).is_ok());
    }
}
