//! Full flash dump.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kbdflash::hex::to_hex;
use std::path::PathBuf;

use crate::config::Config;
use crate::{Cli, open_flasher, use_fancy_output};

/// Default image path when neither the flag, the environment nor the config
/// file name one.
pub(crate) const DEFAULT_OUTPUT: &str = "flash.img";

/// Resolve the output path: flag/env first, then config, then the default.
pub(crate) fn resolve_output(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.dump.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
}

/// Dump command implementation.
///
/// Prints the bump reply and the version region, then reads the whole flash.
pub(crate) fn cmd_dump(cli: &Cli, config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = resolve_output(output, config);
    let mut flasher = open_flasher(cli, config)?;

    let ident = flasher.bump().context("Bump failed")?;
    println!("{}", to_hex(&ident));

    let version = flasher
        .read_version()
        .context("Failed to read version region")?;
    if !cli.quiet {
        eprintln!("{}", style("Version is:").bold());
    }
    println!("{}", to_hex(&version));

    if !cli.quiet {
        eprintln!(
            "{} Dumping flash to {}",
            style("📥").cyan(),
            style(output.display()).green()
        );
    }

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let result = flasher.dump_firmware(&output, &mut |current, total| {
        if total > 0 {
            pb.set_position((current * 100 / total) as u64);
        }
    });

    match result {
        Ok(image) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!(
                    "{} Wrote {} bytes to {}",
                    style("✓").green(),
                    image.len(),
                    output.display()
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            Err(err).with_context(|| format!("Dump to {} failed", output.display()))
        },
    }
}
