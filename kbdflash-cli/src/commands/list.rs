//! USB device listing.

use console::style;
use kbdflash::detect_devices;

/// List devices command implementation.
pub(crate) fn cmd_list_devices(json: bool) {
    let detected = detect_devices();

    if json {
        let devices: Vec<serde_json::Value> = detected
            .iter()
            .map(|d| {
                serde_json::json!({
                    "bus": d.bus,
                    "address": d.address,
                    "vid": format!("{:04x}", d.vid),
                    "pid": format!("{:04x}", d.pid),
                    "device": d.kind.name(),
                    "known": d.kind.is_known(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&devices).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("USB devices:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No USB devices found").dim());
        return;
    }

    for (line, device) in kbdflash::device::format_device_list(&detected)
        .into_iter()
        .zip(&detected)
    {
        if device.is_keyboard() {
            eprintln!("  {} {}", style("•").green(), style(line).cyan().bold());
        } else {
            eprintln!("  {} {}", style("•").dim(), line);
        }
    }

    if let Some(keyboard) = detected.iter().find(|d| d.is_keyboard()) {
        eprintln!(
            "\n{} Keyboard found: bus {} addr {}",
            style("→").green().bold(),
            keyboard.bus,
            keyboard.address
        );
    }
}
