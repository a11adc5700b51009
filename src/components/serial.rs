//! Serial link towards the host.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

/// Opens the bridge output: the configured tty, or stdout if none is configured.
pub fn open_output(config: &Config) -> Result<Box<dyn Write + Send>> {
    match config.serial_device {
        Some(ref device) => {
            let port = serialport::new(device, config.baud_rate)
                .timeout(Duration::from_secs(1))
                .open()
                .with_context(|| format!("Opening serial device {}", device))?;
            info!(
                "Writing card lines to serial device {} at {} baud",
                device, config.baud_rate
            );
            Ok(Box::new(port))
        }
        None => {
            info!("No serial device configured, writing card lines to stdout");
            Ok(Box::new(std::io::stdout()))
        }
    }
}

/// Opens a serial port for reading card lines on the host side.
pub fn open_input(device: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
    let port = serialport::new(device, baud_rate)
        .timeout(Duration::from_secs(1))
        .open()
        .with_context(|| format!("Opening serial device {}", device))?;
    port.clear(serialport::ClearBuffer::Input)
        .context("Clearing serial input buffer")?;
    Ok(port)
}
