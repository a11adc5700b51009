//! Host side of the bridge: prints the UID of every `[CARD]` line received on a serial port.

use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info, warn};

use cardbridge::components::card_line::{parse_card_line, LineDecoder, CARD_LINE_PREFIX};
use cardbridge::components::serial;
use cardbridge::config::Config;
use cardbridge::logging;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.debug);

    let device = match std::env::args().nth(1).or_else(|| config.serial_device.clone()) {
        Some(device) => device,
        None => anyhow::bail!("Usage: card-listen <serial device> (or set SERIAL_DEVICE)"),
    };
    let mut port = serial::open_input(&device, config.baud_rate)?;
    info!("Listening for card lines on {} at {} baud", device, config.baud_rate);

    let stdout = std::io::stdout();
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 256];
    loop {
        let n = match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(ref err) if err.kind() == ErrorKind::TimedOut => continue,
            Err(ref err) if err.kind() == ErrorKind::Interrupted => {
                // Bytes may have been lost, a partial line cannot be trusted.
                warn!("Serial read interrupted, dropping partial line");
                decoder.clear();
                continue;
            }
            Err(err) => return Err(err).context("Reading from serial device"),
        };
        for line in decoder.push(&buf[..n]) {
            if line.is_empty() {
                continue;
            }
            if !line.starts_with(CARD_LINE_PREFIX) {
                debug!("Ignoring non-card line '{}'", line);
                continue;
            }
            match parse_card_line(&line) {
                Ok(uid) => {
                    let mut out = stdout.lock();
                    writeln!(out, "{}", uid).context("Writing UID to stdout")?;
                    out.flush().context("Flushing stdout")?;
                }
                Err(err) => warn!("Malformed card line '{}': {}", line, err),
            }
        }
    }
}
