use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use tracing::{info, trace, warn};

use embedded_hal_1::delay::DelayNs;
use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use hal::spidev::{SpiModeFlags, SpidevOptions};
use hal::{Delay, SpidevDevice};
use linux_embedded_hal as hal;
use mfrc522::comm::blocking::spi::{DummyDelay, SpiInterface};
use mfrc522::{self, Initialized, Mfrc522};

use crate::config::Config;

/// UID of a PICC, in the byte order reported by the reader. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uid(Vec<u8>);

impl Uid {
    pub fn from_bytes(bs: &[u8]) -> Option<Uid> {
        if bs.is_empty() {
            None
        } else {
            Some(Uid(bs.to_vec()))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Two uppercase hex digits per byte, no separators.
impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseUidError {
    Empty,
    InvalidHex(String),
}

impl fmt::Display for ParseUidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseUidError::Empty => write!(f, "UID is empty"),
            ParseUidError::InvalidHex(s) => write!(f, "UID is not valid hex: {}", s),
        }
    }
}

impl std::error::Error for ParseUidError {}

impl FromStr for Uid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|err| ParseUidError::InvalidHex(err.to_string()))?;
        Uid::from_bytes(&bytes).ok_or(ParseUidError::Empty)
    }
}

/// The reader side of the bridge.
pub trait CardReader {
    /// Returns the UID of a newly presented card, or `None` when no card answered.
    fn poll_for_card(&mut self) -> Result<Option<Uid>>;
    /// Halts the current card so it is not selected again until it re-enters the field.
    fn end_session(&mut self) -> Result<()>;
}

pub struct RfidController {
    mfrc522: Mfrc522<SpiInterface<SpidevDevice, DummyDelay>, Initialized>,
    // Released (and possibly floated low) when dropped, so it lives as long as the controller.
    _reset: Option<LineHandle>,
}

impl RfidController {
    pub fn new(config: &Config) -> Result<Self> {
        let reset = match config.rfid_reset_line {
            Some(line) => Some(hard_reset(&config.gpio_chip, line)?),
            None => {
                info!("No reset line configured for MFRC522, skipping hard reset");
                None
            }
        };

        let mut spi = SpidevDevice::open(&config.spi_device)
            .with_context(|| format!("Opening SPI device {}", config.spi_device))?;
        let options = SpidevOptions::new()
            .max_speed_hz(config.spi_max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options).context("Configuring SPI device")?;

        let itf = SpiInterface::new(spi);
        let mut mfrc522 = Mfrc522::new(itf)
            .init()
            .context("Initializing MFRC522 PICC")?;

        let vers = mfrc522
            .version()
            .context("Retrieving MFRC522 version information")?;

        if vers == 0x91 || vers == 0x92 {
            info!("mfrc522 version: 0x{:x}", vers);
        } else {
            warn!("Unexpected mfrc522 version: 0x{:x}", vers);
        }
        info!("Created new MFRC522 Controller");
        Ok(RfidController {
            mfrc522,
            _reset: reset,
        })
    }
}

fn hard_reset(chip_path: &str, line_id: u32) -> Result<LineHandle> {
    let mut chip =
        Chip::new(chip_path).with_context(|| format!("Opening GPIO chip {}", chip_path))?;
    let handle = chip
        .get_line(line_id)
        .and_then(|line| line.request(LineRequestFlags::OUTPUT, 0, "rfid-reset"))
        .with_context(|| format!("Requesting MFRC522 reset line {}", line_id))?;
    let mut delay = Delay;
    delay.delay_ms(10);
    handle
        .set_value(1)
        .with_context(|| format!("Releasing MFRC522 reset line {}", line_id))?;
    // Oscillator start-up time after leaving power-down.
    delay.delay_ms(50);
    info!("Reset MFRC522 via GPIO line {}", line_id);
    Ok(handle)
}

impl CardReader for RfidController {
    fn poll_for_card(&mut self) -> Result<Option<Uid>> {
        let res = self.mfrc522.reqa();
        match res {
            Err(ref err) => trace!("reqa(): {:?}", err),
            Ok(_) => trace!("reqa() returned AtqA"),
        }
        let atqa = match res {
            Err(mfrc522::error::Error::Timeout) => return Ok(None),
            // mfrc522::error::Error only has a stub Display implementation.
            Err(err) => return Err(anyhow::Error::msg(format!("{:?}", err))),
            Ok(atqa) => atqa,
        };
        let uid = self
            .mfrc522
            .select(&atqa)
            .map_err(|err| anyhow::Error::msg(format!("select(): {:?}", err)))?;
        Ok(Uid::from_bytes(uid.as_bytes()))
    }

    fn end_session(&mut self) -> Result<()> {
        self.mfrc522
            .hlta()
            .map_err(|err| anyhow::Error::msg(format!("hlta(): {:?}", err)))?;
        self.mfrc522
            .stop_crypto1()
            .map_err(|err| anyhow::Error::msg(format!("stop_crypto1(): {:?}", err)))?;
        Ok(())
    }
}

pub mod mock {
    use std::io::BufRead;
    use std::thread;

    use crossbeam_channel::{self, Receiver, TryRecvError};
    use tracing::{error, info, warn};

    use super::*;

    /// Card reader fed with hex UIDs, one per line, from stdin.
    pub struct StdinCardReader {
        rx: Receiver<Uid>,
    }

    impl StdinCardReader {
        pub fn new() -> Result<Self> {
            let (tx, rx) = crossbeam_channel::bounded(16);
            thread::Builder::new()
                .name("stdin-card-reader".to_string())
                .spawn(move || {
                    let stdin = std::io::stdin();
                    for line in stdin.lock().lines() {
                        let line = match line {
                            Ok(line) => line,
                            Err(err) => {
                                error!("Failed to read from stdin: {}", err);
                                break;
                            }
                        };
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match line.parse::<Uid>() {
                            Ok(uid) => {
                                if tx.send(uid).is_err() {
                                    break;
                                }
                            }
                            Err(err) => warn!("Ignoring mock input '{}': {}", line, err),
                        }
                    }
                    info!("Mock card input exhausted");
                })
                .context("Spawning stdin card reader")?;
            Ok(StdinCardReader { rx })
        }
    }

    impl CardReader for StdinCardReader {
        fn poll_for_card(&mut self) -> Result<Option<Uid>> {
            match self.rx.try_recv() {
                Ok(uid) => Ok(Some(uid)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
            }
        }

        fn end_session(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
