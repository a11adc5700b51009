use anyhow::Result;

#[derive(Debug)]
pub enum Error {
    IO(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IO(s) => write!(f, "IO Error: {}", s),
        }
    }
}

impl std::error::Error for Error {}

pub trait Buzzer {
    fn description(&self) -> String;
    fn set_buzzer(&mut self, on: bool) -> Result<()>;
}

pub mod gpio_cdev {
    use super::{Buzzer, Error};
    use crate::config::Config;
    use anyhow::Result;
    use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
    use tracing::{info, trace, warn};

    pub struct GpioBuzzer {
        line: Option<(u32, LineHandle)>,
    }

    impl GpioBuzzer {
        pub fn new(config: &Config) -> Result<Self> {
            let line_id = match config.buzzer_line {
                Some(line_id) => line_id,
                None => {
                    warn!("No GPIO line configured for buzzer. Skipping all future requests for the buzzer.");
                    return Ok(GpioBuzzer { line: None });
                }
            };
            let mut chip = Chip::new(&config.gpio_chip).map_err(|err| {
                Error::IO(format!(
                    "Failed to open Chip {}: {:?}",
                    config.gpio_chip, err
                ))
            })?;
            let line = chip.get_line(line_id).map_err(|err| {
                Error::IO(format!(
                    "Failed to get GPIO line {} for buzzer: {:?}",
                    line_id, err
                ))
            })?;
            let handle = line
                .request(LineRequestFlags::OUTPUT, 0, "buzzer-gpio")
                .map_err(|err| {
                    Error::IO(format!(
                        "Failed to request GPIO output handle for buzzer line {}: {:?}",
                        line_id, err
                    ))
                })?;
            info!("Using GPIO line {} for buzzer", line_id);
            Ok(GpioBuzzer {
                line: Some((line_id, handle)),
            })
        }
    }

    impl Buzzer for GpioBuzzer {
        fn description(&self) -> String {
            "gpio-cdev backend".to_string()
        }

        fn set_buzzer(&mut self, on: bool) -> Result<()> {
            if let Some((line_id, ref handle)) = self.line {
                handle.set_value(on as u8).map_err(|err| {
                    Error::IO(format!(
                        "Failed to switch {} buzzer on GPIO line {}: {:?}",
                        if on { "on" } else { "off" },
                        line_id,
                        err
                    ))
                })?;
                trace!("Switched buzzer {} on GPIO line {}", on, line_id);
            }
            Ok(())
        }
    }
}
