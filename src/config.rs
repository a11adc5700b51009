use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::scan_loop::Timings;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_spi_device")]
    pub spi_device: String,
    #[serde(default = "default_spi_max_speed_hz")]
    pub spi_max_speed_hz: u32,
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,
    pub rfid_reset_line: Option<u32>,
    pub buzzer_line: Option<u32>,
    pub serial_device: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_buzzer_pulse_ms")]
    pub buzzer_pulse_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub mock_mode: bool,
}

fn default_spi_device() -> String {
    "/dev/spidev0.0".to_string()
}

fn default_spi_max_speed_hz() -> u32 {
    1_000_000
}

fn default_gpio_chip() -> String {
    "/dev/gpiochip0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_buzzer_pulse_ms() -> u64 {
    100
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spi_device: default_spi_device(),
            spi_max_speed_hz: default_spi_max_speed_hz(),
            gpio_chip: default_gpio_chip(),
            rfid_reset_line: None,
            buzzer_line: None,
            serial_device: None,
            baud_rate: default_baud_rate(),
            buzzer_pulse_ms: default_buzzer_pulse_ms(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            debug: false,
            mock_mode: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        envy::from_env::<Config>().context("Loading configuration from environment")
    }

    pub fn timings(&self) -> Timings {
        Timings {
            buzzer_pulse: Duration::from_millis(self.buzzer_pulse_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            idle: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
