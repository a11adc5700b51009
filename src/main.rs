use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use linux_embedded_hal::Delay;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info, warn};

use cardbridge::components::buzzer::gpio_cdev::GpioBuzzer;
use cardbridge::components::rfid::{mock::StdinCardReader, RfidController};
use cardbridge::components::serial;
use cardbridge::config::Config;
use cardbridge::effects::test::{self, TestBuzzer};
use cardbridge::logging;
use cardbridge::scan_loop::ScanLoop;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.debug);
    info!("Configuration: {:?}", config);

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("Registering handler for signal {}", signal))?;
    }

    let res = if config.mock_mode {
        run_mock(&config, &shutdown)
    } else {
        run_production(&config, &shutdown)
    };
    if let Err(ref err) = res {
        error!("Scan loop terminated: {:#}", err);
    }
    res
}

fn run_mock(config: &Config, shutdown: &AtomicBool) -> Result<()> {
    warn!("Running in mock mode, reading UIDs from stdin");
    let (tx, effects) = test::channel();
    let _handle = std::thread::Builder::new()
        .name("mock-effect-logger".to_string())
        .spawn(move || {
            for eff in effects.iter() {
                info!("Mock buzzer received effect: {:?}", eff);
            }
        })
        .context("Spawning mock effect logger")?;

    let reader = StdinCardReader::new()?;
    let output = serial::open_output(config)?;
    ScanLoop::new(reader, TestBuzzer::new(tx), output, Delay, config.timings()).run(shutdown)
}

fn run_production(config: &Config, shutdown: &AtomicBool) -> Result<()> {
    info!("Starting card bridge");
    let buzzer = GpioBuzzer::new(config).context("Creating buzzer")?;
    let reader = RfidController::new(config).context("Creating RfidController")?;
    let output = serial::open_output(config)?;
    ScanLoop::new(reader, buzzer, output, Delay, config.timings()).run(shutdown)
}
