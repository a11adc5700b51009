use anyhow::Result;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use cardbridge::components::rfid::{CardReader, RfidController};
use cardbridge::config::Config;
use cardbridge::logging;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.debug);
    let mut mf = RfidController::new(&config)?;
    loop {
        let res = mf.poll_for_card();
        info!("res = {:?}", res);
        if let Ok(Some(_)) = res {
            if let Err(err) = mf.end_session() {
                warn!("Failed to end PICC session: {:#}", err);
            }
        }
        thread::sleep(Duration::from_millis(200));
    }
}
