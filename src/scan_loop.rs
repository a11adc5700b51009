use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use embedded_hal_1::delay::DelayNs;
use tracing::{debug, info, trace, warn};

use crate::components::buzzer::Buzzer;
use crate::components::card_line;
use crate::components::rfid::{CardReader, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub buzzer_pulse: Duration,
    pub debounce: Duration,
    /// Pause after a poll that found no card.
    pub idle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            buzzer_pulse: Duration::from_millis(100),
            debounce: Duration::from_millis(50),
            idle: Duration::from_millis(10),
        }
    }
}

/// Polls the reader and reports every newly presented card as one line on `output`.
pub struct ScanLoop<R, B, W, D> {
    reader: R,
    buzzer: B,
    output: W,
    delay: D,
    timings: Timings,
}

impl<R, B, W, D> ScanLoop<R, B, W, D>
where
    R: CardReader,
    B: Buzzer,
    W: Write,
    D: DelayNs,
{
    pub fn new(reader: R, buzzer: B, output: W, delay: D, timings: Timings) -> Self {
        info!(
            "Creating scan loop using buzzer backend {}",
            buzzer.description()
        );
        ScanLoop {
            reader,
            buzzer,
            output,
            delay,
            timings,
        }
    }

    /// Runs iterations until `shutdown` is set or the output fails.
    pub fn run(mut self, shutdown: &AtomicBool) -> Result<()> {
        info!("Running scan loop");
        let res = loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, leaving scan loop");
                break Ok(());
            }
            if let Err(err) = self.step() {
                break Err(err);
            }
        };
        if let Err(err) = self.buzzer.set_buzzer(false) {
            warn!("Failed to switch off buzzer: {}", err);
        }
        res
    }

    /// A single poll. Returns the UID that has been reported, if any.
    pub fn step(&mut self) -> Result<Option<Uid>> {
        let uid = match self.reader.poll_for_card() {
            Ok(Some(uid)) => uid,
            Ok(None) => {
                trace!("No PICC found.");
                self.sleep(self.timings.idle);
                return Ok(None);
            }
            Err(err) => {
                // Indistinguishable from an absent card for the host.
                debug!("Failed to read PICC, treating as absent: {:#}", err);
                self.sleep(self.timings.idle);
                return Ok(None);
            }
        };

        info!("Read PICC with UID {}", uid);
        card_line::write_card_line(&mut self.output, &uid)
            .context("Writing card line to serial output")?;

        self.pulse_buzzer();

        if let Err(err) = self.reader.end_session() {
            warn!("Failed to end PICC session: {:#}", err);
        }
        self.sleep(self.timings.debounce);
        Ok(Some(uid))
    }

    fn pulse_buzzer(&mut self) {
        // The pulse also blocks re-reads, so it is kept even without a working buzzer.
        if let Err(err) = self.buzzer.set_buzzer(true) {
            warn!("Failed to switch on buzzer: {}", err);
        }
        self.sleep(self.timings.buzzer_pulse);
        if let Err(err) = self.buzzer.set_buzzer(false) {
            warn!("Failed to switch off buzzer: {}", err);
        }
    }

    fn sleep(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        self.delay.delay_ms(ms);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::effects::test::{channel, TestBuzzer, TestDelay, TestOutput, TestReader};
    use crate::effects::Effects::{self, *};
    use crossbeam_channel::Receiver;

    fn uid(bs: &[u8]) -> Uid {
        Uid::from_bytes(bs).unwrap()
    }

    fn scan_loop(
        polls: Vec<Result<Option<Uid>>>,
    ) -> (
        ScanLoop<TestReader, TestBuzzer, TestOutput, TestDelay>,
        Receiver<Effects>,
    ) {
        let (tx, rx) = channel();
        let scan_loop = ScanLoop::new(
            TestReader::new(tx.clone(), polls),
            TestBuzzer::new(tx.clone()),
            TestOutput::new(tx.clone()),
            TestDelay::new(tx),
            Timings::default(),
        );
        (scan_loop, rx)
    }

    fn card_effects(line: &str) -> Vec<Effects> {
        vec![
            Output(line.to_string()),
            BuzzerOn,
            Delay(Duration::from_millis(100)),
            BuzzerOff,
            SessionEnded,
            Delay(Duration::from_millis(50)),
        ]
    }

    #[test]
    fn card_is_reported_then_acknowledged_then_halted() {
        let (mut scan_loop, rx) = scan_loop(vec![Ok(Some(uid(&[0x04, 0xa3, 0xff, 0x21])))]);
        let res = scan_loop.step().unwrap();
        assert_eq!(res, Some(uid(&[0x04, 0xa3, 0xff, 0x21])));
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(produced, card_effects("[CARD]04A3FF21\n"));
    }

    #[test]
    fn no_card_produces_no_output() {
        let (mut scan_loop, rx) = scan_loop(vec![Ok(None), Ok(None)]);
        assert_eq!(scan_loop.step().unwrap(), None);
        assert_eq!(scan_loop.step().unwrap(), None);
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(
            produced,
            vec![
                Delay(Duration::from_millis(10)),
                Delay(Duration::from_millis(10))
            ]
        );
    }

    #[test]
    fn failed_read_is_treated_as_absent_card() {
        let (mut scan_loop, rx) = scan_loop(vec![
            Err(anyhow::Error::msg("Collision")),
            Ok(Some(uid(&[0x0a]))),
        ]);
        assert_eq!(scan_loop.step().unwrap(), None);
        assert_eq!(scan_loop.step().unwrap(), Some(uid(&[0x0a])));
        let produced: Vec<Effects> = rx.try_iter().collect();
        let mut expected = vec![Delay(Duration::from_millis(10))];
        expected.extend(card_effects("[CARD]0A\n"));
        assert_eq!(produced, expected);
    }

    #[test]
    fn one_line_per_card_presentation() {
        let (mut scan_loop, rx) = scan_loop(vec![
            Ok(Some(uid(&[0x01, 0x02, 0x03, 0x04]))),
            Ok(None),
            Ok(Some(uid(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]))),
        ]);
        for _ in 0..3 {
            scan_loop.step().unwrap();
        }
        let produced: Vec<Effects> = rx.try_iter().collect();
        let lines: Vec<&Effects> = produced
            .iter()
            .filter(|eff| matches!(eff, Output(_)))
            .collect();
        assert_eq!(
            lines,
            vec![
                &Output("[CARD]01020304\n".to_string()),
                &Output("[CARD]04112233445566\n".to_string())
            ]
        );
        let sessions_ended = produced.iter().filter(|eff| **eff == SessionEnded).count();
        assert_eq!(sessions_ended, 2);
    }

    #[test]
    fn buzzer_pulse_does_not_depend_on_uid() {
        let (mut scan_loop, rx) = scan_loop(vec![
            Ok(Some(uid(&[0xff]))),
            Ok(Some(uid(&[0x10, 0x0f, 0xf0, 0x01, 0x80, 0x7f, 0xaa, 0x55, 0xc3, 0x3c]))),
        ]);
        scan_loop.step().unwrap();
        scan_loop.step().unwrap();
        let produced: Vec<Effects> = rx.try_iter().collect();
        let pulses: Vec<&Effects> = produced
            .windows(2)
            .filter(|w| w[0] == BuzzerOn)
            .map(|w| &w[1])
            .collect();
        assert_eq!(
            pulses,
            vec![
                &Delay(Duration::from_millis(100)),
                &Delay(Duration::from_millis(100))
            ]
        );
    }

    #[test]
    fn broken_output_terminates_the_loop() {
        let (tx, rx) = channel();
        let scan_loop = ScanLoop::new(
            TestReader::new(tx.clone(), vec![Ok(Some(uid(&[0x04, 0xa3])))]),
            TestBuzzer::new(tx.clone()),
            TestOutput::broken(tx.clone()),
            TestDelay::new(tx),
            Timings::default(),
        );
        let shutdown = AtomicBool::new(false);
        assert!(scan_loop.run(&shutdown).is_err());
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(produced, vec![BuzzerOff]);
    }

    #[test]
    fn shutdown_flag_stops_the_loop() {
        let (scan_loop, rx) = scan_loop(vec![Ok(Some(uid(&[0x04])))]);
        let shutdown = AtomicBool::new(true);
        scan_loop.run(&shutdown).unwrap();
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(produced, vec![BuzzerOff]);
    }

    #[test]
    fn broken_buzzer_keeps_pulse_and_debounce() {
        let (tx, rx) = channel();
        let mut scan_loop = ScanLoop::new(
            TestReader::new(
                tx.clone(),
                vec![Ok(Some(uid(&[0x01]))), Ok(Some(uid(&[0x02])))],
            ),
            TestBuzzer::broken(tx.clone()),
            TestOutput::new(tx.clone()),
            TestDelay::new(tx),
            Timings::default(),
        );
        assert_eq!(scan_loop.step().unwrap(), Some(uid(&[0x01])));
        assert_eq!(scan_loop.step().unwrap(), Some(uid(&[0x02])));
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(
            produced,
            vec![
                Output("[CARD]01\n".to_string()),
                Delay(Duration::from_millis(100)),
                SessionEnded,
                Delay(Duration::from_millis(50)),
                Output("[CARD]02\n".to_string()),
                Delay(Duration::from_millis(100)),
                SessionEnded,
                Delay(Duration::from_millis(50)),
            ]
        );
    }

    #[test]
    fn failed_session_end_does_not_stop_reporting() {
        let (tx, rx) = channel();
        let mut scan_loop = ScanLoop::new(
            TestReader::with_broken_session(
                tx.clone(),
                vec![Ok(Some(uid(&[0x0a, 0x0b]))), Ok(Some(uid(&[0x0c])))],
            ),
            TestBuzzer::new(tx.clone()),
            TestOutput::new(tx.clone()),
            TestDelay::new(tx),
            Timings::default(),
        );
        assert_eq!(scan_loop.step().unwrap(), Some(uid(&[0x0a, 0x0b])));
        assert_eq!(scan_loop.step().unwrap(), Some(uid(&[0x0c])));
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(
            produced,
            vec![
                Output("[CARD]0A0B\n".to_string()),
                BuzzerOn,
                Delay(Duration::from_millis(100)),
                BuzzerOff,
                Delay(Duration::from_millis(50)),
                Output("[CARD]0C\n".to_string()),
                BuzzerOn,
                Delay(Duration::from_millis(100)),
                BuzzerOff,
                Delay(Duration::from_millis(50)),
            ]
        );
    }

    #[test]
    fn zero_timings_skip_delays() {
        let (tx, rx) = channel();
        let timings = Timings {
            buzzer_pulse: Duration::from_millis(100),
            debounce: Duration::ZERO,
            idle: Duration::ZERO,
        };
        let mut scan_loop = ScanLoop::new(
            TestReader::new(tx.clone(), vec![Ok(None), Ok(Some(uid(&[0x42])))]),
            TestBuzzer::new(tx.clone()),
            TestOutput::new(tx.clone()),
            TestDelay::new(tx),
            timings,
        );
        scan_loop.step().unwrap();
        scan_loop.step().unwrap();
        let produced: Vec<Effects> = rx.try_iter().collect();
        assert_eq!(
            produced,
            vec![
                Output("[CARD]42\n".to_string()),
                BuzzerOn,
                Delay(Duration::from_millis(100)),
                BuzzerOff,
                SessionEnded,
            ]
        );
    }
}
