/*

input:
- reader poll (card present or not)

effects:
- card line on the serial output
- buzzer on/off
- card session end
- blocking delays

*/

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effects {
    Output(String),
    BuzzerOn,
    BuzzerOff,
    SessionEnded,
    Delay(Duration),
}

/// Device doubles which report every interaction as an `Effects` value over a channel.
pub mod test {
    use std::collections::VecDeque;
    use std::io::{self, Write};

    use anyhow::Result;
    use crossbeam_channel::{self, Receiver, Sender};
    use embedded_hal_1::delay::DelayNs;

    use super::*;
    use crate::components::buzzer::Buzzer;
    use crate::components::rfid::{CardReader, Uid};
    use Effects::*;

    pub fn channel() -> (Sender<Effects>, Receiver<Effects>) {
        crossbeam_channel::unbounded()
    }

    fn emit(tx: &Sender<Effects>, effect: Effects) -> Result<()> {
        tx.send(effect)
            .map_err(|err| anyhow::Error::msg(format!("Failed to record effect: {}", err)))
    }

    /// Replays a fixed sequence of poll results, then reports no card forever.
    pub struct TestReader {
        polls: VecDeque<Result<Option<Uid>>>,
        tx: Sender<Effects>,
        broken_session: bool,
    }

    impl TestReader {
        pub fn new(tx: Sender<Effects>, polls: Vec<Result<Option<Uid>>>) -> Self {
            TestReader {
                polls: polls.into(),
                tx,
                broken_session: false,
            }
        }

        /// A reader whose cards never acknowledge HLTA.
        pub fn with_broken_session(tx: Sender<Effects>, polls: Vec<Result<Option<Uid>>>) -> Self {
            TestReader {
                broken_session: true,
                ..Self::new(tx, polls)
            }
        }
    }

    impl CardReader for TestReader {
        fn poll_for_card(&mut self) -> Result<Option<Uid>> {
            self.polls.pop_front().unwrap_or(Ok(None))
        }

        fn end_session(&mut self) -> Result<()> {
            if self.broken_session {
                return Err(anyhow::Error::msg("hlta(): Timeout"));
            }
            emit(&self.tx, SessionEnded)
        }
    }

    pub struct TestBuzzer {
        tx: Sender<Effects>,
        broken: bool,
    }

    impl TestBuzzer {
        pub fn new(tx: Sender<Effects>) -> Self {
            TestBuzzer { tx, broken: false }
        }

        /// A buzzer whose line can never be driven.
        pub fn broken(tx: Sender<Effects>) -> Self {
            TestBuzzer { tx, broken: true }
        }
    }

    impl Buzzer for TestBuzzer {
        fn description(&self) -> String {
            "test backend".to_string()
        }

        fn set_buzzer(&mut self, on: bool) -> Result<()> {
            if self.broken {
                return Err(anyhow::Error::msg("Failed to set buzzer line value"));
            }
            emit(&self.tx, if on { BuzzerOn } else { BuzzerOff })
        }
    }

    /// Collects written bytes and reports them as one `Output` per flush.
    pub struct TestOutput {
        tx: Sender<Effects>,
        buffer: Vec<u8>,
        broken: bool,
    }

    impl TestOutput {
        pub fn new(tx: Sender<Effects>) -> Self {
            TestOutput {
                tx,
                buffer: Vec::new(),
                broken: false,
            }
        }

        /// An output whose every write fails, like a disconnected tty.
        pub fn broken(tx: Sender<Effects>) -> Self {
            TestOutput {
                broken: true,
                ..Self::new(tx)
            }
        }
    }

    impl Write for TestOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output gone"));
            }
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.buffer.is_empty() {
                return Ok(());
            }
            let data = String::from_utf8_lossy(&self.buffer).to_string();
            self.buffer.clear();
            emit(&self.tx, Output(data)).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
        }
    }

    /// Records delays instead of sleeping.
    pub struct TestDelay {
        tx: Sender<Effects>,
    }

    impl TestDelay {
        pub fn new(tx: Sender<Effects>) -> Self {
            TestDelay { tx }
        }
    }

    impl DelayNs for TestDelay {
        fn delay_ns(&mut self, ns: u32) {
            let _ = self.tx.send(Delay(Duration::from_nanos(ns as u64)));
        }

        fn delay_us(&mut self, us: u32) {
            let _ = self.tx.send(Delay(Duration::from_micros(us as u64)));
        }

        fn delay_ms(&mut self, ms: u32) {
            let _ = self.tx.send(Delay(Duration::from_millis(ms as u64)));
        }
    }
}
