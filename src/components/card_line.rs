//! The line format spoken on the serial link: `[CARD]` followed by the UID in uppercase hex.

use std::fmt;
use std::io::{self, Write};

use crate::components::rfid::{ParseUidError, Uid};

pub const CARD_LINE_PREFIX: &str = "[CARD]";

pub fn format_card_line(uid: &Uid) -> String {
    format!("{}{}", CARD_LINE_PREFIX, uid)
}

/// Writes a single card line terminated by a bare `\n` and flushes the writer.
/// Readers should trim a trailing `\r`, since older firmware sent CRLF.
pub fn write_card_line<W: Write + ?Sized>(w: &mut W, uid: &Uid) -> io::Result<()> {
    let line = format!("{}\n", format_card_line(uid));
    w.write_all(line.as_bytes())?;
    w.flush()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingPrefix,
    Uid(ParseUidError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingPrefix => write!(f, "Line does not start with {}", CARD_LINE_PREFIX),
            ParseError::Uid(err) => write!(f, "Invalid card UID: {}", err),
        }
    }
}

impl std::error::Error for ParseError {}

pub fn parse_card_line(line: &str) -> Result<Uid, ParseError> {
    let uid = line
        .trim()
        .strip_prefix(CARD_LINE_PREFIX)
        .ok_or(ParseError::MissingPrefix)?;
    uid.parse::<Uid>().map_err(ParseError::Uid)
}

/// Splits a byte stream into trimmed lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every line completed by them.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);
        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&line[..idx]);
            lines.push(line.trim().to_string());
        }
        lines
    }

    /// Drops a partially received line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
