//! `text/event-stream` frame reader.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};

/// One dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SseError {
    /// A frame carried bytes that are not UTF-8. The frame is skipped and the
    /// stream stays usable.
    #[error("event stream frame is not valid UTF-8")]
    InvalidUtf8,

    /// The read timed out with nothing new. Partial input is kept.
    #[error("no data within the read timeout")]
    Idle,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SseError {
    /// Whether reading can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidUtf8 | Self::Idle)
    }
}

/// Iterator over the frames of an event stream.
///
/// Ends on EOF; a frame cut off by EOF is discarded.
pub struct SseReader<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    pending: SseFrame,
    has_data: bool,
    invalid: bool,
}

impl<R: Read> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            pending: SseFrame::default(),
            has_data: false,
            invalid: false,
        }
    }

    fn take_pending(&mut self) -> Option<SseFrame> {
        let frame = std::mem::take(&mut self.pending);
        let had_data = std::mem::replace(&mut self.has_data, false);
        had_data.then_some(frame)
    }

    fn push_field(&mut self, line: &str) {
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_owned()),
            "id" => self.pending.id = Some(value.to_owned()),
            _ => {}
        }
    }
}

impl<R: Read> Iterator for SseReader<R> {
    type Item = Result<SseFrame, SseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let raw = std::mem::take(&mut self.line);
                    let Ok(text) = std::str::from_utf8(&raw) else {
                        self.invalid = true;
                        continue;
                    };
                    let line = text.trim_end_matches(['\n', '\r']);
                    if line.is_empty() {
                        if std::mem::take(&mut self.invalid) {
                            self.take_pending();
                            return Some(Err(SseError::InvalidUtf8));
                        }
                        if let Some(frame) = self.take_pending() {
                            return Some(Ok(frame));
                        }
                        continue;
                    }
                    if line.starts_with(':') {
                        continue;
                    }
                    self.push_field(line);
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error)
                    if matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
                {
                    return Some(Err(SseError::Idle));
                }
                Err(error) => return Some(Err(error.into())),
            }
        }
    }
}
