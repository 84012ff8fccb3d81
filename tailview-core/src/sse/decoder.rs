use std::time::Duration;

const BOM: char = '\u{feff}';

/// One dispatched event block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Value of the last `event:` field, if any.
    pub event: Option<String>,
    /// Value of the `id:` field inside this block, if any.
    pub id: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes can be fed in arbitrarily sized chunks; line terminators (`\r\n`,
/// `\n`, `\r`) may straddle chunk boundaries. The last-event-id and the
/// reconnection time persist across blocks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    skip_lf: bool,
    seen_first_line: bool,
    event_type: String,
    data: String,
    block_id: Option<String>,
    last_event_id: String,
    reconnection_time: Option<Duration>,
}

impl SseDecoder {
    /// Decoder with no id and no reconnection time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns every block completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\r' => {
                    self.skip_lf = true;
                    self.finish_line(&mut frames);
                }
                b'\n' => self.finish_line(&mut frames),
                other => self.line.push(other),
            }
        }

        frames
    }

    /// Last id seen on the stream; empty when none was sent or it was reset.
    #[must_use]
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Reconnection delay requested by the server through `retry:`.
    #[must_use]
    pub fn reconnection_time(&self) -> Option<Duration> {
        self.reconnection_time
    }

    /// Drops any half-received line or block, keeping the last-event-id and
    /// reconnection time for the next connection.
    pub fn reset_pending(&mut self) {
        self.line.clear();
        self.skip_lf = false;
        self.seen_first_line = false;
        self.event_type.clear();
        self.data.clear();
        self.block_id = None;
    }

    fn finish_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        // Multi-byte UTF-8 sequences never contain CR or LF bytes, so lossy
        // decoding per line cannot split a character.
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.seen_first_line {
            self.seen_first_line = true;
            line = line.strip_prefix(BOM).unwrap_or(line);
        }

        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        self.process_field(field, value);
    }

    fn process_field(&mut self, field: &str, value: &str) {
        match field {
            "event" => {
                self.event_type.clear();
                self.event_type.push_str(value);
            }
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = value.to_string();
                    self.block_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(millis) = value.parse::<u64>() {
                        self.reconnection_time = Some(Duration::from_millis(millis));
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let block_id = self.block_id.take();
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseFrame {
            event: (!event_type.is_empty()).then_some(event_type),
            id: block_id.filter(|id| !id.is_empty()),
            data,
        })
    }
}
