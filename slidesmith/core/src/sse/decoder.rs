//! Incremental decoding of an SSE byte stream
//!
//! Network reads split the body at arbitrary byte offsets, including inside a
//! multi-byte character or in the middle of a line. Both decoders here carry
//! the incomplete tail over to the next call.

/// Stateful UTF-8 decoder
///
/// Bytes of an incomplete trailing sequence are held back until the next
/// call. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing pending
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next run of bytes
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    // valid_up_to guarantees this range is UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush whatever is still pending at end of input
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    /// Whether bytes are held back
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// One dispatched SSE event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`message` when the frame had no `event:` line)
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
}

/// SSE line framing over a byte stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    line: String,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every frame completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let text = self.utf8.decode(bytes);
        self.line.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let raw: String = self.line.drain(..=pos).collect();
            let line = raw.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of input: process the trailing line and any pending frame
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let rest = self.utf8.finish();
        self.line.push_str(&rest);

        let mut frames = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        if let Some(frame) = self.dispatch() {
            frames.push(frame);
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            // id and retry carry nothing the adapter uses
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
