//! Incremental Server-Sent Events parser for the stream transport.
//!
//! Bytes arrive in arbitrary chunks, possibly splitting a UTF-8 character or
//! a CRLF pair; complete events are emitted once their terminating blank line
//! has been seen.

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field; `message` when the server omits it.
    pub event_type: String,
    pub data: String,
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let decodable = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end: wait for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let bytes: Vec<u8> = self.pending.drain(..decodable).collect();
        self.buffer.push_str(&String::from_utf8_lossy(&bytes));

        if self.buffer.contains('\r') {
            // A trailing '\r' may be the first half of a CRLF.
            let held = self.buffer.ends_with('\r');
            let end = self.buffer.len() - usize::from(held);
            let mut normalized = self.buffer[..end].replace("\r\n", "\n").replace('\r', "\n");
            if held {
                normalized.push('\r');
            }
            self.buffer = normalized;
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block[..pos]) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_type = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event_type: event_type.unwrap_or_else(|| "message".to_string()),
        data: data_lines.join("\n"),
    })
}
