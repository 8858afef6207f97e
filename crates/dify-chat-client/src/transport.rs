use tracing::debug;

use crate::stream::StreamRecord;

/// Prefix of a data line in the event stream.
pub const DATA_PREFIX: &str = "data: ";
/// Blank line separating two records.
pub const RECORD_DELIMITER: &str = "\n\n";

/// Decodes a single `data: {json}` line.
///
/// Returns `None` for lines without the data prefix (comments, keep-alives,
/// `event:` lines), for payloads that are not JSON, and for JSON that is not
/// an object with a string `event`. None of these is an error for the stream
/// as a whole. Fields of unexpected type do not reject a record.
pub fn decode_frame(line: &str) -> Option<StreamRecord> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let value = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, len = payload.len(), "skipping undecodable data frame");
            return None;
        }
    };
    let record = StreamRecord::from_value(value);
    if record.is_none() {
        debug!(len = payload.len(), "skipping data frame without an event");
    }
    record
}

fn decode_record(raw: &str) -> Option<StreamRecord> {
    if raw.trim().is_empty() {
        return None;
    }
    decode_frame(raw)
}

/// Incremental UTF-8 decoder.
///
/// Bytes of a character split across two chunks are held back until the
/// rest arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Emits whatever is still held back. An unfinished character becomes
    /// U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Turns arbitrarily split byte chunks into complete stream records.
///
/// Owns the text buffer for one stream session: every chunk is decoded and
/// appended, complete records (terminated by a blank line) are cut from the
/// front, and the unterminated tail is kept for the next chunk.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    decoder: Utf8Decoder,
    buffer: String,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the records it completed, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamRecord> {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);

        let mut records = Vec::new();
        let mut consumed = 0;
        while let Some(rel) = self.buffer[consumed..].find(RECORD_DELIMITER) {
            let end = consumed + rel;
            if let Some(record) = decode_record(&self.buffer[consumed..end]) {
                records.push(record);
            }
            consumed = end + RECORD_DELIMITER.len();
        }
        self.buffer.drain(..consumed);
        records
    }

    /// Ends the session: flushes the decoder and makes a best-effort attempt
    /// to decode whatever is left as one final record.
    pub fn finish(&mut self) -> Option<StreamRecord> {
        let tail = self.decoder.flush();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        if !rest.trim().is_empty() {
            debug!(len = rest.len(), "decoding unterminated trailing record");
        }
        decode_record(&rest)
    }

    /// Text received but not yet part of a complete record.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}
