//! Incremental UTF-8 decoding of response body chunks.

use rivulet_types::EventSourceError;

const BOM: char = '\u{feff}';

/// Stateful decoder that turns successive byte chunks into text.
///
/// A multi-byte sequence split across chunk boundaries is held back until the
/// rest of it arrives. A byte order mark at the very start of the stream is
/// dropped.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    started: bool,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, EventSourceError> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let valid_up_to = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            // Truncated sequence at the end: wait for more bytes.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(EventSourceError::Decode(e.to_string())),
        };
        self.pending = bytes.split_off(valid_up_to);

        let mut text =
            String::from_utf8(bytes).map_err(|e| EventSourceError::Decode(e.to_string()))?;

        if !self.started && !text.is_empty() {
            self.started = true;
            if text.starts_with(BOM) {
                text.drain(..BOM.len_utf8());
            }
        }

        Ok(text)
    }

    /// Returns `true` if an incomplete multi-byte sequence is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"data: hi\n").unwrap(), "data: hi\n");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn codepoint_split_across_chunks() {
        let bytes = "héllo 🎉".as_bytes();
        // 'é' is two bytes starting at index 1; split inside it.
        let mut decoder = Utf8Decoder::new();
        let first = decoder.decode(&bytes[..2]).unwrap();
        assert_eq!(first, "h");
        assert!(decoder.has_pending());

        // Split the four-byte emoji as well.
        let split = bytes.len() - 2;
        let second = decoder.decode(&bytes[2..split]).unwrap();
        let third = decoder.decode(&bytes[split..]).unwrap();
        assert_eq!(format!("{first}{second}{third}"), "héllo 🎉");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn one_byte_at_a_time() {
        let text = "日本語: ✓";
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(out, text);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let mut decoder = Utf8Decoder::new();
        let err = decoder.decode(&[b'a', 0xff, b'b']).unwrap_err();
        assert!(matches!(err, EventSourceError::Decode(_)));
    }

    #[test]
    fn leading_bom_is_dropped_once() {
        let mut decoder = Utf8Decoder::new();
        let bom = "\u{feff}".as_bytes();
        assert_eq!(decoder.decode(&bom[..1]).unwrap(), "");
        assert_eq!(decoder.decode(&bom[1..]).unwrap(), "");
        assert_eq!(decoder.decode(b"data").unwrap(), "data");
        // A later BOM is ordinary content.
        assert_eq!(decoder.decode(bom).unwrap(), "\u{feff}");
    }
}
