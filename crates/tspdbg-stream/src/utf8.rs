//! UTF-8 decoding of raw pipe reads.

/// Decodes byte chunks into text, carrying an incomplete trailing sequence
/// over to the next chunk. Invalid bytes become U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a sequence.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
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
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }

    /// Flush any held-back bytes, e.g. at end of stream.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut c = Utf8Chunker::new();
        assert_eq!(c.decode(b"hello"), "hello");
        assert!(c.pending().is_empty());
    }

    #[test]
    fn split_multibyte_sequence_is_carried() {
        let mut c = Utf8Chunker::new();
        let bytes = "µs".as_bytes();
        assert_eq!(c.decode(&bytes[..1]), "");
        assert_eq!(c.pending().len(), 1);
        assert_eq!(c.decode(&bytes[1..]), "µs");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut c = Utf8Chunker::new();
        assert_eq!(c.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_incomplete_tail() {
        let mut c = Utf8Chunker::new();
        c.decode(&"é".as_bytes()[..1]);
        assert_eq!(c.finish(), "\u{FFFD}");
        assert!(c.pending().is_empty());
    }
}
