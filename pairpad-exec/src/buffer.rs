//! Bounded terminal scrollback and chunk decoding.

/// Scrollback that keeps only the most recent `max_chars` characters.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    chars: usize,
    max_chars: usize,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            max_chars,
        }
    }

    /// Append `chunk`, dropping characters from the front past the bound.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chars += chunk.chars().count();

        if self.chars > self.max_chars {
            let excess = self.chars - self.max_chars;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map_or(self.text.len(), |(i, _)| i);
            self.text.drain(..cut);
            self.chars = self.max_chars;
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters, not bytes.
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

/// Incremental UTF-8 decoder for pipe chunks.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete tail; wait for more bytes
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
