//! Frame splitting for the streamed analysis response
//!
//! The response body is a sequence of text frames, each terminated by a
//! blank line (`"\n\n"`). Chunk boundaries from the transport are arbitrary:
//! a chunk may end inside a multi-byte UTF-8 sequence, inside a frame, or
//! between the two newlines of a delimiter. [`FrameSplitter`] keeps the
//! carry-over state so that the frames it yields depend only on the bytes
//! received, never on how they were chunked.

use super::decode::data_payload;
use tracing::{debug, trace};

/// Blank line terminating every frame
pub const FRAME_DELIMITER: &str = "\n\n";

/// Incremental UTF-8 decoder
///
/// Incomplete sequences at the end of a chunk are held back until the next
/// call. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, prefixed by any bytes held back from the last call
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            // Sequence cut off by the chunk boundary
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end-of-stream; a dangling partial sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Bytes currently held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits decoded text into complete data frames
#[derive(Debug, Default)]
pub struct FrameSplitter {
    decoder: Utf8StreamDecoder,
    buffer: String,
    frames_emitted: usize,
    frames_discarded: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and collect every frame it completes
    ///
    /// Only frames carrying the `data: ` prefix are returned; everything
    /// else (comments, heartbeats, empty frames) is dropped here.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_complete()
    }

    /// End-of-stream: flush the decoder and drop any unterminated fragment
    ///
    /// Returns the discarded fragment, if there was one.
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);

        if self.buffer.is_empty() {
            return None;
        }

        let fragment = std::mem::take(&mut self.buffer);
        debug!(
            bytes = fragment.len(),
            "Discarding unterminated frame fragment at end of stream"
        );
        Some(fragment)
    }

    /// Text carried over to the next call
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    pub fn frames_discarded(&self) -> usize {
        self.frames_discarded
    }

    fn drain_complete(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].find(FRAME_DELIMITER) {
            let end = start + offset;
            let frame = &self.buffer[start..end];

            if data_payload(frame).is_some() {
                frames.push(frame.to_string());
            } else {
                trace!(frame, "Dropping frame without data prefix");
                self.frames_discarded += 1;
            }

            start = end + FRAME_DELIMITER.len();
        }

        self.buffer.drain(..start);
        self.frames_emitted += frames.len();
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = FrameSplitter::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(splitter.push(chunk));
        }
        frames
    }

    #[test]
    fn test_single_chunk_multiple_frames() {
        let frames = split_all(&[b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"]);
        assert_eq!(frames, vec!["data: {\"a\":1}", "data: {\"b\":2}"]);
    }

    #[test]
    fn test_partial_frame_is_carried_over() {
        let mut splitter = FrameSplitter::new();

        assert!(splitter.push(b"data: {\"a\"").is_empty());
        assert_eq!(splitter.buffered(), "data: {\"a\"");

        let frames = splitter.push(b":1}\n\ndata: {");
        assert_eq!(frames, vec!["data: {\"a\":1}"]);
        assert_eq!(splitter.buffered(), "data: {");
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let frames = split_all(&[b"data: x\n", b"\ndata: y\n", b"\n"]);
        assert_eq!(frames, vec!["data: x", "data: y"]);
    }

    #[test]
    fn test_frames_without_prefix_are_dropped() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(b": heartbeat\n\nevent: ping\n\n\n\ndata: z\n\n");
        assert_eq!(frames, vec!["data: z"]);
        assert_eq!(splitter.frames_emitted(), 1);
        assert_eq!(splitter.frames_discarded(), 3);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let bytes = "data: {\"analysis\":[\"café\"]}\n\n".as_bytes();
        // split inside the two-byte 'é'
        let cut = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let frames = split_all(&[&bytes[..cut], &bytes[cut..]]);
        assert_eq!(frames, vec!["data: {\"analysis\":[\"café\"]}"]);
    }

    #[test]
    fn test_finish_discards_unterminated_fragment() {
        let mut splitter = FrameSplitter::new();
        assert_eq!(splitter.push(b"data: done\n\ndata: trunc"), vec!["data: done"]);
        assert_eq!(splitter.finish().as_deref(), Some("data: trunc"));
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_holds_back_incomplete_sequence() {
        let mut decoder = Utf8StreamDecoder::new();
        let euro = "€".as_bytes();
        assert_eq!(decoder.decode(&euro[..2]), "");
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.decode(&euro[2..]), "€");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_finish_flushes_dangling_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(&"€".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }
}
