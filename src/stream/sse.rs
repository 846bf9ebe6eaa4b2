//! Incremental SSE demultiplexing.
//!
//! Bytes arrive from the backend in arbitrary chunks. They are decoded as
//! UTF-8 with carry-over for characters split across reads, then cut into
//! frames on the blank-line separator. An unterminated trailing frame is kept
//! until the next read so a frame (or the separator itself) straddling two
//! chunks is reassembled before it reaches the transcoder.

use memchr::memmem;
use std::sync::LazyLock;

use crate::error::StreamAbortError;

pub const FRAME_SEPARATOR: &str = "\n\n";

static FRAME_SEPARATOR_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(FRAME_SEPARATOR.as_bytes()));

// ---------------------------------------------------------------------------
// Utf8StreamDecoder: UTF-8 decoding with carry-over
// ---------------------------------------------------------------------------

/// Streaming UTF-8 decoder.
///
/// A multi-byte sequence cut off at the end of a chunk is held back and
/// completed by the next chunk. Invalid sequences are reported as errors.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    remainder: Vec<u8>,
}

impl Utf8StreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the complete characters to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbortError::Decode`] on an invalid byte sequence.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String) -> Result<(), StreamAbortError> {
        if self.remainder.is_empty() {
            let tail = decode_prefix(bytes, out)?;
            self.remainder.extend_from_slice(tail);
            return Ok(());
        }

        self.remainder.extend_from_slice(bytes);
        let pending = std::mem::take(&mut self.remainder);
        let tail = decode_prefix(&pending, out)?;
        self.remainder.extend_from_slice(tail);
        Ok(())
    }

    /// Signal end of input.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbortError::Decode`] when the input ended in the middle
    /// of a multi-byte character.
    pub fn finish(&mut self) -> Result<(), StreamAbortError> {
        if self.remainder.is_empty() {
            return Ok(());
        }
        let dangling = self.remainder.len();
        self.remainder.clear();
        Err(StreamAbortError::Decode(format!(
            "stream ended inside a multi-byte character ({dangling} dangling bytes)"
        )))
    }
}

/// Append the longest valid prefix of `bytes` to `out` and return the
/// incomplete tail.
fn decode_prefix<'a>(bytes: &'a [u8], out: &mut String) -> Result<&'a [u8], StreamAbortError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            out.push_str(text);
            Ok(&[])
        }
        Err(e) => {
            if e.error_len().is_some() {
                return Err(StreamAbortError::Decode(e.to_string()));
            }
            let (valid, tail) = bytes.split_at(e.valid_up_to());
            // valid_up_to marks a UTF-8 boundary, so this cannot fail.
            out.push_str(std::str::from_utf8(valid).unwrap_or_default());
            Ok(tail)
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSplitter: blank-line framing with partial-frame carry-over
// ---------------------------------------------------------------------------

/// Splits decoded text into SSE frames on `\n\n`.
///
/// Yielded frames have the separator stripped; empty segments (runs of blank
/// lines) are skipped.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: String,
    scan_from: usize,
}

impl FrameSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text and append complete frames into a caller-provided buffer.
    pub fn feed_into(&mut self, text: &str, out: &mut Vec<String>) {
        self.buffer.push_str(text);

        let mut frame_start = 0usize;
        let mut scan_from = self.scan_from;
        while let Some(rel) = FRAME_SEPARATOR_FINDER.find(&self.buffer.as_bytes()[scan_from..]) {
            let sep = scan_from + rel;
            if sep > frame_start {
                out.push(self.buffer[frame_start..sep].to_string());
            }
            frame_start = sep + FRAME_SEPARATOR.len();
            scan_from = frame_start;
        }

        if frame_start == self.buffer.len() {
            self.buffer.clear();
        } else if frame_start > 0 {
            self.buffer.drain(..frame_start);
        }
        // Everything but a trailing '\n' has been scanned; that one may pair
        // with a '\n' at the start of the next chunk.
        self.scan_from = self.buffer.len().saturating_sub(1);
    }

    /// Flush the trailing unterminated segment, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.scan_from = 0;
        if self.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }
}

// ---------------------------------------------------------------------------
// SseDemultiplexer: bytes in, frames out
// ---------------------------------------------------------------------------

/// Decoder and splitter combined: raw backend chunks in, SSE frames out.
#[derive(Debug, Default)]
pub struct SseDemultiplexer {
    decoder: Utf8StreamDecoder,
    splitter: FrameSplitter,
    scratch: String,
}

impl SseDemultiplexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one raw chunk and return the frames it completes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbortError::Decode`] when the chunk is not valid UTF-8.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, StreamAbortError> {
        let mut frames = Vec::new();
        self.push_into(chunk, &mut frames)?;
        Ok(frames)
    }

    /// Push one raw chunk and append the frames it completes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbortError::Decode`] when the chunk is not valid UTF-8.
    pub fn push_into(
        &mut self,
        chunk: &[u8],
        frames: &mut Vec<String>,
    ) -> Result<(), StreamAbortError> {
        self.scratch.clear();
        self.decoder.decode_into(chunk, &mut self.scratch)?;
        self.splitter.feed_into(&self.scratch, frames);
        Ok(())
    }

    /// Signal end of input and return the final unterminated segment.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAbortError::Decode`] when the input ended inside a
    /// multi-byte character.
    pub fn finish(&mut self) -> Result<Option<String>, StreamAbortError> {
        self.decoder.finish()?;
        Ok(self.splitter.finish())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    impl FrameSplitter {
        fn feed(&mut self, text: &str) -> Vec<String> {
            let mut out = Vec::new();
            self.feed_into(text, &mut out);
            out
        }
    }

    fn split_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut demux = SseDemultiplexer::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            demux.push_into(chunk, &mut frames).expect("valid utf-8");
        }
        if let Some(last) = demux.finish().expect("complete utf-8") {
            frames.push(last);
        }
        frames
    }

    // -- FrameSplitter tests --

    #[test]
    fn test_split_complete_frames() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.feed("data: one\n\ndata: two\n\n");
        assert_eq!(frames, vec!["data: one", "data: two"]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_partial_frame_is_carried_over() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.feed("data: {\"resp").is_empty());
        assert!(splitter.feed("onse\":1}").is_empty());
        let frames = splitter.feed("\n\ndata: next");
        assert_eq!(frames, vec!["data: {\"response\":1}"]);
        assert_eq!(splitter.finish().as_deref(), Some("data: next"));
    }

    #[test]
    fn test_separator_straddling_chunks() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.feed("data: a\n").is_empty());
        let frames = splitter.feed("\ndata: b\n\n");
        assert_eq!(frames, vec!["data: a", "data: b"]);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.feed("\n\n\n\ndata: x\n\n\n\n");
        assert_eq!(frames, vec!["data: x"]);
    }

    #[test]
    fn test_odd_newline_run_keeps_leading_newline() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.feed("a\n\n\nb\n\n");
        assert_eq!(frames, vec!["a", "\nb"]);
    }

    // -- Utf8StreamDecoder tests --

    #[test]
    fn test_decoder_carries_split_multibyte_char() {
        let text = "caf\u{e9} \u{1f5fa}";
        let bytes = text.as_bytes();
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();
        for byte in bytes {
            decoder
                .decode_into(std::slice::from_ref(byte), &mut out)
                .unwrap();
        }
        decoder.finish().unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_decoder_rejects_invalid_sequence() {
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();
        let err = decoder.decode_into(b"ok \xff\xfe", &mut out).unwrap_err();
        assert!(matches!(err, StreamAbortError::Decode(_)));
    }

    #[test]
    fn test_decoder_finish_with_dangling_bytes_fails() {
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();
        decoder.decode_into(&[0xe2, 0x82], &mut out).unwrap();
        assert!(out.is_empty());
        assert!(decoder.finish().is_err());
    }

    // -- SseDemultiplexer tests --

    #[test]
    fn test_push_returns_completed_frames() {
        let mut demux = SseDemultiplexer::new();
        assert!(demux.push(b"data: a\n").unwrap().is_empty());
        assert_eq!(demux.push(b"\n").unwrap(), vec!["data: a"]);
        assert!(demux.finish().unwrap().is_none());
    }

    #[test]
    fn test_final_segment_without_separator_is_flushed() {
        let frames = split_all(&[b"data: first\n\ndata: last"]);
        assert_eq!(frames, vec!["data: first", "data: last"]);
    }

    #[test]
    fn test_chunking_does_not_change_frames() {
        let text = "data: {\"response\":{\"type\":\"text_response\",\"content\":\"Gr\u{fc}\u{df}e\"}}\n\n\
                    : keep-alive\n\n\
                    data: {not valid json\n\n\
                    data: {\"response\":{\"type\":\"map_focus\",\"data\":{\"location_name\":\"M\u{fc}nchen\"}}}\n\n";
        let bytes = text.as_bytes();
        let whole = split_all(&[bytes]);
        assert_eq!(whole.len(), 4);

        for chunk_size in 1..=bytes.len() {
            let chunks: Vec<&[u8]> = bytes.chunks(chunk_size).collect();
            assert_eq!(
                split_all(&chunks),
                whole,
                "chunk size {chunk_size} changed the frame sequence"
            );
        }

        for cut in 1..bytes.len() {
            let (a, b) = bytes.split_at(cut);
            assert_eq!(split_all(&[a, b]), whole, "cut at {cut}");
        }
    }
}
