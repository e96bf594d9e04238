//! Source encoding detection and incremental decoding.
//!
//! Detection looks at the first 4 KiB only: a BOM wins outright, a
//! buffer that decodes cleanly as UTF-8 is treated as UTF-8, and
//! anything else falls back to Windows-1252.

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Number of bytes inspected for encoding detection.
pub const DETECTION_PREFIX_LEN: usize = 4096;

const READ_CHUNK_LEN: usize = 8192;

/// Detect the encoding of a file from its leading bytes.
pub fn detect_encoding(prefix: &[u8]) -> &'static Encoding {
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return UTF_8;
    }
    if prefix.starts_with(&[0xFF, 0xFE]) {
        return UTF_16LE;
    }
    if prefix.starts_with(&[0xFE, 0xFF]) {
        return UTF_16BE;
    }

    match std::str::from_utf8(prefix) {
        Ok(_) => UTF_8,
        // A multi-byte sequence cut off by the 4 KiB window is still UTF-8.
        Err(e) if e.error_len().is_none() => UTF_8,
        Err(_) => WINDOWS_1252,
    }
}

/// Incremental line reader that decodes raw bytes through a fixed
/// encoding and yields one line at a time.
///
/// The file is never materialized: bytes are pulled in 8 KiB chunks and
/// decoded into a rolling text buffer that is drained line by line.
/// Handles `\n` and `\r\n` endings; a final line without a terminator is
/// still yielded.
pub struct DecodingLineReader {
    file: File,
    decoder: Decoder,
    pending: String,
    eof: bool,
    drained: bool,
}

impl DecodingLineReader {
    pub fn new(file: File, encoding: &'static Encoding) -> Self {
        Self {
            file,
            decoder: encoding.new_decoder_with_bom_removal(),
            pending: String::new(),
            eof: false,
            drained: false,
        }
    }

    /// Read the next line, or `None` at end of file.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.pending.find('\n') {
                let rest = self.pending.split_off(pos + 1);
                let mut line = std::mem::replace(&mut self.pending, rest);
                line.truncate(line.trim_end_matches(['\n', '\r']).len());
                return Ok(Some(line));
            }

            if self.eof {
                if self.drained || self.pending.is_empty() {
                    return Ok(None);
                }
                self.drained = true;
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let mut chunk = [0u8; READ_CHUNK_LEN];
            let n = self.file.read(&mut chunk).await?;
            let last = n == 0;

            let needed = self
                .decoder
                .max_utf8_buffer_length(n)
                .unwrap_or(n * 3 + 4);
            self.pending.reserve(needed);
            let (result, _, _) = self.decoder.decode_to_string(&chunk[..n], &mut self.pending, last);
            debug_assert!(matches!(result, CoderResult::InputEmpty));

            if last {
                self.eof = true;
            }
        }
    }
}
