//! Streaming CSV reader.
//!
//! Opens a source file, detects its encoding and delimiter, exposes the
//! header, and yields data rows lazily. Fields are literal split + trim:
//! quoting and escape sequences are not interpreted, matching the wire
//! behavior downstream consumers rely on.
//!
//! Rows come back as [`RowEvent`]s — well-formed rows and malformed
//! lines travel on the same lazy stream so the consumer decides how to
//! account for each without ever blocking the reader.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use super::delimiter::{detect_delimiter, MAX_SAMPLE_LINES};
use super::encoding::{detect_encoding, DecodingLineReader, DETECTION_PREFIX_LEN};
use crate::error::FileFailure;

/// A parsed event from the row stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent {
    /// A well-formed data row. `line` is 1-based; the header is line 1
    /// of a file without leading blank lines.
    Row { fields: Vec<String>, line: u64 },
    /// A line whose column count does not match the header.
    Malformed { line: u64, message: String },
}

/// An opened CSV source with detected encoding, delimiter and header.
#[derive(Debug)]
pub struct CsvFile {
    path: PathBuf,
    encoding: &'static encoding_rs::Encoding,
    delimiter: String,
    header: Vec<String>,
    header_line: u64,
}

impl CsvFile {
    /// Open a file, detect encoding and delimiter, and read the header.
    ///
    /// Any failure here is structural: the file is missing or
    /// unreadable, has no header, or no delimiter candidate qualifies.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FileFailure> {
        let path = path.as_ref();
        let mut file = File::open(path).await.map_err(|e| {
            FileFailure::structural(format!("Cannot open '{}': {}", path.display(), e))
        })?;

        let encoding = {
            let mut prefix = vec![0u8; DETECTION_PREFIX_LEN];
            let mut filled = 0;
            loop {
                let n = file.read(&mut prefix[filled..]).await.map_err(|e| {
                    FileFailure::structural(format!("Cannot read '{}': {}", path.display(), e))
                })?;
                if n == 0 {
                    break;
                }
                filled += n;
                if filled == prefix.len() {
                    break;
                }
            }
            detect_encoding(&prefix[..filled])
        };

        file.seek(std::io::SeekFrom::Start(0)).await.map_err(|e| {
            FileFailure::structural(format!("Cannot read '{}': {}", path.display(), e))
        })?;

        // Sample the first non-blank lines, header included.
        let mut reader = DecodingLineReader::new(file, encoding);
        let mut samples: Vec<String> = Vec::new();
        let mut header_line = 0u64;
        let mut line_no = 0u64;
        while samples.len() < MAX_SAMPLE_LINES {
            let Some(line) = reader.next_line().await.map_err(|e| {
                FileFailure::structural(format!("Cannot read '{}': {}", path.display(), e))
            })?
            else {
                break;
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            if samples.is_empty() {
                header_line = line_no;
            }
            samples.push(line);
        }

        if samples.is_empty() {
            return Err(FileFailure::structural(format!(
                "File '{}' has no header line",
                path.display()
            )));
        }

        let delimiter = detect_delimiter(&samples).ok_or_else(|| {
            FileFailure::structural(format!(
                "Could not detect a delimiter for '{}'",
                path.display()
            ))
        })?;

        let header: Vec<String> = samples[0]
            .split(delimiter.as_str())
            .map(|f| f.trim().to_string())
            .collect();

        if header.iter().all(String::is_empty) {
            return Err(FileFailure::structural(format!(
                "File '{}' has an empty header",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            encoding,
            delimiter,
            header,
            header_line,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        self.encoding
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Begin streaming data rows (everything after the header).
    pub async fn rows(&self, cancel: CancellationToken) -> Result<RowStream, FileFailure> {
        let file = File::open(&self.path).await.map_err(|e| {
            FileFailure::structural(format!("Cannot open '{}': {}", self.path.display(), e))
        })?;
        let mut reader = DecodingLineReader::new(file, self.encoding);

        // Skip past the header.
        let mut line_no = 0u64;
        while line_no < self.header_line {
            if reader
                .next_line()
                .await
                .map_err(|e| {
                    FileFailure::structural(format!(
                        "Cannot read '{}': {}",
                        self.path.display(),
                        e
                    ))
                })?
                .is_none()
            {
                break;
            }
            line_no += 1;
        }

        Ok(RowStream {
            reader,
            delimiter: self.delimiter.clone(),
            expected_columns: self.header.len(),
            line: line_no,
            cancel,
        })
    }
}

/// Read just the header columns of a file.
pub async fn read_header(path: impl AsRef<Path>) -> Result<Vec<String>, FileFailure> {
    Ok(CsvFile::open(path).await?.header)
}

/// Lazy stream of data rows.
///
/// Cancellation is polled at the top of each line; once the token is
/// cancelled the stream reports end-of-input without reading further.
pub struct RowStream {
    reader: DecodingLineReader,
    delimiter: String,
    expected_columns: usize,
    line: u64,
    cancel: CancellationToken,
}

impl RowStream {
    /// Pull the next event, or `None` at end of input or on cancellation.
    ///
    /// Blank lines are skipped silently and do not produce events.
    pub async fn next_event(&mut self) -> std::io::Result<Option<RowEvent>> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let Some(raw) = self.reader.next_line().await? else {
                return Ok(None);
            };
            self.line += 1;

            if raw.trim().is_empty() {
                continue;
            }

            let fields: Vec<String> = raw
                .split(self.delimiter.as_str())
                .map(|f| f.trim().to_string())
                .collect();

            if fields.len() != self.expected_columns {
                return Ok(Some(RowEvent::Malformed {
                    line: self.line,
                    message: format!(
                        "Expected {} columns but found {}",
                        self.expected_columns,
                        fields.len()
                    ),
                }));
            }

            return Ok(Some(RowEvent::Row {
                fields,
                line: self.line,
            }));
        }
    }
}
