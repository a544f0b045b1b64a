//! Purpose: Decode `\n`-delimited lines from a byte channel while tracking line start offsets.
//! Exports: `LineScanner`, `ScanConfig`, `TrailingLine`, `DEFAULT_BUFFER_BYTES`.
//! Role: Lowest layer of the record pipeline; owns the channel and its read buffer.
//! Invariants: `current_line_start <= next_line_start` at all times.
//! Invariants: An aligned scanner never reports a line that began before its channel position.
//! Invariants: Exhaustion is sticky; once `read_next_line` returns false the channel is not read again.
//! Invariants: Buffering is bounded by one chunk of look-ahead past the last delimiter.
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use bstr::ByteSlice;
use tracing::{debug, trace, warn};

use crate::core::error::{io_error, Error, ErrorKind};

pub const DEFAULT_BUFFER_BYTES: usize = 1024;

const DELIMITER: u8 = b'\n';

/// What to do with bytes after the last delimiter when the channel ends.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TrailingLine {
    /// Discard the fragment. Every line is assumed to end with the delimiter.
    #[default]
    Drop,
    /// Report the fragment as a final line.
    Emit,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanConfig {
    pub buffer_bytes: usize,
    pub max_line_bytes: Option<usize>,
    pub trailing: TrailingLine,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            max_line_bytes: None,
            trailing: TrailingLine::Drop,
        }
    }
}

impl ScanConfig {
    pub fn with_buffer_bytes(mut self, buffer_bytes: usize) -> Self {
        self.buffer_bytes = buffer_bytes;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = Some(max_line_bytes);
        self
    }

    pub fn with_trailing(mut self, trailing: TrailingLine) -> Self {
        self.trailing = trailing;
        self
    }
}

enum Scanned {
    Line { consumed: u64 },
    Fragment { consumed: u64 },
    Eof,
}

#[derive(Debug)]
pub struct LineScanner<R> {
    inner: BufReader<R>,
    config: ScanConfig,
    scratch: Vec<u8>,
    current: Option<String>,
    current_line_start: u64,
    next_line_start: u64,
    exhausted: bool,
}

impl<R: Read> LineScanner<R> {
    /// Scans a forward-only channel from offset 0 with the default config.
    pub fn new(reader: R) -> Self {
        Self::starting_at(reader, 0, ScanConfig::default())
    }

    /// Scans a channel the caller already positioned at `offset`.
    ///
    /// Without positioning there is no way to look at the byte before `offset`,
    /// so the first line is assumed to begin exactly there.
    pub fn starting_at(reader: R, offset: u64, config: ScanConfig) -> Self {
        let capacity = config.buffer_bytes.max(1);
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            config,
            scratch: Vec::new(),
            current: None,
            current_line_start: offset,
            next_line_start: offset,
            exhausted: false,
        }
    }

    /// Advances past the next delimiter and makes the bytes before it the current line.
    ///
    /// Returns `Ok(false)` once the channel has no further complete line. A read
    /// error leaves the scanner exhausted.
    pub fn read_next_line(&mut self) -> Result<bool, Error> {
        if self.exhausted {
            return Ok(false);
        }
        self.scratch.clear();
        let scanned = match self.scan_to_delimiter(true) {
            Ok(scanned) => scanned,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };
        let consumed = match scanned {
            Scanned::Line { consumed } => consumed,
            Scanned::Fragment { consumed } => {
                self.exhausted = true;
                match self.config.trailing {
                    TrailingLine::Emit => consumed,
                    TrailingLine::Drop => {
                        warn!(
                            offset = self.next_line_start,
                            bytes = consumed,
                            "dropping unterminated trailing line"
                        );
                        return Ok(false);
                    }
                }
            }
            Scanned::Eof => {
                self.exhausted = true;
                return Ok(false);
            }
        };

        self.current_line_start = self.next_line_start;
        self.next_line_start += consumed;
        // Only the CR before the delimiter goes; other whitespace is field data.
        let content = self
            .scratch
            .strip_suffix(b"\r")
            .unwrap_or(self.scratch.as_slice());
        self.current = Some(content.to_str_lossy().into_owned());
        trace!(
            offset = self.current_line_start,
            bytes = consumed,
            "scanned line"
        );
        Ok(true)
    }

    /// The most recently scanned line, without its terminator.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_line_start(&self) -> u64 {
        self.current_line_start
    }

    pub fn next_line_start(&self) -> u64 {
        self.next_line_start
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Consumes bytes through the next delimiter, copying the line body into
    /// `scratch` when `keep` is set.
    fn scan_to_delimiter(&mut self, keep: bool) -> Result<Scanned, Error> {
        let mut consumed = 0u64;
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(io_error(err, "failed to read from channel")
                        .with_offset(self.next_line_start + consumed));
                }
            };
            if available.is_empty() {
                if consumed == 0 {
                    return Ok(Scanned::Eof);
                }
                return Ok(Scanned::Fragment { consumed });
            }

            let (take, found) = match available.find_byte(DELIMITER) {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            if keep {
                let body = if found { take - 1 } else { take };
                self.scratch.extend_from_slice(&available[..body]);
            }
            self.inner.consume(take);
            consumed += take as u64;

            if keep {
                if let Some(max) = self.config.max_line_bytes {
                    if self.scratch.len() > max {
                        return Err(Error::new(ErrorKind::Malformed)
                            .with_message(format!("line exceeds size limit of {max} bytes"))
                            .with_hint("Raise max_line_bytes or check the input delimiter.")
                            .with_offset(self.next_line_start));
                    }
                }
            }
            if found {
                return Ok(Scanned::Line { consumed });
            }
        }
    }
}

impl<R: Read + Seek> LineScanner<R> {
    /// Opens a scanner at the channel's current position, realigned to a line boundary.
    ///
    /// At a nonzero position the scanner steps back one byte and discards
    /// everything through the next delimiter. If the position already sits on
    /// a line start, the byte before it is that delimiter and nothing else is
    /// lost; otherwise the partial line belongs to whoever reads the preceding
    /// range.
    pub fn aligned(mut reader: R, config: ScanConfig) -> Result<Self, Error> {
        let position = reader
            .stream_position()
            .map_err(|err| io_error(err, "failed to query channel position"))?;
        if position == 0 {
            return Ok(Self::starting_at(reader, 0, config));
        }

        let back = position - 1;
        reader
            .seek(SeekFrom::Start(back))
            .map_err(|err| io_error(err, "failed to reposition channel").with_offset(back))?;
        let mut scanner = Self::starting_at(reader, back, config);
        let skipped = match scanner.scan_to_delimiter(false)? {
            Scanned::Line { consumed } => consumed,
            Scanned::Fragment { consumed } => {
                scanner.exhausted = true;
                consumed
            }
            Scanned::Eof => {
                scanner.exhausted = true;
                0
            }
        };
        scanner.next_line_start += skipped;
        scanner.current_line_start = scanner.next_line_start;
        debug!(
            position,
            skipped,
            line_start = scanner.next_line_start,
            "aligned scanner to line boundary"
        );
        Ok(scanner)
    }
}
