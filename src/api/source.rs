//! Purpose: Host-facing capability traits for opening byte ranges and pulling records.
//! Exports: `RecordReader`, `RecordSource`, `OutputKind`, `ByteRange`, `RangeReader`, `for_each_record`.
//! Role: Seam between a batch host and concrete readers; hosts hold only trait objects.
//! Invariants: A range yields exactly the records whose start offset lies in `[start, end)`.
//! Invariants: Adjacent ranges over one file yield every record exactly once.
use std::io::Read;

use serde::Serialize;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::reader::HeaderedRecordReader;

/// Pull-based reader contract: start, then advance and inspect one record at a time.
pub trait RecordReader {
    fn start_reading(&mut self) -> Result<bool, Error>;
    fn read_next_record(&mut self) -> Result<bool, Error>;
    fn is_at_split_point(&self) -> bool;
    fn current_offset(&self) -> u64;
    /// Offset at which the next call to `read_next_record` would start reading.
    fn next_record_offset(&self) -> u64;
    fn current(&self) -> Result<&str, Error>;
}

/// A source that can open its byte range and describe itself to a host.
pub trait RecordSource {
    fn create_reader(&self) -> Result<Box<dyn RecordReader>, Error>;
    fn create_for_subrange(&self, start: u64, end: u64) -> Result<Box<dyn RecordSource>, Error>;
    fn is_splittable(&self) -> bool;
    fn produces_sorted_keys(&self) -> bool;
    fn output_kind(&self) -> OutputKind;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputKind {
    Utf8Text,
}

impl OutputKind {
    pub fn media_type(self) -> &'static str {
        match self {
            OutputKind::Utf8Text => "text/plain; charset=utf-8",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self, Error> {
        if start > end {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("range start {start} is past range end {end}"))
                .with_hint("Use a start offset less than or equal to the end offset."));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Splits `[0, len)` into at most `parts` contiguous ranges of near-equal size.
    ///
    /// An empty input yields a single empty range so a caller still opens one reader.
    pub fn split_even(len: u64, parts: usize) -> Vec<ByteRange> {
        let parts = parts.max(1) as u64;
        if len == 0 {
            return vec![ByteRange { start: 0, end: 0 }];
        }
        let chunk = len.div_ceil(parts);
        let mut ranges = Vec::new();
        let mut start = 0u64;
        while start < len {
            let end = (start + chunk).min(len);
            ranges.push(ByteRange { start, end });
            start = end;
        }
        ranges
    }
}

impl<R: Read> RecordReader for HeaderedRecordReader<R> {
    fn start_reading(&mut self) -> Result<bool, Error> {
        HeaderedRecordReader::start_reading(self)
    }

    fn read_next_record(&mut self) -> Result<bool, Error> {
        HeaderedRecordReader::read_next_record(self)
    }

    fn is_at_split_point(&self) -> bool {
        HeaderedRecordReader::is_at_split_point(self)
    }

    fn current_offset(&self) -> u64 {
        HeaderedRecordReader::current_offset(self)
    }

    fn next_record_offset(&self) -> u64 {
        HeaderedRecordReader::next_record_offset(self)
    }

    fn current(&self) -> Result<&str, Error> {
        HeaderedRecordReader::current(self)
    }
}

/// Stops an inner reader before the first split point at or beyond `end`.
///
/// The record that starts at or after `end` belongs to the next range and is
/// never read here. A record that starts before `end` is returned whole even if
/// its bytes run past it.
pub struct RangeReader {
    inner: Box<dyn RecordReader>,
    end: u64,
    started: bool,
    done: bool,
}

impl RangeReader {
    pub fn new(inner: Box<dyn RecordReader>, end: u64) -> Self {
        Self {
            inner,
            end,
            started: false,
            done: false,
        }
    }
}

impl RecordReader for RangeReader {
    fn start_reading(&mut self) -> Result<bool, Error> {
        if self.started {
            return self.inner.start_reading();
        }
        self.started = true;
        let started = self.inner.start_reading()?;
        if !started {
            self.done = true;
        }
        Ok(started)
    }

    fn read_next_record(&mut self) -> Result<bool, Error> {
        // The header has to be consumed before the next offset names a data row.
        if !self.started && !self.start_reading()? {
            return Ok(false);
        }
        if self.done {
            return Ok(false);
        }
        let next = self.inner.next_record_offset();
        if self.inner.is_at_split_point() && next >= self.end {
            debug!(offset = next, end = self.end, "next record starts past range end");
            self.done = true;
            return Ok(false);
        }
        if !self.inner.read_next_record()? {
            self.done = true;
            return Ok(false);
        }
        Ok(true)
    }

    fn is_at_split_point(&self) -> bool {
        self.inner.is_at_split_point()
    }

    fn current_offset(&self) -> u64 {
        self.inner.current_offset()
    }

    fn next_record_offset(&self) -> u64 {
        self.inner.next_record_offset()
    }

    fn current(&self) -> Result<&str, Error> {
        if self.done {
            return Err(Error::new(ErrorKind::Usage).with_message("no current record (range done)"));
        }
        self.inner.current()
    }
}

/// Drives a reader to the end, handing each record and its offset to `on_record`.
///
/// Returns the number of records delivered.
pub fn for_each_record<F>(reader: &mut dyn RecordReader, mut on_record: F) -> Result<u64, Error>
where
    F: FnMut(u64, &str) -> Result<(), Error>,
{
    let mut count = 0u64;
    if !reader.start_reading()? {
        return Ok(0);
    }
    while reader.read_next_record()? {
        on_record(reader.current_offset(), reader.current()?)?;
        count += 1;
    }
    Ok(count)
}
