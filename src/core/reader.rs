//! Purpose: Turn scanned lines into `name:value, ` records keyed by a header line.
//! Exports: `Header`, `HeaderedRecordReader`.
//! Role: Record layer above `LineScanner`; drives the reading state machine.
//! Invariants: The header is captured once and never mutated.
//! Invariants: A current record exists only in the `Iterating` state.
//! Invariants: `current_offset` is always the scanner's current line start.
use std::io::Read;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::scanner::LineScanner;

const FIELD_SEPARATOR: char = ',';

/// Ordered column names taken from the first line of a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    /// Splits a header line on commas after trimming surrounding whitespace.
    ///
    /// Trailing empty column names are dropped, so `a,b,` has two columns. A
    /// line without any comma is a single column, even when empty.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut columns: Vec<String> = line.split(FIELD_SEPARATOR).map(str::to_string).collect();
        if line.contains(FIELD_SEPARATOR) {
            while columns.last().is_some_and(|name| name.is_empty()) {
                columns.pop();
            }
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Zips a data line against the columns.
    ///
    /// Fields past the header width are ignored. A line with fewer fields is
    /// rejected with `ErrorKind::Malformed` at `offset`.
    pub fn format_record(&self, line: &str, offset: u64) -> Result<String, Error> {
        let mut record = String::with_capacity(line.len() + self.columns.len() * 8);
        let mut fields = line.split(FIELD_SEPARATOR);
        for (idx, name) in self.columns.iter().enumerate() {
            let Some(value) = fields.next() else {
                return Err(Error::new(ErrorKind::Malformed)
                    .with_message(format!(
                        "row has {idx} fields but header has {} columns",
                        self.columns.len()
                    ))
                    .with_offset(offset));
            };
            record.push_str(name);
            record.push(':');
            record.push_str(value);
            record.push_str(", ");
        }
        Ok(record)
    }
}

#[derive(Debug)]
enum ReadState {
    Unstarted,
    HeaderCaptured { header: Header },
    Iterating { header: Header, current: String },
    Exhausted { header: Option<Header> },
}

impl ReadState {
    fn header(&self) -> Option<&Header> {
        match self {
            ReadState::Unstarted => None,
            ReadState::HeaderCaptured { header } | ReadState::Iterating { header, .. } => {
                Some(header)
            }
            ReadState::Exhausted { header } => header.as_ref(),
        }
    }

    fn into_header(self) -> Option<Header> {
        match self {
            ReadState::Unstarted => None,
            ReadState::HeaderCaptured { header } | ReadState::Iterating { header, .. } => {
                Some(header)
            }
            ReadState::Exhausted { header } => header,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ReadState::Unstarted => "unstarted",
            ReadState::HeaderCaptured { .. } => "header-captured",
            ReadState::Iterating { .. } => "iterating",
            ReadState::Exhausted { .. } => "exhausted",
        }
    }
}

#[derive(Debug)]
pub struct HeaderedRecordReader<R> {
    scanner: LineScanner<R>,
    state: ReadState,
}

impl<R: Read> HeaderedRecordReader<R> {
    /// Reader whose first scanned line becomes the header.
    pub fn new(scanner: LineScanner<R>) -> Self {
        Self {
            scanner,
            state: ReadState::Unstarted,
        }
    }

    /// Reader for a range that does not contain the header line itself.
    pub fn with_header(header: Header, scanner: LineScanner<R>) -> Self {
        Self {
            scanner,
            state: ReadState::HeaderCaptured { header },
        }
    }

    /// Captures the header. Returns false when the channel holds no line at
    /// all, in which case the reader is exhausted.
    ///
    /// Calling this on a reader built `with_header` is a no-op.
    pub fn start_reading(&mut self) -> Result<bool, Error> {
        match self.state {
            ReadState::Unstarted => {}
            ReadState::HeaderCaptured { .. } => return Ok(true),
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("reader already started ({})", self.state.name())));
            }
        }

        if !self.scanner.read_next_line()? {
            debug!("channel is empty; no header captured");
            self.state = ReadState::Exhausted { header: None };
            return Ok(false);
        }
        let header = Header::parse(self.scanner.current().unwrap_or_default());
        debug!(
            columns = header.len(),
            offset = self.scanner.current_line_start(),
            "captured header"
        );
        self.state = ReadState::HeaderCaptured { header };
        Ok(true)
    }

    /// Reads the next data line into the current record.
    ///
    /// A malformed row consumes its line and clears the current record; the
    /// caller may keep reading past it.
    pub fn read_next_record(&mut self) -> Result<bool, Error> {
        if matches!(self.state, ReadState::Unstarted) {
            self.start_reading()?;
        }
        if matches!(self.state, ReadState::Exhausted { .. }) {
            return Ok(false);
        }

        match self.scanner.read_next_line() {
            Ok(true) => {}
            Ok(false) => {
                self.exhaust();
                debug!(offset = self.scanner.next_line_start(), "reader exhausted");
                return Ok(false);
            }
            Err(err) => {
                self.exhaust();
                return Err(err);
            }
        }

        let offset = self.scanner.current_line_start();
        let line = self.scanner.current().unwrap_or_default();
        let formatted = match self.state.header() {
            Some(header) => header.format_record(line, offset),
            None => {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message("record read without a header")
                    .with_offset(offset));
            }
        };

        let state = std::mem::replace(&mut self.state, ReadState::Unstarted);
        let Some(header) = state.into_header() else {
            return Err(Error::new(ErrorKind::Internal).with_message("header lost during read"));
        };
        match formatted {
            Ok(current) => {
                self.state = ReadState::Iterating { header, current };
                Ok(true)
            }
            Err(err) => {
                self.state = ReadState::HeaderCaptured { header };
                Err(err)
            }
        }
    }

    /// Every line is a record boundary, so every record is a split point.
    pub fn is_at_split_point(&self) -> bool {
        true
    }

    pub fn current_offset(&self) -> u64 {
        self.scanner.current_line_start()
    }

    /// Stream offset where the next scanned line begins.
    pub fn next_record_offset(&self) -> u64 {
        self.scanner.next_line_start()
    }

    /// The record produced by the last successful `read_next_record`.
    pub fn current(&self) -> Result<&str, Error> {
        match &self.state {
            ReadState::Iterating { current, .. } => Ok(current),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("no current record ({})", other.name()))
                .with_hint("Call read_next_record and check that it returned true.")),
        }
    }

    pub fn header(&self) -> Option<&Header> {
        self.state.header()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn exhaust(&mut self) {
        let state = std::mem::replace(&mut self.state, ReadState::Unstarted);
        self.state = ReadState::Exhausted {
            header: state.into_header(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, HeaderedRecordReader};
    use crate::core::error::ErrorKind;
    use crate::core::scanner::{LineScanner, ScanConfig};
    use std::io::{self, Cursor, Read, Seek, SeekFrom};

    /// Serves its bytes, then fails every later read.
    struct FailsAfter {
        data: Cursor<&'static [u8]>,
    }

    impl Read for FailsAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::other("connection reset")),
                n => Ok(n),
            }
        }
    }

    fn reader(input: &[u8]) -> HeaderedRecordReader<&[u8]> {
        HeaderedRecordReader::new(LineScanner::new(input))
    }

    fn drain(reader: &mut HeaderedRecordReader<&[u8]>) -> Vec<(u64, String)> {
        let mut records = Vec::new();
        while reader.read_next_record().expect("read record") {
            records.push((
                reader.current_offset(),
                reader.current().expect("current").to_string(),
            ));
        }
        records
    }

    #[test]
    fn header_parse_trims_line() {
        let header = Header::parse("  a,b,c \t");
        assert_eq!(header.columns(), ["a", "b", "c"]);
        assert_eq!(header.len(), 3);
    }

    #[test]
    fn header_parse_drops_trailing_empty_columns() {
        let header = Header::parse("a,b,");
        assert_eq!(header.columns(), ["a", "b"]);
        assert_eq!(header.format_record("1,2,", 0).expect("record"), "a:1, b:2, ");
        assert_eq!(header.format_record("1,2", 0).expect("record"), "a:1, b:2, ");
        assert_eq!(Header::parse("a,,b,,").columns(), ["a", "", "b"]);
        assert!(Header::parse(",,").is_empty());
        assert_eq!(Header::parse("").columns(), [""]);
    }

    #[test]
    fn format_record_keeps_trailing_separator() {
        let header = Header::parse("a,b,c");
        assert_eq!(header.format_record("1,2,3", 0).expect("record"), "a:1, b:2, c:3, ");
    }

    #[test]
    fn format_record_ignores_extra_fields() {
        let header = Header::parse("a,b");
        assert_eq!(header.format_record("1,2,3,4", 0).expect("record"), "a:1, b:2, ");
    }

    #[test]
    fn format_record_keeps_empty_fields() {
        let header = Header::parse("a,b,c");
        assert_eq!(header.format_record("1,,", 0).expect("record"), "a:1, b:, c:, ");
    }

    #[test]
    fn short_row_is_malformed() {
        let header = Header::parse("a,b,c");
        let err = header.format_record("1,2", 17).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(err.offset(), Some(17));
        assert!(err.message().unwrap().contains("2 fields"));
    }

    #[test]
    fn reads_example_records_in_order() {
        let mut reader = reader(b"a,b,c\n1,2,3\n4,5,6\n");
        let records = drain(&mut reader);
        assert_eq!(
            records,
            vec![
                (6, "a:1, b:2, c:3, ".to_string()),
                (12, "a:4, b:5, c:6, ".to_string()),
            ]
        );
    }

    #[test]
    fn windows_line_endings_match_unix_output() {
        let mut unix = reader(b"a,b,c\n1,2,3\n4,5,6\n");
        let mut windows = reader(b"a,b,c\r\n1,2,3\r\n4,5,6\r\n");
        let unix_records: Vec<String> = drain(&mut unix).into_iter().map(|(_, r)| r).collect();
        let windows_records: Vec<String> =
            drain(&mut windows).into_iter().map(|(_, r)| r).collect();
        assert_eq!(unix_records, windows_records);
    }

    #[test]
    fn state_machine_walks_every_state() {
        let mut reader = reader(b"a\n1\n");
        assert_eq!(reader.state_name(), "unstarted");
        assert!(reader.start_reading().expect("start"));
        assert_eq!(reader.state_name(), "header-captured");
        assert_eq!(reader.current_offset(), 0);
        assert!(reader.read_next_record().expect("record"));
        assert_eq!(reader.state_name(), "iterating");
        assert!(!reader.read_next_record().expect("end"));
        assert_eq!(reader.state_name(), "exhausted");
        assert_eq!(reader.header().expect("header").columns(), ["a"]);
    }

    #[test]
    fn current_before_read_is_usage_error() {
        let mut reader = reader(b"a\n1\n");
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
        reader.start_reading().expect("start");
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn current_is_idempotent() {
        let mut reader = reader(b"a,b\n1,2\n");
        assert!(reader.read_next_record().expect("record"));
        let first = reader.current().expect("first").to_string();
        assert_eq!(reader.current().expect("second"), first);
        assert_eq!(reader.current().expect("third"), first);
    }

    #[test]
    fn exhaustion_is_terminal() {
        let mut reader = reader(b"a\n1\n");
        assert!(reader.read_next_record().expect("record"));
        assert!(!reader.read_next_record().expect("end"));
        assert!(!reader.read_next_record().expect("still end"));
        assert!(!reader.read_next_record().expect("still end"));
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn empty_channel_has_no_header_and_no_records() {
        let mut reader = reader(b"");
        assert!(!reader.start_reading().expect("start"));
        assert!(reader.header().is_none());
        assert!(!reader.read_next_record().expect("read"));
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn header_only_file_has_no_records() {
        let mut reader = reader(b"a,b\n");
        assert!(reader.start_reading().expect("start"));
        assert!(!reader.read_next_record().expect("read"));
        assert_eq!(reader.header().expect("header").len(), 2);
    }

    #[test]
    fn read_without_start_captures_header_first() {
        let mut reader = reader(b"k,v\nx,y\n");
        assert!(reader.read_next_record().expect("record"));
        assert_eq!(reader.current().expect("current"), "k:x, v:y, ");
        assert_eq!(reader.current_offset(), 4);
    }

    #[test]
    fn starting_twice_after_records_is_usage_error() {
        let mut reader = reader(b"a\n1\n");
        assert!(reader.read_next_record().expect("record"));
        assert_eq!(reader.start_reading().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn malformed_row_clears_current_and_reading_continues() {
        let mut reader = reader(b"a,b\n1,2\n3\n4,5\n");
        assert!(reader.read_next_record().expect("first"));
        let err = reader.read_next_record().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(err.offset(), Some(8));
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
        assert!(reader.read_next_record().expect("third"));
        assert_eq!(reader.current().expect("current"), "a:4, b:5, ");
        assert_eq!(reader.current_offset(), 10);
    }

    #[test]
    fn io_failure_mid_stream_propagates_then_exhausts() {
        let failing = FailsAfter {
            data: Cursor::new(&b"a,b\n1,2\n3,"[..]),
        };
        let mut reader = HeaderedRecordReader::new(LineScanner::new(failing));
        assert!(reader.read_next_record().expect("first"));
        assert_eq!(reader.current().expect("current"), "a:1, b:2, ");

        let err = reader.read_next_record().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(reader.state_name(), "exhausted");
        assert_eq!(reader.current().unwrap_err().kind(), ErrorKind::Usage);
        assert!(!reader.read_next_record().expect("terminal"));
        assert_eq!(reader.header().expect("header").columns(), ["a", "b"]);
    }

    #[test]
    fn with_header_reader_reads_data_lines_only() {
        let input = b"a,b\n1,2\n3,4\n5,6\n";
        let mut cursor = Cursor::new(input.to_vec());
        cursor.seek(SeekFrom::Start(6)).expect("seek");
        let scanner = LineScanner::aligned(cursor, ScanConfig::default()).expect("aligned");
        let mut reader = HeaderedRecordReader::with_header(Header::parse("a,b"), scanner);
        assert!(reader.start_reading().expect("start"));
        assert!(reader.read_next_record().expect("record"));
        assert_eq!(reader.current().expect("current"), "a:3, b:4, ");
        assert_eq!(reader.current_offset(), 8);
        assert!(reader.read_next_record().expect("record"));
        assert_eq!(reader.current_offset(), 12);
        assert!(!reader.read_next_record().expect("end"));
    }

    #[test]
    fn every_record_is_a_split_point() {
        let mut reader = reader(b"a\n1\n2\n");
        while reader.read_next_record().expect("read") {
            assert!(reader.is_at_split_point());
        }
    }
}
