//! Purpose: File-backed `RecordSource` for headered comma-delimited text.
//! Exports: `CsvHeaderFileSource`.
//! Role: Opens a path (optionally a byte sub-range of it) and builds the reader stack.
//! Invariants: Readers for a range starting past 0 take the header from offset 0 of the file.
//! Invariants: The source reports itself as unsplittable and unordered.
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::api::source::{ByteRange, OutputKind, RangeReader, RecordReader, RecordSource};
use crate::core::error::{io_error, Error};
use crate::core::reader::{Header, HeaderedRecordReader};
use crate::core::scanner::{LineScanner, ScanConfig};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsvHeaderFileSource {
    path: PathBuf,
    range: Option<ByteRange>,
    config: ScanConfig,
}

impl CsvHeaderFileSource {
    /// Source over the whole file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            range: None,
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Same file and config, restricted to `[start, end)`.
    pub fn subrange(&self, start: u64, end: u64) -> Result<Self, Error> {
        Ok(Self {
            path: self.path.clone(),
            range: Some(ByteRange::new(start, end)?),
            config: self.config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn file_len(&self) -> Result<u64, Error> {
        let meta = std::fs::metadata(&self.path)
            .map_err(|err| io_error(err, "failed to stat input").with_path(&self.path))?;
        Ok(meta.len())
    }

    /// Evenly sized sub-range sources covering the whole file.
    pub fn split(&self, parts: usize) -> Result<Vec<CsvHeaderFileSource>, Error> {
        let len = self.file_len()?;
        ByteRange::split_even(len, parts)
            .into_iter()
            .map(|range| self.subrange(range.start, range.end))
            .collect()
    }

    /// Reads the first line of the file as the header, independent of any range.
    pub fn read_header(&self) -> Result<Option<Header>, Error> {
        let file = self.open()?;
        let mut scanner = LineScanner::starting_at(file, 0, self.config);
        if !scanner
            .read_next_line()
            .map_err(|err| err.with_path(&self.path))?
        {
            return Ok(None);
        }
        Ok(scanner.current().map(Header::parse))
    }

    fn open(&self) -> Result<File, Error> {
        File::open(&self.path).map_err(|err| {
            io_error(err, "failed to open input")
                .with_path(&self.path)
                .with_hint("Check that the path exists and is readable.")
        })
    }

    fn open_range(&self, range: ByteRange) -> Result<Box<dyn RecordReader>, Error> {
        let mut file = self.open()?;
        file.seek(SeekFrom::Start(range.start)).map_err(|err| {
            io_error(err, "failed to seek input")
                .with_path(&self.path)
                .with_offset(range.start)
        })?;
        let scanner = LineScanner::aligned(file, self.config).map_err(|err| err.with_path(&self.path))?;
        debug!(
            path = %self.path.display(),
            start = range.start,
            end = range.end,
            first_line = scanner.next_line_start(),
            "opened range reader"
        );

        let reader = if range.start == 0 {
            HeaderedRecordReader::new(scanner)
        } else {
            match self.read_header()? {
                Some(header) => HeaderedRecordReader::with_header(header, scanner),
                None => HeaderedRecordReader::new(scanner),
            }
        };
        Ok(Box::new(RangeReader::new(Box::new(reader), range.end)))
    }
}

impl RecordSource for CsvHeaderFileSource {
    fn create_reader(&self) -> Result<Box<dyn RecordReader>, Error> {
        match self.range {
            Some(range) => self.open_range(range),
            None => {
                let file = self.open()?;
                let scanner = LineScanner::starting_at(file, 0, self.config);
                Ok(Box::new(HeaderedRecordReader::new(scanner)))
            }
        }
    }

    fn create_for_subrange(&self, start: u64, end: u64) -> Result<Box<dyn RecordSource>, Error> {
        Ok(Box::new(self.subrange(start, end)?))
    }

    /// Whole files are streamed by one reader; ranges are only built on request.
    fn is_splittable(&self) -> bool {
        false
    }

    fn produces_sorted_keys(&self) -> bool {
        false
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Utf8Text
    }
}
