//! Purpose: Define the public Rust API boundary for splitcsv.
//! Exports: Scanner, reader, source traits, and the file-backed source.
//! Role: Stable surface used by the CLI, tests, and embedding hosts.
//! Invariants: Hosts depend on `RecordSource`/`RecordReader`, not concrete reader types.

mod file_source;
mod source;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::reader::{Header, HeaderedRecordReader};
pub use crate::core::scanner::{DEFAULT_BUFFER_BYTES, LineScanner, ScanConfig, TrailingLine};
pub use file_source::CsvHeaderFileSource;
pub use source::{
    ByteRange, OutputKind, RangeReader, RecordReader, RecordSource, for_each_record,
};
