//! Purpose: Hold top-level CLI command dispatch for `splitcsv`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command reads through `RecordSource`/`RecordReader` only.
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::CommandFactory;
use serde::Serialize;
use splitcsv::api::{CsvHeaderFileSource, RecordSource, for_each_record};
use tracing::debug;

use super::*;

#[derive(Serialize)]
struct RecordLine<'a> {
    offset: u64,
    record: &'a str,
}

#[derive(Serialize)]
struct RangeSummary {
    start: u64,
    end: u64,
    records: u64,
}

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Read {
            path,
            start,
            end,
            json,
            scan,
        } => {
            let source = CsvHeaderFileSource::new(&path).with_config(scan.config());
            let source = if start.is_some() || end.is_some() {
                let end = match end {
                    Some(end) => end,
                    None => source.file_len()?,
                };
                source.subrange(start.unwrap_or(0), end)?
            } else {
                source
            };
            read_records(&source, json).map_err(|err| with_path_if_missing(err, &path))?;
            Ok(RunOutcome::ok())
        }
        Command::Header { path, scan } => {
            let source = CsvHeaderFileSource::new(&path).with_config(scan.config());
            let columns = source.read_header()?.map(|header| header.columns().to_vec());
            emit_json(json!({
                "path": path.display().to_string(),
                "columns": columns,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Split { path, parts, scan } => {
            if parts == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--parts must be at least 1")
                    .with_hint("Use --parts 1 to read the file as a single range."));
            }
            let source = CsvHeaderFileSource::new(&path).with_config(scan.config());
            let summaries =
                summarize_ranges(&source, parts).map_err(|err| with_path_if_missing(err, &path))?;
            let total: u64 = summaries.iter().map(|summary| summary.records).sum();
            emit_json(json!({
                "path": path.display().to_string(),
                "file_len": source.file_len()?,
                "ranges": summaries,
                "records_total": total,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": "splitcsv",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "splitcsv", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn read_records(source: &CsvHeaderFileSource, json: bool) -> Result<(), Error> {
    let mut reader = source.create_reader()?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let count = for_each_record(reader.as_mut(), |offset, record| {
        let written = if json {
            let line = serde_json::to_string(&RecordLine { offset, record }).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode record")
                    .with_source(err)
            })?;
            writeln!(out, "{line}")
        } else {
            writeln!(out, "{record}")
        };
        written.map_err(write_error)
    })?;
    out.flush().map_err(write_error)?;
    debug!(count, range = ?source.range(), "read complete");
    Ok(())
}

fn summarize_ranges(source: &CsvHeaderFileSource, parts: usize) -> Result<Vec<RangeSummary>, Error> {
    let ranges = source.split(parts)?;
    let mut summaries = Vec::with_capacity(ranges.len());
    for part in ranges {
        let Some(range) = part.range() else {
            continue;
        };
        let mut reader = part.create_reader()?;
        let records = for_each_record(reader.as_mut(), |_, _| Ok(()))?;
        summaries.push(RangeSummary {
            start: range.start,
            end: range.end,
            records,
        });
    }
    Ok(summaries)
}

fn write_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}

fn with_path_if_missing(err: Error, path: &Path) -> Error {
    if err.path().is_some() {
        return err;
    }
    err.with_path(path)
}
