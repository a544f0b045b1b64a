//! Purpose: `splitcsv` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, dispatches commands.
//! Invariants: Records go to stdout one per line; diagnostics go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use splitcsv::api::{DEFAULT_BUFFER_BYTES, Error, ErrorKind, ScanConfig, TrailingLine, to_exit_code};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `splitcsv --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command)
        .map_err(add_io_hint)
        .map_err(add_line_limit_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "splitcsv",
    version,
    about = "Read headered comma-delimited files as key/value records",
    long_about = None,
    before_help = r#"The first line of a file names the columns. Every later line becomes one record:
  name:value, name:value, ...

Any byte range of a file can be read on its own; a range starting mid-line
skips ahead to the next full line, so adjacent ranges never share a record.
"#,
    after_help = r#"EXAMPLES
  $ splitcsv read data.csv
  $ splitcsv read data.csv --json
  $ splitcsv read data.csv --start 4096 --end 8192
  $ splitcsv header data.csv
  $ splitcsv split data.csv --parts 4

Set RUST_LOG=debug to trace range alignment on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct ScanArgs {
    #[arg(
        long,
        default_value_t = DEFAULT_BUFFER_BYTES,
        help = "Read buffer size in bytes"
    )]
    buffer_bytes: usize,
    #[arg(long, help = "Reject lines longer than this many bytes")]
    max_line_bytes: Option<usize>,
    #[arg(
        long,
        help = "Emit a final line that has no trailing newline instead of dropping it"
    )]
    keep_trailing: bool,
}

impl ScanArgs {
    fn config(&self) -> ScanConfig {
        let mut config = ScanConfig::default().with_buffer_bytes(self.buffer_bytes);
        if let Some(max) = self.max_line_bytes {
            config = config.with_max_line_bytes(max);
        }
        if self.keep_trailing {
            config = config.with_trailing(TrailingLine::Emit);
        }
        config
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Print the records of a file or byte range",
        long_about = r#"Print one record per data line.

Without --start/--end the whole file is read. With a range, only records whose
line starts inside [start, end) are printed; the header still comes from the
first line of the file."#,
        after_help = r#"EXAMPLES
  $ splitcsv read data.csv
  $ splitcsv read data.csv --json
  $ splitcsv read data.csv --start 100 --end 200

NOTES
  - Rows with fewer fields than the header fail with a Malformed error.
  - A final line without a newline is dropped unless --keep-trailing is set."#
    )]
    Read {
        #[arg(help = "Input file", value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, help = "Range start offset in bytes (default: 0)")]
        start: Option<u64>,
        #[arg(long, help = "Range end offset in bytes (default: file length)")]
        end: Option<u64>,
        #[arg(long, help = "Emit JSON lines with offset and record")]
        json: bool,
        #[command(flatten)]
        scan: ScanArgs,
    },
    #[command(
        arg_required_else_help = true,
        about = "Print the header columns as JSON",
        after_help = r#"EXAMPLES
  $ splitcsv header data.csv"#
    )]
    Header {
        #[arg(help = "Input file", value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[command(flatten)]
        scan: ScanArgs,
    },
    #[command(
        arg_required_else_help = true,
        about = "Split a file into byte ranges and count the records in each",
        long_about = r#"Split a file into evenly sized byte ranges, read every range with its own
reader, and report how many records each produced. The per-range counts always
add up to the whole-file count."#,
        after_help = r#"EXAMPLES
  $ splitcsv split data.csv --parts 8"#
    )]
    Split {
        #[arg(help = "Input file", value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, default_value_t = 2, help = "Number of ranges")]
        parts: usize,
        #[command(flatten)]
        scan: ScanArgs,
    },
    #[command(
        about = "Print version info as JSON",
        after_help = r#"EXAMPLES
  $ splitcsv version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ splitcsv completion bash > ~/.local/share/bash-completion/completions/splitcsv
  $ splitcsv completion zsh > ~/.zfunc/_splitcsv"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint("Permission denied. Check file permissions."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path and filesystem."),
        _ => err,
    }
}

/// Swaps the library's line-limit hint for one naming the CLI flag.
fn add_line_limit_hint(err: Error) -> Error {
    let over_limit = err.kind() == ErrorKind::Malformed
        && err
            .message()
            .is_some_and(|message| message.starts_with("line exceeds size limit"));
    if !over_limit {
        return err;
    }
    err.with_hint("Raise --max-line-bytes or check the input delimiter.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("Unexpected internal failure. Retry with RUST_LOG=debug and RUST_BACKTRACE=1.")
}

fn emit_json(value: Value) {
    let encoded = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Malformed => "malformed input".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, ColorMode, ScanArgs, add_line_limit_hint, clap_error_summary, error_json, error_text,
    };
    use clap::Parser;
    use splitcsv::api::{Error, ErrorKind, TrailingLine};

    #[test]
    fn scan_args_map_to_config() {
        let args = ScanArgs {
            buffer_bytes: 64,
            max_line_bytes: Some(10),
            keep_trailing: true,
        };
        let config = args.config();
        assert_eq!(config.buffer_bytes, 64);
        assert_eq!(config.max_line_bytes, Some(10));
        assert_eq!(config.trailing, TrailingLine::Emit);
    }

    #[test]
    fn error_json_carries_kind_and_offset() {
        let err = Error::new(ErrorKind::Malformed)
            .with_message("row has 1 fields but header has 2 columns")
            .with_offset(9);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Malformed");
        assert_eq!(value["error"]["offset"], 9);
        assert!(value["error"].get("hint").is_none());
    }

    #[test]
    fn error_text_without_color_is_plain() {
        let err = Error::new(ErrorKind::NotFound).with_hint("check the path");
        let text = error_text(&err, false);
        assert_eq!(text, "error: not found\nhint: check the path");
        assert!(!ColorMode::Never.use_color(true));
    }

    #[test]
    fn line_limit_hint_names_cli_flag() {
        let err = Error::new(ErrorKind::Malformed)
            .with_message("line exceeds size limit of 4 bytes")
            .with_hint("Raise max_line_bytes or check the input delimiter.");
        let err = add_line_limit_hint(err);
        assert_eq!(err.hint(), Some("Raise --max-line-bytes or check the input delimiter."));

        let short_row = Error::new(ErrorKind::Malformed).with_message("row has 1 fields but header has 2 columns");
        assert!(add_line_limit_hint(short_row).hint().is_none());
    }

    #[test]
    fn clap_errors_are_summarized() {
        let err = match Cli::try_parse_from(["splitcsv", "read", "x.csv", "--bogus"]) {
            Ok(_) => panic!("expected parse failure"),
            Err(err) => err,
        };
        let summary = clap_error_summary(&err);
        assert!(summary.contains("--bogus"));
    }
}
