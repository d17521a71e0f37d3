//! Purpose: `fq` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout; `read` emits one JSON object per line.
//! Invariants: Errors are emitted as JSON on stderr when stderr is not a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{error::ErrorKind as ClapErrorKind, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::aot::Shell;
use fq::api::{to_exit_code, Error, ErrorKind};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod queue_paths;

const LOG_ENV: &str = "FQ_LOG";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
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
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `fq --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.log_level.as_deref());

    let queue_dir = cli.dir.unwrap_or_else(|| PathBuf::from("."));
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, queue_dir)
        .map_err(|err| (err, color_mode))
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

/// Logs go to stderr; `--log-level` wins over `FQ_LOG`, default `warn`.
fn init_tracing(level: Option<&str>) {
    let env_filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "fq",
    version,
    about = "Append-only file queues with an offset index",
    long_about = None,
    before_help = r#"A queue is two files: <name> (length-prefixed records) and <name>.index
(one 8-byte log offset per record). One writer appends; any number of
readers read by sequence number."#,
    after_help = r#"EXAMPLES
  $ fq write events 'hello world!' 'the second line'
  $ fq read events
  $ fq get events 1
  $ fq stat events"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Directory for named queues (default: current directory)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        help = "Log filter for stderr diagnostics (overrides FQ_LOG; default: warn)"
    )]
    log_level: Option<String>,
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

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DurabilityCli {
    Fast,
    Flush,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Append records to a queue",
        long_about = r#"Append records to a queue, creating it if missing.

Each DATA argument becomes one record. Without DATA, the file given by
--file (or stdin) becomes one record, or one record per line with --lines."#,
        after_help = r#"EXAMPLES
  $ fq write events 'hello world!'
  $ fq write events -f payload.bin
  $ tail -f app.log | fq write events --lines"#
    )]
    Write {
        #[arg(help = "Queue name or path")]
        queue: String,
        #[arg(help = "Record payloads")]
        data: Vec<String>,
        #[arg(
            short = 'f',
            long = "file",
            help = "Input file (use - for stdin)",
            conflicts_with = "data",
            value_hint = ValueHint::FilePath
        )]
        file: Option<PathBuf>,
        #[arg(long, help = "Append one record per input line")]
        lines: bool,
        #[arg(
            long,
            default_value = "fast",
            value_enum,
            help = "Durability mode: fast|flush"
        )]
        durability: DurabilityCli,
    },
    #[command(
        arg_required_else_help = true,
        about = "Read records sequentially until the end of the queue",
        after_help = r#"EXAMPLES
  $ fq read events
  $ fq read events --from 10 --count 5"#
    )]
    Read {
        #[arg(help = "Queue name or path")]
        queue: String,
        #[arg(long, help = "First sequence number to read (default: 0)")]
        from: Option<u64>,
        #[arg(long, help = "Stop after N records")]
        count: Option<u64>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Fetch one record by sequence number"
    )]
    Get {
        #[arg(help = "Queue name or path")]
        queue: String,
        #[arg(help = "Sequence number (0-based)")]
        seq: u64,
    },
    #[command(arg_required_else_help = true, about = "Show queue file sizes and record count")]
    Stat {
        #[arg(help = "Queue name or path")]
        queue: String,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_line(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let report = ErrorReport::new(err);
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", report.render(color_mode.use_color(is_tty)));
        return;
    }
    let json = serde_json::to_string(&report.to_json())
        .unwrap_or_else(|_| "{\"error\":{\"kind\":\"Internal\"}}".to_string());
    eprintln!("{json}");
}

/// Everything `fq` reports about a failed command, for stderr.
#[derive(Debug, Serialize)]
struct ErrorReport {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

impl ErrorReport {
    fn new(err: &Error) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: format!("{:?}", err.kind()),
            message: err
                .message()
                .map_or_else(|| fallback_message(err.kind()).to_string(), str::to_string),
            fault: err.fault().map(|fault| format!("{fault:?}")),
            seq: err.seq(),
            offset: err.offset(),
            path: err.path().map(|path| path.display().to_string()),
            hint: err.hint().map(str::to_string),
            causes,
        }
    }

    fn to_json(&self) -> Value {
        json!({ "error": self })
    }

    /// Where in the queue the failure happened, e.g. `seq 2 @ 16 in /q/log`.
    fn location(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(seq) = self.seq {
            parts.push(format!("seq {seq}"));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("@ {offset}"));
        }
        if let Some(path) = &self.path {
            parts.push(format!("in {path}"));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn render(&self, use_color: bool) -> String {
        let paint = |text: &str, sgr: &str| {
            if use_color {
                format!("\u{1b}[{sgr}m{text}\u{1b}[0m")
            } else {
                text.to_string()
            }
        };
        let mut out = format!("{} {}", paint("error:", "1;31"), self.message);
        if let Some(fault) = &self.fault {
            out.push_str(&format!(" ({fault})"));
        }
        if let Some(location) = self.location() {
            out.push_str(&format!("\n  at {location}"));
        }
        for cause in &self.causes {
            out.push_str(&format!("\n  cause: {cause}"));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n{} {hint}", paint("hint:", "33")));
        }
        out
    }
}

fn fallback_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::NotFound => "queue not found",
        ErrorKind::Permission => "permission denied",
        ErrorKind::Open => "open failed",
        ErrorKind::Busy => "queue is busy",
        ErrorKind::Write => "write failed",
        ErrorKind::EndOfStream => "end of stream",
        ErrorKind::Corrupt => "corrupt frame",
        ErrorKind::Io => "i/o error",
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, ErrorReport};
    use clap::CommandFactory;
    use fq::api::{Error, ErrorKind, StorageFault};
    use std::io;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn error_json_carries_context() {
        let err = Error::new(ErrorKind::Corrupt)
            .with_fault(StorageFault::ShortRead)
            .with_seq(2)
            .with_offset(16);
        let value = ErrorReport::new(&err).to_json();
        let inner = &value["error"];
        assert_eq!(inner["kind"], "Corrupt");
        assert_eq!(inner["message"], "corrupt frame");
        assert_eq!(inner["fault"], "ShortRead");
        assert_eq!(inner["seq"], 2);
        assert_eq!(inner["offset"], 16);
        assert!(inner.get("path").is_none());
        assert!(inner.get("causes").is_none());
    }

    #[test]
    fn render_without_color_is_plain() {
        let err = Error::new(ErrorKind::Busy).with_hint("close the other writer");
        let text = ErrorReport::new(&err).render(false);
        assert_eq!(text, "error: queue is busy\nhint: close the other writer");
    }

    #[test]
    fn render_shows_location_and_causes() {
        let err = Error::new(ErrorKind::Write)
            .with_fault(StorageFault::Io)
            .with_message("sync failed")
            .with_seq(3)
            .with_offset(40)
            .with_path("/tmp/q")
            .with_source(io::Error::other("disk went away"));
        let text = ErrorReport::new(&err).render(false);
        assert_eq!(
            text,
            "error: sync failed (Io)\n  at seq 3 @ 40 in /tmp/q\n  cause: disk went away"
        );
    }
}
