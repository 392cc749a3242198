//! Purpose: `alchemist` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON document on stdout.
//! Invariants: Errors are emitted on stderr (JSON when not a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;

use alchemist::api::{
    DEFAULT_HISTORY_LIMIT, Error, ErrorKind, HistoryStore, RemoteClient, decode, to_exit_code,
};

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
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
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
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `alchemist --help`."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command)
        .map_err(add_storage_hint)
        .map_err(add_internal_hint)
}

#[derive(Parser)]
#[command(
    name = "alchemist",
    version,
    about = "Decode count-prefixed alphabetic measurement strings",
    long_about = None,
    after_help = r#"EXAMPLES
  $ alchemist decode dz_a_aazzaaa      # [28,53,1]
  $ alchemist serve --bind 127.0.0.1:8080
  $ alchemist history --limit 10
  $ alchemist decode abbcc --remote http://127.0.0.1:8080"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Decode one input string and print the packages as JSON")]
    Decode {
        #[arg(help = "Letters a-z and '_' (case-insensitive, surrounding whitespace ignored)")]
        input: String,
        #[arg(long, help = "Decode via a running server instead of locally")]
        remote: Option<String>,
    },
    #[command(about = "Print recent decodings, newest first")]
    History {
        #[arg(
            long,
            default_value = serve::DEFAULT_DB_PATH,
            help = "History database path",
            value_hint = ValueHint::FilePath
        )]
        db: PathBuf,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT, help = "Maximum entries to print")]
        limit: usize,
        #[arg(long, help = "Read history from a running server instead of the database")]
        remote: Option<String>,
    },
    #[command(about = "Serve the decoder over HTTP")]
    Serve {
        #[arg(long, default_value = serve::DEFAULT_BIND, help = "Address to bind")]
        bind: SocketAddr,
        #[arg(
            long,
            default_value = serve::DEFAULT_DB_PATH,
            help = "History database path",
            value_hint = ValueHint::FilePath
        )]
        db: PathBuf,
        #[arg(
            long,
            default_value_t = serve::DEFAULT_MAX_INPUT_LEN,
            help = "Reject inputs longer than this many characters"
        )]
        max_input_len: usize,
        #[arg(
            long,
            default_value_t = serve::DEFAULT_MAX_HISTORY_LIMIT,
            help = "Upper bound for the /history limit parameter"
        )]
        max_history_limit: usize,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Storage => "storage error".to_string(),
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

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn add_storage_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Storage || err.hint().is_some() {
        return err;
    }
    err.with_hint("History database failed. Check the --db path and disk space.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share the input if it persists.",
    )
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
