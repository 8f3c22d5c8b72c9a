use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "callsheet",
    version,
    about = "Scheduled-call reminders for the collections CRM",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "callrc", global = true)]
    pub callrc: Option<PathBuf>,

    /// Bearer token to use instead of the token file and environment.
    #[arg(long = "token", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Poll continuously and show reminder popups as they come due.
    Watch,
    /// Fetch once and print the upcoming reminders table.
    Board,
    /// Fetch once and print the reminders inside the lookahead window.
    Due {
        /// Evaluate the window as of this RFC 3339 instant instead of now.
        #[arg(long = "at", value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,
    },
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// Installs the global subscriber. Keep the returned guard alive for as
/// long as logs should reach the file.
pub fn init_tracing(
    verbose: u8,
    quiet: u8,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log.file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(guard)
}

/// Pulls `rc.key=value` / `rc.key:value` positionals out of the argument
/// list before clap sees it, and hoists every `--rc` flag ahead of the
/// subcommand. clap keeps only the subcommand-level values of a global
/// `Append` arg, so flags on both sides would otherwise drop the first set.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut hoisted: Vec<OsString> = Vec::new();
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    let bin = iter.next();
    let mut passthrough = false;

    while let Some(arg) = iter.next() {
        if passthrough {
            cleaned.push(arg);
            continue;
        }

        let s = arg.to_string_lossy().into_owned();
        if s == "--" {
            passthrough = true;
            cleaned.push(arg);
            continue;
        }

        if s == "--rc" {
            match iter.next() {
                Some(value) => {
                    hoisted.push(arg);
                    hoisted.push(value);
                }
                // Leave a dangling flag for clap to report.
                None => cleaned.push(arg),
            }
            continue;
        }
        if s.starts_with("--rc=") {
            hoisted.push(arg);
            continue;
        }

        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    let cleaned_args = bin
        .into_iter()
        .chain(hoisted)
        .chain(cleaned)
        .collect();

    Ok(PreprocessedArgs {
        cleaned_args,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "callsheet",
            "rc.poll.popup.interval=5000",
            "watch",
            "rc.color:off",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["callsheet", "watch"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.poll.popup.interval".to_string(), "5000".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_due_with_instant() {
        let cli = GlobalCli::parse_from(["callsheet", "-v", "due", "--at", "2025-01-15T12:00:00Z"]);

        assert_eq!(cli.verbose, 1);
        let Some(Command::Due { at: Some(at) }) = cli.command else {
            panic!("expected due command with instant");
        };
        assert_eq!(at.to_rfc3339(), "2025-01-15T12:00:00+00:00");
    }

    #[test]
    fn rc_flags_accumulate() {
        let pre = preprocess_args(&args(&[
            "callsheet",
            "--rc",
            "api.base=http://crm.test/api",
            "board",
            "--rc",
            "color=off",
            "--rc=poll.board.interval=30000",
        ]))
        .expect("preprocess");
        let cli = GlobalCli::parse_from(pre.cleaned_args);

        let keys: Vec<_> = cli.rc_overrides.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["api.base", "color", "poll.board.interval"]);
        assert_eq!(cli.command, Some(Command::Board));
    }

    #[test]
    fn rc_flags_after_double_dash_are_left_alone() {
        let pre = preprocess_args(&args(&["callsheet", "watch", "--", "--rc", "x=y"]))
            .expect("preprocess");

        assert_eq!(
            pre.cleaned_args,
            args(&["callsheet", "watch", "--", "--rc", "x=y"])
        );
    }
}
