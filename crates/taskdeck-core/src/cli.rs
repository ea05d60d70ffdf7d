use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};

/// A `key=value` (or `key:value`) configuration override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcOverride {
    pub key: String,
    pub value: String,
}

impl RcOverride {
    fn split(s: &str) -> Option<Self> {
        let (key, value) = s.split_once('=').or_else(|| s.split_once(':'))?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }

    pub fn into_pair(self) -> (String, String) {
        (self.key, self.value)
    }
}

impl std::str::FromStr for RcOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::split(s).ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: terminal task board backed by a REST task collection",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration override, repeatable.
    #[arg(long = "rc", value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub rc_overrides: Vec<RcOverride>,

    /// Read configuration from this file instead of ~/.taskdeckrc.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the remote task collection.
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// Use an in-process remote instead of the network.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Seed for the placeholder status and due date generator.
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// A single command to run; without one, commands are read from stdin.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

fn default_log_level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the flags.
pub fn init_tracing(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_log_level(verbose, quiet))
            .map_err(|e| anyhow!("invalid log filter: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = installed {
        debug!(error = %err, "log subscriber was already installed");
    }
    Ok(())
}

/// argv with positional `rc.key=value` / `rc.key:value` tokens split out.
#[derive(Debug, Clone)]
pub struct SplitArgs {
    pub argv: Vec<OsString>,
    pub overrides: Vec<RcOverride>,
}

/// Separates positional `rc.` overrides from the rest of argv. The program
/// name is never treated as an override.
#[tracing::instrument(skip_all, fields(args = raw.len()))]
pub fn preprocess_args(raw: &[OsString]) -> SplitArgs {
    let mut split = SplitArgs {
        argv: Vec::with_capacity(raw.len()),
        overrides: Vec::new(),
    };

    for (idx, arg) in raw.iter().enumerate() {
        let rc = (idx > 0)
            .then(|| arg.to_str())
            .flatten()
            .and_then(|s| s.strip_prefix("rc."))
            .and_then(RcOverride::split);
        match rc {
            Some(over) => {
                debug!(key = %over.key, value = %over.value, "positional rc override");
                split.overrides.push(over);
            }
            None => split.argv.push(arg.clone()),
        }
    }
    split
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// First token names the command (unique prefixes allowed); the rest
    /// are its arguments. Empty input lists tasks.
    pub fn from_tokens(tokens: Vec<String>) -> anyhow::Result<Self> {
        let mut iter = tokens.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Self {
                command: "list".to_string(),
                args: vec![],
            });
        };

        let known = known_command_names();
        let command = expand_command_abbrev(&first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first} (try 'help')"))?
            .to_string();
        debug!(token = %first, expanded = %command, "resolved command token");

        Ok(Self {
            command,
            args: iter.collect(),
        })
    }

    pub fn from_os_args(rest: Vec<OsString>) -> anyhow::Result<Self> {
        Self::from_tokens(
            rest.into_iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
        )
    }

    /// Splits one interactive line, honouring shell-style quotes.
    pub fn from_line(line: &str) -> anyhow::Result<Self> {
        let tokens = shell_words::split(line).map_err(|e| anyhow!("cannot parse input: {e}"))?;
        Self::from_tokens(tokens)
    }
}
