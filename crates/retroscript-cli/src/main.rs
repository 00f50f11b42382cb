//! Command-line runner for RetroScript.
//!
//! # Usage
//!
//! ```bash
//! # Run a script
//! retroscript run hello.retro
//!
//! # Read the script from stdin
//! echo 'print "hi"' | retroscript run
//!
//! # Predefine variables (values are JSON, falling back to plain strings)
//! retroscript run greet.retro --var name=Ann --var count=3
//!
//! # Machine-readable result
//! retroscript run job.retro --format json
//!
//! # Record host commands instead of performing them
//! retroscript run deploy.retro --dry-run
//!
//! # Syntax check only
//! retroscript check job.retro
//!
//! # Show the token stream
//! retroscript tokens job.retro
//! ```
//!
//! Exit codes: 0 success, 1 I/O error, 2 lex or parse error, 3 runtime error.

mod console_host;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use retroscript_core::config::RetroConfig;
use retroscript_core::host::{Host, RecordingHost};
use retroscript_core::lexer::tokenize;
use retroscript_core::parser::parse_source;
use retroscript_core::{run, RunOptions, ScriptError, Value};
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::console_host::ConsoleHost;

/// Run and inspect RetroScript automation scripts.
#[derive(Parser)]
#[command(name = "retroscript")]
#[command(about = "Run and inspect RetroScript automation scripts")]
#[command(version)]
struct Cli {
    /// Write logs to this directory instead of stderr
    #[arg(long, env = "RETROSCRIPT_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script
    Run {
        /// Script file; reads stdin when omitted or "-"
        script: Option<PathBuf>,

        /// Predefine a variable as NAME=VALUE
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, serde_json::Value)>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text", env = "RETROSCRIPT_FORMAT")]
        format: OutputFormat,

        /// Record host commands instead of performing them
        #[arg(long)]
        dry_run: bool,

        /// Deepest allowed nesting of function calls
        #[arg(long, env = "RETROSCRIPT_MAX_CALL_DEPTH")]
        max_call_depth: Option<usize>,
    },

    /// Check a script for lex and parse errors without running it
    Check {
        /// Script file; reads stdin when omitted or "-"
        script: Option<PathBuf>,
    },

    /// Print the tokens of a script, one per line
    Tokens {
        /// Script file; reads stdin when omitted or "-"
        script: Option<PathBuf>,
    },
}

/// Parses `NAME=VALUE`. VALUE is JSON when it parses, a string otherwise.
fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = RetroConfig::load();
    init_logging(cli.log_dir.as_deref().or(config.log_dir.as_deref()));

    match execute(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.already_reported() {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "retroscript.log");
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[derive(Debug)]
enum CliError {
    Io(String),
    Script(ScriptError),
    /// The script failed and its result was already printed as JSON.
    Reported(ScriptError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Io(_) => 1,
            CliError::Script(e) | CliError::Reported(e) => u8::try_from(e.exit_code()).unwrap_or(1),
        }
    }

    fn already_reported(&self) -> bool {
        matches!(self, CliError::Reported(_))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(msg) => write!(f, "I/O error: {}", msg),
            CliError::Script(e) | CliError::Reported(e) => write!(f, "{}", e),
        }
    }
}

async fn read_source(script: Option<&Path>) -> Result<String, CliError> {
    match script {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CliError::Io(format!("{}: {}", path.display(), e))),
        _ => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .map_err(|e| CliError::Io(format!("stdin: {}", e)))?;
            Ok(source)
        }
    }
}

async fn execute(command: Command, config: &RetroConfig) -> Result<(), CliError> {
    match command {
        Command::Run { script, vars, format, dry_run, max_call_depth } => {
            let source = read_source(script.as_deref()).await?;

            let mut options = RunOptions::from_config(config);
            if let Some(depth) = max_call_depth {
                options = options.with_max_call_depth(depth);
            }
            for (name, value) in vars {
                options = options.with_variable(name, Value::from_json(&value));
            }
            if format == OutputFormat::Text {
                options = options.on_output(|line| println!("{}", line));
            }
            let recorder = dry_run.then(|| Rc::new(RecordingHost::new()));
            let host: Rc<dyn Host> = match &recorder {
                Some(recorder) => Rc::clone(recorder) as Rc<dyn Host>,
                None => Rc::new(ConsoleHost::new()),
            };
            options = options.with_host(host);

            debug!(dry_run, "running script");
            let outcome = run(&source, options).await;

            if let Some(recorder) = recorder {
                for entry in recorder.log() {
                    match serde_json::to_string(&entry) {
                        Ok(line) => eprintln!("{}", line),
                        Err(e) => eprintln!("Error: could not serialize command log: {}", e),
                    }
                }
            }

            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&outcome.to_json())
                        .map_err(|e| CliError::Io(e.to_string()))?;
                    println!("{}", json);
                    match outcome.error {
                        Some(err) => Err(CliError::Reported(err)),
                        None => Ok(()),
                    }
                }
                OutputFormat::Text => match outcome.error {
                    Some(err) => Err(CliError::Script(err)),
                    None => Ok(()),
                },
            }
        }

        Command::Check { script } => {
            let source = read_source(script.as_deref()).await?;
            parse_source(&source).map_err(CliError::Script)?;
            println!("ok");
            Ok(())
        }

        Command::Tokens { script } => {
            let source = read_source(script.as_deref()).await?;
            let tokens = tokenize(&source).map_err(|e| CliError::Script(e.into()))?;
            for token in tokens {
                println!("{}", token);
            }
            Ok(())
        }
    }
}
