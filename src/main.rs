mod repl;

use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tspdbg_config::logging::{
    default_log_file_path, ensure_log_dir, rotate_log_files, DEFAULT_MAX_LOG_FILES,
    DEFAULT_MAX_LOG_SIZE,
};
use tspdbg_config::{load_config, load_file, paths, Config, ConfigError};
use tspdbg_session::{Breakpoint, DebugInfo, DebuggerClient, Notification, SessionError};
use tspdbg_stream::StackSnapshot;

use crate::repl::{
    format_assigned, format_backtrace, format_exception, format_variables, ReplCommand, HELP,
};

/// Line-oriented debugger for TSP scripts.
#[derive(Debug, Parser)]
#[command(name = "tspdbg", version)]
struct Args {
    /// Directory holding config.toml
    #[arg(long, value_name = "DIR", conflicts_with = "config")]
    config_dir: Option<PathBuf>,

    /// Use this config file instead of the config directory
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Break at LINE (repeatable)
    #[arg(short = 'b', long = "break", value_name = "LINE", action = ArgAction::Append)]
    breakpoints: Vec<u32>,

    /// Script to debug
    script: String,
}

fn load(args: &Args) -> (Config, Option<ConfigError>) {
    let loaded = match &args.config {
        Some(path) => load_file(path),
        None => match args.config_dir.clone().or_else(paths::config_dir) {
            Some(dir) => load_config(&dir, env::current_dir().ok().as_deref()),
            None => Ok(Config::default()),
        },
    };
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    }
}

fn init_logging(config: &Config) -> Result<PathBuf> {
    let path = config.log.file.clone().unwrap_or_else(default_log_file_path);
    ensure_log_dir(&path).context("failed to create log directory")?;
    if let Err(e) = rotate_log_files(&path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES) {
        eprintln!("tspdbg: log rotation failed: {e}");
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
    Ok(path)
}

fn prompt() {
    print!("(tspdbg) ");
    let _ = std::io::stdout().flush();
}

fn report_stop(what: &str, stack: &StackSnapshot) {
    match stack.top() {
        Some(frame) => println!("{what} at line {} in {}", frame.current_line, frame.name),
        None => println!("{what}"),
    }
}

/// What the main loop does after a notification or command.
enum Flow {
    Continue,
    Stop,
}

fn on_notification(note: Notification) -> Flow {
    match note {
        Notification::Output(text) => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        Notification::StackUpdated(_) => {}
        Notification::BreakpointHit(stack) => {
            report_stop("breakpoint", &stack);
            prompt();
        }
        Notification::Stepped(stack) => {
            report_stop("stepped", &stack);
            prompt();
        }
        Notification::ExceptionRaised(record) => {
            print!("{}", format_exception(&record));
            prompt();
        }
        Notification::SetVariableFailed(message) => {
            eprintln!("set failed: {message}");
        }
        Notification::SessionEnded => {
            println!("session ended");
            return Flow::Stop;
        }
        Notification::Fatal(message) => {
            eprintln!("debugger error: {message}");
            return Flow::Stop;
        }
    }
    Flow::Continue
}

async fn on_command(client: &DebuggerClient, cmd: ReplCommand) -> Result<Flow, SessionError> {
    let session = client.session();
    match cmd {
        ReplCommand::Continue => client.continue_run().await?,
        ReplCommand::StepOver => client.step_over().await?,
        ReplCommand::StepIn => client.step_in().await?,
        ReplCommand::StepOut => client.step_out().await?,
        ReplCommand::Restart => client.restart().await?,
        ReplCommand::Clear => client.clear_breakpoints().await?,
        ReplCommand::Break(bp) => {
            let line = bp.line;
            client.set_breakpoint(bp).await?;
            println!("breakpoint set on line {line}");
        }
        ReplCommand::Backtrace => match session.lock().await.stack() {
            Some(stack) => print!("{}", format_backtrace(&stack)),
            None => println!("no stack yet"),
        },
        ReplCommand::Vars { scope, level } => {
            let session = session.lock().await;
            print!("{}", format_variables(session.variables(level, scope)));
        }
        ReplCommand::Set {
            scope,
            level,
            path,
            value,
        } => {
            let wait = client.set_variable(path.clone(), &value, scope, level).await?;
            let stack = client.next_stack(wait).await?;
            let vars = stack.frame(level).map(|f| f.variables(scope)).unwrap_or_default();
            print!("{}", format_assigned(vars, &path));
        }
        ReplCommand::Watch { expression, level } => {
            match client.evaluate_watch(&expression, level).await? {
                Some(w) => println!("{} = {} ({})", w.expression, w.value, w.var_type.as_str()),
                None => println!("{expression}: no value"),
            }
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => return Ok(Flow::Stop),
    }
    Ok(Flow::Continue)
}

async fn run(args: Args) -> Result<()> {
    let (config, config_error) = load(&args);
    let log_path = init_logging(&config)?;
    if let Some(e) = config_error {
        error!("config load failed, using defaults: {}", e);
        eprintln!("tspdbg: {e}; using defaults");
    }
    info!("tspdbg starting, logging to {}", log_path.display());

    let (mut client, mut notes) = DebuggerClient::spawn(
        &config.debugger.command,
        &config.debugger.args,
        config.markers.clone(),
        config.debugger.stack_timeout(),
    )
    .with_context(|| format!("failed to launch `{}`", config.debugger.command))?;

    let info = DebugInfo {
        file_name: args.script.clone(),
        breakpoints: args
            .breakpoints
            .iter()
            .map(|&line| Breakpoint::new(line).to_args())
            .collect(),
    };
    client.start(&info).await.context("failed to start debugging")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            note = notes.recv() => {
                let Some(note) = note else { break };
                if let Flow::Stop = on_notification(note) {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                match ReplCommand::parse(&line) {
                    Ok(cmd) => match on_command(&client, cmd).await {
                        Ok(Flow::Stop) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => eprintln!("{e}"),
                    },
                    Err(repl::ReplError::Empty) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    let status = client.terminate().await.context("failed to stop debugger")?;
    info!("debugger finished: {}", status);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("tspdbg: {:#}", e);
        std::process::exit(1);
    }
}
