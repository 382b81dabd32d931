//! Scmt CLI - a command-line driver for the scheme compiler and VM.
//!
//! Parses arguments, initializes logging, loads configuration, and
//! dispatches to the `repl`/`eval`/`run`/`disasm` command handlers.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    disasm::{run_disasm, DisasmArgs},
    eval::{run_eval, EvalArgs},
    repl::{run_repl, ReplArgs},
    run::{run_run, RunArgs},
};
use config::Config;
use error::{Result, ScmtError};

/// Scmt - a CLI driver for the scheme compiler and virtual machine.
#[derive(Parser, Debug)]
#[command(name = "scmt")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read, evaluate, compile, and disassemble scheme source", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "SCMT_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "SCMT_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "SCMT_NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive read-eval-print loop
    Repl(ReplCommand),

    /// Tree-walk evaluate a source file's top-level forms
    Eval(EvalCommand),

    /// Compile, assemble, and execute a source file on the VM
    Run(RunCommand),

    /// Compile a source file and print its assembled instructions
    Disasm(DisasmCommand),
}

#[derive(Parser, Debug)]
struct ReplCommand {
    /// Heap size in bytes
    #[arg(long)]
    heap_bytes: Option<usize>,
}

#[derive(Parser, Debug)]
struct EvalCommand {
    /// Source file to evaluate
    file: PathBuf,

    /// Heap size in bytes
    #[arg(long)]
    heap_bytes: Option<usize>,
}

#[derive(Parser, Debug)]
struct RunCommand {
    /// Source file to compile and run
    file: PathBuf,

    /// Heap size in bytes
    #[arg(long)]
    heap_bytes: Option<usize>,
}

#[derive(Parser, Debug)]
struct DisasmCommand {
    /// Source file to compile
    file: PathBuf,

    /// Heap size in bytes
    #[arg(long)]
    heap_bytes: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.no_color)?;

    let config = load_config(cli.config.as_deref())?;

    execute_command(cli.command, cli.verbose, config)
}

fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = if verbose { EnvFilter::new("debug") } else { EnvFilter::new("info") };

    let subscriber = fmt::layer().with_ansi(!no_color).with_target(false).with_thread_ids(false).with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| ScmtError::Config(format!("failed to initialize logging: {e}")))?;

    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn execute_command(command: Commands, verbose: bool, config: Config) -> Result<()> {
    match command {
        Commands::Repl(args) => execute_repl(args, config),
        Commands::Eval(args) => execute_eval(args, verbose, config),
        Commands::Run(args) => execute_run(args, config),
        Commands::Disasm(args) => execute_disasm(args, config),
    }
}

fn execute_repl(args: ReplCommand, config: Config) -> Result<()> {
    Ok(run_repl(ReplArgs { heap_bytes: args.heap_bytes.unwrap_or(config.heap_bytes) })?)
}

fn execute_eval(args: EvalCommand, verbose: bool, config: Config) -> Result<()> {
    Ok(run_eval(EvalArgs { file: args.file, heap_bytes: args.heap_bytes.unwrap_or(config.heap_bytes), verbose })?)
}

fn execute_run(args: RunCommand, config: Config) -> Result<()> {
    Ok(run_run(RunArgs { file: args.file, heap_bytes: args.heap_bytes.unwrap_or(config.heap_bytes) })?)
}

fn execute_disasm(args: DisasmCommand, config: Config) -> Result<()> {
    Ok(run_disasm(DisasmArgs { file: args.file, heap_bytes: args.heap_bytes.unwrap_or(config.heap_bytes) })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_eval() {
        let cli = Cli::parse_from(["scmt", "eval", "prog.scm"]);
        assert!(matches!(cli.command, Commands::Eval(_)));
    }

    #[test]
    fn test_cli_parse_run_with_heap_bytes() {
        let cli = Cli::parse_from(["scmt", "run", "prog.scm", "--heap-bytes", "4096"]);
        if let Commands::Run(args) = cli.command {
            assert_eq!(args.heap_bytes, Some(4096));
        } else {
            panic!("expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_disasm() {
        let cli = Cli::parse_from(["scmt", "disasm", "prog.scm"]);
        assert!(matches!(cli.command, Commands::Disasm(_)));
    }

    #[test]
    fn test_cli_parse_repl() {
        let cli = Cli::parse_from(["scmt", "repl"]);
        assert!(matches!(cli.command, Commands::Repl(_)));
    }

    #[test]
    fn test_cli_parse_global_verbose() {
        let cli = Cli::parse_from(["scmt", "--verbose", "repl"]);
        assert!(cli.verbose);
    }
}
