//! backchain - backward-chaining decision tables that learn new rules
//!
//! CLI entry point with global panic handler.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use backchain::cli::{
    DecideCommand, DecideOptions, InspectCommand, InspectOptions, PromptRuleFactory,
};
use backchain::config::{crash_log_path, Config};
use backchain::core::{no_learning, ModelHandler};
use backchain::error::{exit_codes, ChainError};

// =============================================================================
// CLI Definition
// =============================================================================

/// backchain - backward-chaining decision tables that learn new rules
#[derive(Parser)]
#[command(name = "backchain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a goal variable from NAME=JSON inputs
    Decide {
        /// Table document (JSON)
        table: PathBuf,
        /// Variable to decide
        goal: String,
        /// Inputs as NAME=JSON, e.g. season="winter" guests=8
        inputs: Vec<String>,
        /// Write the document with learned rules here (otherwise they are discarded)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Ask for a new rule when nothing decides an output
        #[arg(long)]
        learn: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show a document's variables, hit policies and rules
    Inspect {
        /// Table document (JSON)
        table: PathBuf,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    let cli = Cli::parse();
    let config = Config::load();
    init_logging(&config);

    match run(cli, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("backchain error: {}", e);
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Set up the global panic handler.
///
/// On panic, appends to `<home>/crash.log` and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("backchain panic: {}", info);

        if let Some(crash_log) = crash_log_path() {
            if let Some(parent) = crash_log.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Map an error to the process exit code.
fn exit_code_for(err: &ChainError) -> i32 {
    if err.is_unresolved() {
        exit_codes::UNRESOLVED
    } else {
        exit_codes::ERROR
    }
}

/// Run the CLI and return the exit code.
fn run(cli: Cli, config: Config) -> Result<ExitCode, ChainError> {
    match cli.command {
        Commands::Decide {
            table,
            goal,
            inputs,
            output,
            learn,
            json,
            quiet,
        } => {
            let options = DecideOptions {
                table,
                goal,
                inputs,
                output,
                learn,
                json,
                quiet,
            };
            run_decide(config, &options)
        }
        Commands::Inspect { table, json } => run_inspect(config, &InspectOptions { table, json }),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn run_decide(config: Config, options: &DecideOptions) -> Result<ExitCode, ChainError> {
    let cmd = DecideCommand::new(config);

    let output = if options.learn {
        let prompt = |handler: &dyn ModelHandler| {
            PromptRuleFactory::new(handler, io::stdin().lock(), io::stderr())
        };
        cmd.run(options, &prompt)?
    } else {
        cmd.run(options, &no_learning)?
    };

    let formatted = cmd.format_output(&output, options);
    if !formatted.is_empty() {
        print!("{}", formatted);
        if !formatted.ends_with('\n') {
            println!();
        }
    }

    Ok(ExitCode::from(exit_codes::SUCCESS as u8))
}

fn run_inspect(config: Config, options: &InspectOptions) -> Result<ExitCode, ChainError> {
    let cmd = InspectCommand::new(config);
    let output = cmd.run(options)?;
    println!("{}", cmd.format_output(&output, options).trim_end());
    Ok(ExitCode::from(exit_codes::SUCCESS as u8))
}
