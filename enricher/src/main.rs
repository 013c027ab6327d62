//! Resumable batch email enrichment.
//!
//! Walks the rows of a spreadsheet, asks an external LLM CLI for each company's
//! contact email and writes the answer back, checkpointing after every row so
//! an interrupted run can be resumed.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::error;

use enricher::core::selector::Mode;
use enricher::exit_codes;
use enricher::io::cancel::CancelToken;
use enricher::io::config::{EnricherConfig, load_config, write_config};
use enricher::io::table_store::DatasetNotFound;
use enricher::lookup::LookupError;
use enricher::logging;
use enricher::run_loop::RunStop;
use enricher::session::{RunOptions, run_from_config};
use enricher::status::{read_status, render_status, render_status_json, render_summary};

#[derive(Parser)]
#[command(
    name = "enricher",
    version,
    about = "Resumable batch email enrichment via an LLM CLI"
)]
struct Cli {
    /// Config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "enricher.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up emails for the selected rows, saving after each one.
    Run {
        /// How to treat existing progress: continue, restart or retry-not-found.
        #[arg(long)]
        mode: Option<Mode>,
        /// Do not prompt; continue existing progress.
        #[arg(short, long)]
        yes: bool,
    },
    /// Print how many rows are found, not found and pending.
    Status {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { mode, yes } => cmd_run(&cli.config, mode, yes),
        Command::Status { json } => cmd_status(&cli.config, json),
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_run(config_path: &Path, mode: Option<Mode>, yes: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let token = CancelToken::new();
    token.install_ctrlc()?;

    let outcome = run_from_config(
        &config,
        RunOptions {
            mode,
            assume_yes: yes,
        },
        token,
    )?;
    print!("{}", render_summary(&outcome));
    Ok(match outcome.stop {
        RunStop::Completed | RunStop::Cancelled => exit_codes::OK,
        RunStop::QuotaExhausted { .. } => exit_codes::QUOTA_EXHAUSTED,
    })
}

fn cmd_status(config_path: &Path, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let report = read_status(&config)?;
    if json {
        print!("{}", render_status_json(&report)?);
    } else {
        print!("{}", render_status(&report));
    }
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &EnricherConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn report_error(err: &anyhow::Error) {
    if let Some(missing) = err.downcast_ref::<DatasetNotFound>() {
        error!(path = %missing.path.display(), "dataset not found; check dataset_path in the config");
    } else if let Some(LookupError::ToolMissing { program }) = err.downcast_ref::<LookupError>() {
        error!(%program, "lookup tool not found; install it and make sure it is on PATH");
    } else {
        error!(error = %format!("{err:#}"), "enricher failed");
    }
    eprintln!("error: {err:#}");
}
