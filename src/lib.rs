//! # icftl
//!
//! Online runtime verification of iCFTL (inter-procedural Control-Flow Temporal Logic)
//! specifications over the event streams of instrumented programs.
//!
//! This crate provides the command-line driver:
//! it validates specification files and replays recorded event traces
//! through an [`icftl_core::Monitor`], printing a verdict report.
//!
//! Specifications are written in either of the formats supported by [`icftl_lang`]:
//!
//! - [x] textual iCFTL syntax (`.icftl` files);
//! - [x] JSON syntax (`.json` files).
//!
//! Traces are CSV or JSON-lines files, possibly gzip-compressed.

mod monitor;
mod progress;
mod report;
mod trace;

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use icftl_lang::Loaded;
use monitor::MonitorArgs;
use progress::Bar;

/// Supported specification formats.
#[deny(missing_docs)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    /// Textual iCFTL syntax.
    ///
    /// A file holds any number of `spec NAME { ... }` blocks,
    /// each declaring its quantifiers followed by the formula to `check`.
    Text,
    /// JSON syntax.
    ///
    /// A file holds a single object with a `specifications` list.
    Json,
}

impl From<Format> for icftl_lang::Format {
    fn from(value: Format) -> Self {
        match value {
            Format::Text => icftl_lang::Format::Text,
            Format::Json => icftl_lang::Format::Json,
        }
    }
}

/// Available commands.
#[deny(missing_docs)]
#[derive(Subcommand)]
enum Commands {
    /// Validate the syntactical and semantical correctness of the specifications, without monitoring.
    Validate,
    /// Monitor a recorded event trace against the specifications
    ///
    /// EXAMPLE: icftl PATH/TO/SPECS monitor PATH/TO/TRACE.csv
    /// EXAMPLE: icftl PATH/TO/SPECS monitor --drop --capacity 256 PATH/TO/TRACE.jsonl.gz
    #[clap(verbatim_doc_comment)]
    Monitor {
        /// Args for trace monitoring.
        #[clap(flatten)]
        args: MonitorArgs,
        /// Print a progress bar while the trace is replayed.
        ///
        /// By default, only a terse message is printed when replay starts.
        /// For long traces, it might be nice to see in real-time how monitoring is proceeding.
        #[arg(long, value_enum)]
        progress: Option<Bar>,
        /// Print JSON-serialized final report.
        ///
        /// By default, a user-friendly report is printed at the end of monitoring.
        /// This flag has the report printed in JSON format instead.
        #[arg(long)]
        json: bool,
    },
}

/// An online monitor for iCFTL specifications.
///
/// Checks recorded event traces of instrumented programs
/// against iCFTL specifications, reporting a verdict for every binding.
#[derive(Parser)]
#[deny(missing_docs)]
#[command(version, about, long_about)]
pub struct Cli {
    /// Path of the specification file.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    specifications: PathBuf,
    /// Format of the specification file.
    ///
    /// By default, `.json` files are read as JSON and everything else as text,
    /// but this can be specified to resolve ambiguity.
    #[arg(short, long, value_enum)]
    format: Option<Format>,
    /// Verbose output
    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity,
    /// Actions to execute on the specifications.
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let name = self
            .specifications
            .file_name()
            .and_then(|os_str| os_str.to_str())
            .unwrap_or("specifications")
            .to_owned();

        match self.command {
            Commands::Validate => {
                eprint!("Processing specifications, please wait...");
                let loaded = self.load()?;
                eprintln!(" done");
                if loaded.errors.is_empty() {
                    println!(
                        "{} specifications in '{name}' successfully validated",
                        loaded.specifications.len()
                    );
                } else {
                    for err in &loaded.errors {
                        eprintln!("{err}");
                    }
                    bail!(
                        "{} of {} specifications in '{name}' are not valid",
                        loaded.errors.len(),
                        loaded.errors.len() + loaded.specifications.len()
                    );
                }
            }
            Commands::Monitor {
                ref args,
                progress,
                json,
            } => {
                eprint!("Processing specifications...");
                let loaded = self.load()?;
                eprintln!(" done");
                for err in &loaded.errors {
                    eprintln!("skipping {err}");
                }
                if loaded.specifications.is_empty() {
                    bail!("no valid specification to monitor in '{name}'");
                }
                eprint!("Reading trace...");
                let events = trace::load(&args.trace, args.trace_format)?;
                eprintln!(" done");
                let report = if progress.is_some() {
                    args.run(name, loaded.specifications, events, progress)?
                } else {
                    eprint!("Monitoring in progress...");
                    let report = args.run(name, loaded.specifications, events, None)?;
                    eprintln!(" done!");
                    report
                };
                report.print(json);
            }
        }
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Loaded> {
        match self.format {
            Some(format) => icftl_lang::load_as(&self.specifications, format.into()),
            None => icftl_lang::load(&self.specifications),
        }
    }
}

// From Clap tutorial <https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing>
#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
