use std::path::PathBuf;

use clap::Subcommand;

use crate::{EngineArgs, OutputArgs};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse and validate a configuration document.
    Validate {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Summarize an API configuration: auth, functions, schedules, webhooks.
    Inspect {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run one API configuration with in-memory stores until interrupted.
    Run {
        path: PathBuf,
        /// API name (defaults to the file stem).
        #[arg(long, default_value = "api")]
        name: String,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}
