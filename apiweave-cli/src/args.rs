use std::path::PathBuf;

use clap::Args;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EngineArgs {
    /// Public base URL used for callback and webhook registration URLs.
    #[arg(long, default_value = "http://localhost:8088")]
    pub base_url: String,

    /// Directory for files persisted by storefile actions.
    #[arg(long, default_value = ".apiweave")]
    pub data_dir: PathBuf,

    /// Set a variable before startup (NAME=VALUE, repeatable).
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,
}
