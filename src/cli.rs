use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Consolidate messy legacy CSV columns into a reviewed target schema",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Propose consolidated field mappings for the headers of a CSV export
    Analyze(AnalyzeArgs),
    /// Show mappings and approve or reject them
    Review(ReviewArgs),
    /// Generate the TypeScript migration script from approved mappings
    Emit(EmitArgs),
    /// Apply approved mappings to every row of a CSV export
    Migrate(MigrateArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ProviderArgs {
    /// Replay a recorded provider response instead of calling the API
    #[arg(long)]
    pub proposals: Option<PathBuf>,
    /// Model name (defaults to $OPENAI_MODEL or the built-in default)
    #[arg(long)]
    pub model: Option<String>,
    /// Base URL of an OpenAI-compatible API (defaults to $OPENAI_BASE_URL)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Reasoning effort hint sent to the model ('none' to omit)
    #[arg(long = "reasoning-effort")]
    pub reasoning_effort: Option<String>,
    /// HTTP timeout for the provider call in seconds
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "request"])))]
pub struct AnalyzeArgs {
    /// Legacy CSV export whose header row is analyzed
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// JSON request body with a `headers` array ('-' for stdin); prints the JSON reply
    #[arg(long)]
    pub request: Option<PathBuf>,
    /// Review file to write (.json, .yaml or .yml)
    #[arg(short = 'o', long = "output", conflicts_with = "request")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub provider: ProviderArgs,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Review file produced by `analyze`
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
    /// Target fields to approve (comma-separated or repeated)
    #[arg(long, action = clap::ArgAction::Append)]
    pub approve: Vec<String>,
    /// Target fields to reject (comma-separated or repeated)
    #[arg(long, action = clap::ArgAction::Append)]
    pub reject: Vec<String>,
    /// Approve every mapping before applying --approve/--reject
    #[arg(long = "approve-all", conflicts_with = "reject_all")]
    pub approve_all: bool,
    /// Reject every mapping before applying --approve/--reject
    #[arg(long = "reject-all")]
    pub reject_all: bool,
}

#[derive(Debug, Args)]
pub struct EmitArgs {
    /// Review file produced by `analyze`
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
    /// Destination script (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Name of the exported migration function
    #[arg(long = "function-name")]
    pub function_name: Option<String>,
    /// Identifier of the destination table
    #[arg(long)]
    pub table: Option<String>,
    /// Module that exports the database handle and table
    #[arg(long = "db-module")]
    pub db_module: Option<String>,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Legacy CSV export to migrate
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Review file produced by `analyze`
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
