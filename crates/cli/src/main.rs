mod commands;
mod profile;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Hydraulic model control-file reader.
#[derive(Parser)]
#[command(name = "hydroctl", version, about = "Hydraulic model control-file reader")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a control file tree for one run and print the result
    Resolve {
        /// Root control file (.tcf)
        file: PathBuf,
        /// TOML run profile with default scenarios, events and variables
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Run arguments: -s1 D01 -s2 5m -e1 Q100
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        context: Vec<String>,
    },

    /// List every file a run reads
    Files {
        /// Root control file (.tcf)
        file: PathBuf,
        /// TOML run profile with default scenarios, events and variables
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Run arguments: -s1 D01 -s2 5m -e1 Q100
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        context: Vec<String>,
    },

    /// Load a control file tree with every variant and report problems
    Check {
        /// Root control file (.tcf)
        file: PathBuf,
    },

    /// Re-serialize a control file into its next versioned name
    Write {
        /// Control file to rewrite
        file: PathBuf,
        /// Print the text instead of writing a file
        #[arg(long)]
        stdout: bool,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Resolve {
            file,
            profile,
            context,
        } => {
            commands::resolve::cmd_resolve(&file, profile.as_deref(), &context, cli.output, cli.quiet);
        }
        Commands::Files {
            file,
            profile,
            context,
        } => {
            commands::files::cmd_files(&file, profile.as_deref(), &context, cli.output, cli.quiet);
        }
        Commands::Check { file } => {
            commands::check::cmd_check(&file, cli.output, cli.quiet);
        }
        Commands::Write { file, stdout } => {
            commands::write::cmd_write(&file, stdout, cli.output, cli.quiet);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print a structured error (`to_json_value()` shape) to stderr.
pub(crate) fn report_failure(text: &str, json: serde_json::Value, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let err_json = serde_json::to_string_pretty(&json)
                .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", text.replace('"', "\\\"")));
            eprintln!("{}", err_json);
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error: {}", text);
            }
        }
    }
}
