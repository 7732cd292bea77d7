use std::path::Path;

use crate::commands::{exit_for, print_diagnostics, resolve_or_exit};
use crate::OutputFormat;

pub(crate) fn cmd_resolve(
    file: &Path,
    profile: Option<&Path>,
    context: &[String],
    output: OutputFormat,
    quiet: bool,
) {
    let resolution = resolve_or_exit(file, profile, context, output, quiet);

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&resolution)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            print!("{}", resolution.run_state.to_text());
            print_diagnostics(&resolution.diagnostics, quiet);
        }
    }
    exit_for(&resolution.diagnostics);
}
