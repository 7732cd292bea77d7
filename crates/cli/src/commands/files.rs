use std::path::Path;

use crate::commands::{exit_for, print_diagnostics, resolve_or_exit};
use crate::OutputFormat;

pub(crate) fn cmd_files(
    file: &Path,
    profile: Option<&Path>,
    context: &[String],
    output: OutputFormat,
    quiet: bool,
) {
    let resolution = resolve_or_exit(file, profile, context, output, quiet);
    let mut files = resolution.run_state.files();
    files.insert(resolution.run_state.path.clone());

    match output {
        OutputFormat::Json => {
            let list: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
            let json = serde_json::json!({
                "context": resolution.run_state.context,
                "files": list,
                "diagnostics": resolution.diagnostics,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            for path in &files {
                println!("{}", path.display());
            }
            print_diagnostics(&resolution.diagnostics, quiet);
        }
    }
    exit_for(&resolution.diagnostics);
}
