use std::path::Path;
use std::process;

use hydroctl_core::LoaderConfig;

use crate::commands::{exit_for, load_or_exit, print_diagnostics};
use crate::{report_failure, OutputFormat};

/// Load every variant, then make sure each file can be written back.
pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let bs = load_or_exit(file, &LoaderConfig::default(), output, quiet);

    let mut files = 0usize;
    let mut statements = 0usize;
    let mut pending = vec![&bs];
    while let Some(state) = pending.pop() {
        files += 1;
        statements += state.statements.iter().filter(|s| s.is_content()).count();
        if let Err(e) = state.to_text() {
            report_failure(&e.to_string(), e.to_json_value(), output, quiet);
            process::exit(1);
        }
        pending.extend(state.children());
    }
    let diagnostics = bs.all_diagnostics();

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "file": bs.file_name(),
                "files": files,
                "statements": statements,
                "diagnostics": diagnostics,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: {} files, {} statements, {} problems",
                    bs.file_name(),
                    files,
                    statements,
                    diagnostics.len()
                );
            }
            print_diagnostics(&diagnostics, quiet);
        }
    }
    exit_for(&diagnostics);
}
