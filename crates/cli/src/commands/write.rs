use std::path::Path;
use std::process;

use hydroctl_core::{FileSystemProvider, LoaderConfig};

use crate::commands::load_or_exit;
use crate::{report_failure, OutputFormat};

pub(crate) fn cmd_write(file: &Path, stdout: bool, output: OutputFormat, quiet: bool) {
    let config = LoaderConfig {
        load_children: false,
        ..LoaderConfig::default()
    };
    let bs = load_or_exit(file, &config, output, quiet);

    if stdout {
        match bs.to_text() {
            Ok(text) => print!("{}", text),
            Err(e) => {
                report_failure(&e.to_string(), e.to_json_value(), output, quiet);
                process::exit(1);
            }
        }
        return;
    }

    match bs.write_versioned(&FileSystemProvider) {
        Ok(path) => match output {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "written": path.display().to_string() }));
            }
            OutputFormat::Text => {
                if !quiet {
                    println!("wrote {}", path.display());
                }
            }
        },
        Err(e) => {
            report_failure(&e.to_string(), e.to_json_value(), output, quiet);
            process::exit(1);
        }
    }
}
