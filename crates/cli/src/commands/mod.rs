pub(crate) mod check;
pub(crate) mod files;
pub(crate) mod resolve;
pub(crate) mod write;

use std::path::Path;
use std::process;

use hydroctl_core::{load_build_state, BuildState, Diagnostic, LoaderConfig};
use hydroctl_eval::{Context, Resolution, Resolve};

use crate::profile::{build_context, Profile};
use crate::{report_error, report_failure, OutputFormat};

/// Load the full tree or exit 1.
pub(crate) fn load_or_exit(file: &Path, config: &LoaderConfig<'_>, output: OutputFormat, quiet: bool) -> BuildState {
    match load_build_state(file, config) {
        Ok(bs) => bs,
        Err(e) => {
            report_failure(&e.to_string(), e.to_json_value(), output, quiet);
            process::exit(1);
        }
    }
}

/// Build the context from a profile and run arguments, or exit 1.
pub(crate) fn context_or_exit(
    profile: Option<&Path>,
    args: &[String],
    output: OutputFormat,
    quiet: bool,
) -> Context {
    let profile = match profile.map(Profile::load).transpose() {
        Ok(p) => p,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match build_context(profile.as_ref(), args) {
        Ok(ctx) => ctx,
        Err(e) => {
            report_failure(&e.to_string(), e.to_json_value(), output, quiet);
            process::exit(1);
        }
    }
}

/// Load and resolve, exiting 1 on a fatal error.
pub(crate) fn resolve_or_exit(
    file: &Path,
    profile: Option<&Path>,
    args: &[String],
    output: OutputFormat,
    quiet: bool,
) -> Resolution {
    let ctx = context_or_exit(profile, args, output, quiet);
    let bs = load_or_exit(file, &LoaderConfig::default(), output, quiet);
    tracing::debug!(file = %file.display(), context = %ctx.describe(), "resolving");
    match bs.resolve(&ctx) {
        Ok(resolution) => resolution,
        Err(e) => {
            report_failure(&e.to_string(), e.to_json_value(), output, quiet);
            process::exit(1);
        }
    }
}

/// Text-mode diagnostics go to stderr, one per line.
pub(crate) fn print_diagnostics(diagnostics: &[Diagnostic], quiet: bool) {
    if quiet {
        return;
    }
    for d in diagnostics {
        eprintln!("warning: {}", d);
    }
}

/// 0 when clean, 2 when recoverable problems were reported.
pub(crate) fn exit_for(diagnostics: &[Diagnostic]) -> ! {
    process::exit(if diagnostics.is_empty() { 0 } else { 2 })
}
