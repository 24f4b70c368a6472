use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use parley_config::{ParleyConfig, Severity, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => show(explicit),
        ConfigAction::Check { verbose } => {
            let result = check(explicit);
            if report(&result, verbose) {
                std::process::exit(1);
            }
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn show(explicit: Option<&Path>) -> Result<()> {
    if explicit.is_none() && parley_config::find_config_file().is_none() {
        eprintln!(
            "No config file found; showing defaults. Write them to {} to customize.\n",
            parley_config::find_or_default_config_path().display()
        );
    }
    let config = crate::load_config(explicit)?;
    print!("{}", parley_config::to_toml_string(&config)?);
    Ok(())
}

/// Validate the explicit file, the discovered file, or the defaults.
fn check(explicit: Option<&Path>) -> ValidationResult {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(parley_config::find_config_file);
    match path {
        Some(path) => parley_config::validate_file(&path),
        None => parley_config::validate(&ParleyConfig::default()),
    }
}

/// Print diagnostics to stderr. Returns `true` when any is an error.
fn report(result: &ValidationResult, verbose: bool) -> bool {
    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            );
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    errors > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[dispatch]\nconcurrency_in_session = 0\n").unwrap();

        let result = check(Some(&path));
        assert!(result.has_errors());
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn check_accepts_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[dispatch]\npool_workers = 2\n").unwrap();
        assert!(!check(Some(&path)).has_errors());
    }
}
