use std::path::Path;

use {
    anyhow::Result,
    clap::{Subcommand, ValueEnum},
};

use chatrelay_config::validate::{self, Severity};

use crate::chat_commands::load_provider;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the resolved configuration for a session.
    Show {
        /// Session id; its local part selects a channel override.
        #[arg(long, short)]
        session: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

pub fn handle_config(config: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(config, verbose),
        ConfigAction::Show { session, format } => show(config, session.as_deref(), format),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(config);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} [{}] {}", d.category, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{label}{RESET} [{}] {}: {}",
                d.category, d.path, d.message
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

    if result.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn show(config: Option<&Path>, session: Option<&str>, format: Format) -> Result<()> {
    let provider = load_provider(config)?;
    let effective = match session {
        Some(id) => provider.resolve(id)?,
        None => provider.resolve_global()?,
    };

    let rendered = match format {
        Format::Json => serde_json::to_string_pretty(&effective)?,
        Format::Yaml => serde_yaml::to_string(&effective)?,
    };
    println!("{rendered}");
    Ok(())
}
