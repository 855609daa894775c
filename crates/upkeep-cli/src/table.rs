//! # Table CLI: Transition table validation and inspection.
//!
//! ```bash
//! # Validate a table before rolling it out:
//! upkeep table check deploy/transitions.yaml
//!
//! # Print the built-in table, or a file's:
//! upkeep table show
//! upkeep table show --file deploy/transitions.yaml
//!
//! # What can a technician do with a scheduled request?
//! upkeep table next --from scheduled --role technician
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use upkeep_core::Role;
use upkeep_state::{Stage, TransitionTable};

use crate::load_table;

/// Table subcommand arguments.
#[derive(Args, Debug)]
pub struct TableArgs {
    #[command(subcommand)]
    pub command: TableCommand,
}

/// Available table subcommands.
#[derive(Subcommand, Debug)]
pub enum TableCommand {
    /// Validate a transition table file.
    Check {
        /// YAML or JSON table file.
        file: PathBuf,
    },

    /// Print every edge and its roles.
    Show {
        /// Table file; the built-in table when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List the stages reachable from a stage by a role.
    Next {
        /// Current stage, e.g. `scheduled`.
        #[arg(long)]
        from: Stage,

        /// Actor role, e.g. `technician`.
        #[arg(long)]
        role: String,

        /// Table file; the built-in table when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Execute the table subcommand.
pub fn run_table(args: &TableArgs, out: &mut dyn Write) -> Result<u8> {
    match &args.command {
        TableCommand::Check { file } => match load_table(file) {
            Ok(table) => {
                writeln!(out, "OK: {} ({} edges)", file.display(), table.len())?;
                Ok(0)
            }
            Err(e) => {
                writeln!(out, "INVALID: {e:#}")?;
                Ok(1)
            }
        },
        TableCommand::Show { file } => {
            let table = resolve(file.as_ref())?;
            for (from, to, roles) in table.edges() {
                let roles: Vec<&str> = roles.iter().map(Role::as_str).collect();
                writeln!(
                    out,
                    "{:<28} -> {:<28} [{}]",
                    from.as_str(),
                    to.as_str(),
                    roles.join(", ")
                )?;
            }
            writeln!(out)?;
            writeln!(out, "Total: {} edges", table.len())?;
            Ok(0)
        }
        TableCommand::Next { from, role, file } => {
            let table = resolve(file.as_ref())?;
            let role = Role::new(role)?;
            let targets = table.targets_from(*from, &role);
            tracing::debug!(from = %from, role = %role, count = targets.len(), "resolved next stages");
            if targets.is_empty() {
                writeln!(out, "{role} cannot move a request out of {from}")?;
            }
            for target in targets {
                writeln!(out, "{target}")?;
            }
            Ok(0)
        }
    }
}

fn resolve(file: Option<&PathBuf>) -> Result<TransitionTable> {
    match file {
        Some(path) => load_table(path),
        None => Ok(TransitionTable::standard()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(command: TableCommand) -> (u8, String) {
        let mut out = Vec::new();
        let code = run_table(&TableArgs { command }, &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    fn write_table(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn check_accepts_valid_table() {
        let file = write_table(
            "edges:\n  - from: draft\n    to: submitted\n    roles: [requester]\n  - from: submitted\n    to: cancelled\n    roles: [requester]\n",
        );
        let (code, out) = run(TableCommand::Check {
            file: file.path().to_path_buf(),
        });
        assert_eq!(code, 0);
        assert!(out.contains("2 edges"));
    }

    #[test]
    fn check_rejects_edges_out_of_archived() {
        let file = write_table("edges:\n  - from: archived\n    to: draft\n    roles: [admin]\n");
        let (code, out) = run(TableCommand::Check {
            file: file.path().to_path_buf(),
        });
        assert_eq!(code, 1);
        assert!(out.starts_with("INVALID"));
    }

    #[test]
    fn show_prints_standard_table() {
        let (code, out) = run(TableCommand::Show { file: None });
        assert_eq!(code, 0);
        assert!(out.contains("billed"));
        assert!(out.contains(&format!("Total: {} edges", TransitionTable::standard().len())));
    }

    #[test]
    fn next_lists_targets_for_role() {
        let (code, out) = run(TableCommand::Next {
            from: Stage::Scheduled,
            role: "technician".into(),
            file: None,
        });
        assert_eq!(code, 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["in_progress", "on_hold"]);
    }

    #[test]
    fn next_reports_dead_end() {
        let (_, out) = run(TableCommand::Next {
            from: Stage::Billed,
            role: "technician".into(),
            file: None,
        });
        assert!(out.contains("cannot move"));
    }
}
