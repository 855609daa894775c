//! # SLA CLI: policy validation and deadline preview.
//!
//! ```bash
//! # Validate a policy file:
//! upkeep sla check deploy/sla.yaml
//!
//! # When is an urgent plumbing job due if it was submitted at 08:00?
//! upkeep sla resolve --priority urgent --category plumbing \
//!     --anchor 2026-03-01T08:00:00Z --policies deploy/sla.yaml
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use upkeep_core::{Category, Priority, Timestamp};
use upkeep_state::{PolicyBook, SlaDeadlines, SlaResolution};

use crate::load_policies;

/// SLA subcommand arguments.
#[derive(Args, Debug)]
pub struct SlaArgs {
    #[command(subcommand)]
    pub command: SlaCommand,
}

/// Available SLA subcommands.
#[derive(Subcommand, Debug)]
pub enum SlaCommand {
    /// Validate an SLA policy file.
    Check {
        /// YAML or JSON policy file.
        file: PathBuf,
    },

    /// Compute the three deadlines for a priority and category.
    Resolve {
        /// Request priority: low, medium, high, urgent.
        #[arg(long)]
        priority: Priority,

        /// Work category; falls back to the priority default.
        #[arg(long)]
        category: Option<String>,

        /// RFC 3339 anchor instant; now when omitted.
        #[arg(long)]
        anchor: Option<String>,

        /// Policy file; the built-in policies when omitted.
        #[arg(long)]
        policies: Option<PathBuf>,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Resolved<'a> {
    priority: Priority,
    category: Option<&'a Category>,
    anchor: Timestamp,
    deadlines: Option<SlaDeadlines>,
}

/// Execute the SLA subcommand.
///
/// `resolve` exits with 1 when no policy row applies.
pub fn run_sla(args: &SlaArgs, out: &mut dyn Write) -> Result<u8> {
    match &args.command {
        SlaCommand::Check { file } => match load_policies(file) {
            Ok(book) => {
                writeln!(
                    out,
                    "OK: {} ({} policies)",
                    file.display(),
                    book.policies().len()
                )?;
                Ok(0)
            }
            Err(e) => {
                writeln!(out, "INVALID: {e:#}")?;
                Ok(1)
            }
        },
        SlaCommand::Resolve {
            priority,
            category,
            anchor,
            policies,
            json,
        } => {
            let book = match policies {
                Some(path) => load_policies(path)?,
                None => PolicyBook::standard(),
            };
            let category = category.as_deref().map(Category::new).transpose()?;
            let anchor = match anchor {
                Some(raw) => Timestamp::parse_lenient(raw)
                    .with_context(|| format!("invalid --anchor {raw:?}"))?,
                None => Timestamp::now(),
            };

            let deadlines = match book.resolve(*priority, category.as_ref(), &anchor) {
                SlaResolution::Resolved(d) => Some(d),
                SlaResolution::NoPolicy => None,
            };
            tracing::debug!(%priority, ?category, %anchor, resolved = deadlines.is_some(), "resolved SLA");

            if *json {
                let resolved = Resolved {
                    priority: *priority,
                    category: category.as_ref(),
                    anchor,
                    deadlines,
                };
                writeln!(out, "{}", serde_json::to_string_pretty(&resolved)?)?;
            } else {
                match &deadlines {
                    Some(d) => {
                        writeln!(out, "anchor:   {anchor}")?;
                        writeln!(out, "accept:   {}", d.accept_due)?;
                        writeln!(out, "arrive:   {}", d.arrive_due)?;
                        writeln!(out, "complete: {}", d.complete_due)?;
                    }
                    None => writeln!(out, "no SLA policy for priority {priority}")?,
                }
            }
            Ok(if deadlines.is_some() { 0 } else { 1 })
        }
    }
}
