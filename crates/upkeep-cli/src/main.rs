//! # upkeep CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use upkeep_cli::geo::{run_geo, GeoArgs};
use upkeep_cli::sla::{run_sla, SlaArgs};
use upkeep_cli::table::{run_table, TableArgs};

/// Operator tooling for the maintenance request engine.
///
/// Validates transition tables and SLA policy files before deployment and
/// previews deadlines and distances offline.
#[derive(Parser, Debug)]
#[command(name = "upkeep", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and inspect lifecycle transition tables.
    Table(TableArgs),

    /// Validate SLA policy files and compute deadlines.
    Sla(SlaArgs),

    /// Distance calculations used by provider matching.
    Geo(GeoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut stdout = std::io::stdout();
    let result = match cli.command {
        Commands::Table(args) => run_table(&args, &mut stdout),
        Commands::Sla(args) => run_sla(&args, &mut stdout),
        Commands::Geo(args) => run_geo(&args, &mut stdout),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use upkeep_cli::geo::GeoCommand;
    use upkeep_cli::sla::SlaCommand;
    use upkeep_cli::table::TableCommand;
    use upkeep_core::Priority;
    use upkeep_state::Stage;

    #[test]
    fn cli_parse_table_check() {
        let cli = Cli::try_parse_from(["upkeep", "table", "check", "t.yaml"]).unwrap();
        let Commands::Table(args) = cli.command else {
            panic!("expected table command");
        };
        assert!(matches!(args.command, TableCommand::Check { ref file } if file.ends_with("t.yaml")));
    }

    #[test]
    fn cli_parse_table_next() {
        let cli = Cli::try_parse_from([
            "upkeep", "table", "next", "--from", "in_progress", "--role", "vendor",
        ])
        .unwrap();
        let Commands::Table(args) = cli.command else {
            panic!("expected table command");
        };
        match args.command {
            TableCommand::Next { from, role, file } => {
                assert_eq!(from, Stage::InProgress);
                assert_eq!(role, "vendor");
                assert!(file.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_stage() {
        assert!(Cli::try_parse_from([
            "upkeep", "table", "next", "--from", "limbo", "--role", "admin",
        ])
        .is_err());
    }

    #[test]
    fn cli_parse_sla_resolve() {
        let cli = Cli::try_parse_from([
            "upkeep", "-vv", "sla", "resolve", "--priority", "HIGH", "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Sla(args) = cli.command else {
            panic!("expected sla command");
        };
        match args.command {
            SlaCommand::Resolve {
                priority,
                category,
                json,
                ..
            } => {
                assert_eq!(priority, Priority::High);
                assert!(category.is_none());
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_parse_geo_distance_with_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "upkeep", "geo", "distance", "--from", "-33.86,151.21", "--to", "-37.81,144.96",
        ])
        .unwrap();
        let Commands::Geo(args) = cli.command else {
            panic!("expected geo command");
        };
        let GeoCommand::Distance { from, to } = args.command;
        assert_eq!(from, "-33.86,151.21");
        assert_eq!(to, "-37.81,144.96");
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["upkeep"]).is_err());
    }
}
