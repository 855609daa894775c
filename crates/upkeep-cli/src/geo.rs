//! # Geo CLI: distance checks.
//!
//! Uses the same haversine the provider matcher ranks by, so operators can
//! sanity-check a `max_distance_km` before configuring it.
//!
//! ```bash
//! upkeep geo distance --from 24.7136,46.6753 --to 21.4858,39.1925
//! ```

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use upkeep_core::GeoPoint;

/// Geo subcommand arguments.
#[derive(Args, Debug)]
pub struct GeoArgs {
    #[command(subcommand)]
    pub command: GeoCommand,
}

/// Available geo subcommands.
#[derive(Subcommand, Debug)]
pub enum GeoCommand {
    /// Great-circle distance in kilometres between two points.
    Distance {
        /// First point as `lat,lng`.
        #[arg(long, allow_hyphen_values = true)]
        from: String,

        /// Second point as `lat,lng`.
        #[arg(long, allow_hyphen_values = true)]
        to: String,
    },
}

/// Execute the geo subcommand.
pub fn run_geo(args: &GeoArgs, out: &mut dyn Write) -> Result<u8> {
    match &args.command {
        GeoCommand::Distance { from, to } => {
            let a = parse_point(from).context("invalid --from")?;
            let b = parse_point(to).context("invalid --to")?;
            writeln!(out, "{:.3} km", a.distance_to(&b))?;
            Ok(0)
        }
    }
}

/// Parse `lat,lng` into a validated point.
fn parse_point(raw: &str) -> Result<GeoPoint> {
    let (lat, lng) = raw
        .split_once(',')
        .with_context(|| format!("expected `lat,lng`, got {raw:?}"))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("bad latitude {lat:?}"))?;
    let lng: f64 = lng.trim().parse().with_context(|| format!("bad longitude {lng:?}"))?;
    Ok(GeoPoint::new(lat, lng)?)
}
