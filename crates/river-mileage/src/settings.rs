use clap::{Parser, Subcommand};
use river_mileage_lib::{BatchMode, Config, RangePolicy, utils::DEFAULT_TOLERANCE};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// River Mileage - Segment ranks and cumulative mileage for branching river networks
pub struct Settings {
    /// Network document (JSON) with segments and optional outlet markers
    #[arg(short, long)]
    pub network: PathBuf,

    /// Proximity tolerance in map units
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Search distance for outlet markers without a segment id (defaults to the tolerance)
    #[arg(long)]
    pub outlet_search_distance: Option<f64>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Summary of the built network
    Info,
    /// Oriented segments with their ranks
    Ranks,
    /// Mileage table for a list of points of interest
    Mileage {
        /// Points document (JSON)
        #[arg(short, long)]
        points: PathBuf,
        /// Report failing points instead of aborting
        #[arg(long)]
        best_effort: bool,
    },
    /// Points from (segment, distance) rows
    Place {
        /// Rows document (JSON)
        #[arg(short, long)]
        rows: PathBuf,
        /// Clamp distances to the segment instead of rejecting them
        #[arg(long)]
        clamp: bool,
    },
    /// Random points of interest along every segment
    Sample {
        #[arg(long, default_value_t = 10)]
        per_segment: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

impl Settings {
    /// Library configuration for this invocation
    pub fn config(&self) -> Config {
        let mut config = Config::with_tolerance(self.tolerance);
        if let Some(distance) = self.outlet_search_distance {
            config.outlet_search_distance = distance;
        }
        match &self.command {
            Command::Mileage {
                best_effort: true, ..
            } => config.batch_mode = BatchMode::BestEffort,
            Command::Place { clamp: true, .. } => config.range_policy = RangePolicy::Clamp,
            _ => {}
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings =
            Settings::try_parse_from(["river-mileage", "-n", "net.json", "ranks"]).unwrap();
        assert_eq!(settings.command, Command::Ranks);
        assert_eq!(settings.config(), Config::default());
        assert!(settings.output.is_none());
    }

    #[test]
    fn test_mileage_flags() {
        let settings = Settings::try_parse_from([
            "river-mileage",
            "--network",
            "net.json",
            "--tolerance",
            "0.5",
            "--outlet-search-distance",
            "20",
            "mileage",
            "--points",
            "points.json",
            "--best-effort",
        ])
        .unwrap();

        let config = settings.config();
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.outlet_search_distance, 20.0);
        assert_eq!(config.batch_mode, BatchMode::BestEffort);
        assert_eq!(config.range_policy, RangePolicy::Reject);
    }

    #[test]
    fn test_place_clamp() {
        let settings = Settings::try_parse_from([
            "river-mileage",
            "-n",
            "n.json",
            "place",
            "-r",
            "rows.json",
            "--clamp",
        ])
        .unwrap();
        assert_eq!(settings.config().range_policy, RangePolicy::Clamp);
    }

    #[test]
    fn test_network_is_required() {
        assert!(Settings::try_parse_from(["river-mileage", "info"]).is_err());
    }
}
