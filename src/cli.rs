use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use packwise::TripId;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "packwise")]
#[command(about = "Weather-aware packing lists for your trips", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./packwise.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan a trip and wait for its packing list
    Plan(PlanArgs),
    /// Show a trip's status, forecasts and recommendations
    Show(TripArgs),
    /// Re-run a trip that was interrupted before it finished
    Resume(TripArgs),
    /// List all trips, oldest first
    List,
    /// Delete a trip with its links and recommendations
    Delete(TripArgs),
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// Destination city
    #[arg(long)]
    pub city: String,

    /// First day of the trip (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the trip (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,
}

#[derive(clap::Args, Debug)]
pub struct TripArgs {
    /// Trip identifier printed by `plan`
    #[arg(long)]
    pub trip: TripId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan() {
        let cli = Cli::parse_from([
            "packwise", "plan", "--city", "Boston", "--start", "2025-06-01", "--end", "2025-06-03",
        ]);
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.city, "Boston");
                assert_eq!(args.end, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_resume_and_list() {
        let id = TripId::new();
        let cli = Cli::parse_from(["packwise", "resume", "--trip", &id.to_string()]);
        assert!(matches!(cli.command, Commands::Resume(args) if args.trip == id));

        let cli = Cli::parse_from(["packwise", "list"]);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_rejects_bad_trip_id() {
        let result = Cli::try_parse_from(["packwise", "show", "--trip", "not-a-uuid"]);
        assert!(result.is_err());
    }
}
