use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::{DelayRange, PipelineConfig};

use super::errors::CommandError;

#[derive(Parser, Debug)]
#[command(name = "rowscout", version, about = "Enrich spreadsheet rows with facts found by web search")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show record count, column count and column names of a dataset
    Inspect(InspectArgs),
    /// Generate queries, search and extract one fact per distinct row
    Run(RunArgs),
    /// Print rows of an exported CSV
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// CSV dataset (UTF-8 or Latin-1)
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// CSV dataset (UTF-8 or Latin-1)
    pub file: PathBuf,

    /// Column to include in each row; repeat for several
    #[arg(short, long = "column", required = true)]
    pub columns: Vec<String>,

    /// What to look up for every row, e.g. "population"
    #[arg(short, long)]
    pub query: String,

    #[command(flatten)]
    pub timing: TimingArgs,

    /// CSV output path
    #[arg(short, long, default_value = "output.csv")]
    pub output: PathBuf,

    /// JSON dump of every row including working fields
    #[arg(long, default_value = "selected_columns_data.json")]
    pub dump: PathBuf,

    /// Also write the CSV when the run stops early
    #[arg(long)]
    pub export_partial: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TimingArgs {
    /// Search queries consumed per row
    #[arg(long, default_value_t = 3)]
    pub max_queries: usize,

    /// Minimum pause between searches, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub min_delay: f64,

    /// Maximum pause between searches, in seconds
    #[arg(long, default_value_t = 3.0)]
    pub max_delay: f64,

    /// Pause between fact extraction calls, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub extract_delay: f64,

    /// Wait after a rate-limited fact extraction call, in seconds
    #[arg(long, default_value_t = 39.0)]
    pub rate_limit_wait: f64,

    /// Give up on a row after this much rate-limit waiting, in seconds
    #[arg(long, default_value_t = 600.0)]
    pub max_rate_limit_wait: f64,
}

impl TimingArgs {
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, CommandError> {
        let min = seconds("--min-delay", self.min_delay)?;
        let max = seconds("--max-delay", self.max_delay)?;
        if min > max {
            return Err(CommandError::InvalidArgs(format!(
                "--min-delay ({}) must not exceed --max-delay ({})",
                self.min_delay, self.max_delay
            )));
        }
        if self.max_queries == 0 {
            return Err(CommandError::InvalidArgs(
                "--max-queries must be at least 1".into(),
            ));
        }
        Ok(PipelineConfig {
            max_queries: self.max_queries,
            search_delay: DelayRange { min, max },
            extract_delay: seconds("--extract-delay", self.extract_delay)?,
            extract_rate_limit_wait: seconds("--rate-limit-wait", self.rate_limit_wait)?,
            max_rate_limit_wait: seconds("--max-rate-limit-wait", self.max_rate_limit_wait)?,
            ..PipelineConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Exported CSV file
    #[arg(default_value = "output.csv")]
    pub file: PathBuf,

    /// Number of rows to print
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}

fn seconds(flag: &str, value: f64) -> Result<Duration, CommandError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CommandError::InvalidArgs(format!("{flag} must be a non-negative number of seconds, got {value}")))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_pipeline_defaults() {
        let cli = Cli::try_parse_from([
            "rowscout", "run", "counties.csv", "-c", "County", "-q", "population",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.columns, ["County"]);
        assert_eq!(args.output, PathBuf::from("output.csv"));
        assert_eq!(args.dump, PathBuf::from("selected_columns_data.json"));
        assert!(!args.export_partial);

        let config = args.timing.to_pipeline_config().unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.max_queries, defaults.max_queries);
        assert_eq!(config.search_delay, defaults.search_delay);
        assert_eq!(config.extract_delay, defaults.extract_delay);
        assert_eq!(config.extract_rate_limit_wait, defaults.extract_rate_limit_wait);
        assert_eq!(config.max_rate_limit_wait, defaults.max_rate_limit_wait);
    }

    #[test]
    fn run_requires_a_column() {
        assert!(Cli::try_parse_from(["rowscout", "run", "a.csv", "-q", "population"]).is_err());
    }

    #[test]
    fn repeated_columns_keep_order() {
        let cli = Cli::try_parse_from([
            "rowscout", "run", "a.csv", "--column", "Region", "--column", "County", "-q", "x",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.columns, ["Region", "County"]);
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let cli = Cli::try_parse_from([
            "rowscout", "run", "a.csv", "-c", "County", "-q", "x", "--min-delay", "5", "--max-delay", "1",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(matches!(
            args.timing.to_pipeline_config(),
            Err(CommandError::InvalidArgs(_))
        ));
    }

    #[test]
    fn negative_seconds_are_rejected() {
        assert!(seconds("--extract-delay", -1.0).is_err());
        assert_eq!(seconds("--extract-delay", 0.5).unwrap(), Duration::from_millis(500));
    }
}
