//! CLI argument definitions using clap
//!
//! Commands:
//! - report-engine materialize --fixture <path> --report <id>
//! - report-engine query --fixture <path>      (ReportQuery JSON on stdin)
//! - report-engine count --fixture <path> --report <id> --owners g1,g2
//! - report-engine download --fixture <path>   (ReportQuery JSON on stdin)

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Report aggregation and materialization engine
#[derive(Parser, Debug)]
#[command(name = "report-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to engine configuration; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Tenant data the command runs against
#[derive(Args, Debug, Clone)]
pub struct FixtureArgs {
    /// JSON object mapping collection names to document arrays
    #[arg(long)]
    pub fixture: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Materialize a report and print its status
    Materialize {
        #[command(flatten)]
        fixture: FixtureArgs,

        #[arg(long)]
        report: String,
    },

    /// Materialize the requested report, then print one page
    Query {
        #[command(flatten)]
        fixture: FixtureArgs,
    },

    /// Materialize a report, then print its visible row count
    Count {
        #[command(flatten)]
        fixture: FixtureArgs,

        #[arg(long)]
        report: String,

        /// Comma-separated access groups
        #[arg(long, value_delimiter = ',')]
        owners: Vec<String>,
    },

    /// Materialize the requested report, then print every row, one per line
    Download {
        #[command(flatten)]
        fixture: FixtureArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        let cli = Cli::try_parse_from([
            "report-engine",
            "count",
            "--fixture",
            "tenant.json",
            "--report",
            "r1",
            "--owners",
            "g1,g2",
        ])
        .unwrap();
        assert!(cli.config.is_none());
        match cli.command {
            Command::Count { report, owners, .. } => {
                assert_eq!(report, "r1");
                assert_eq!(owners, vec!["g1", "g2"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "report-engine",
            "query",
            "--fixture",
            "tenant.json",
            "--config",
            "engine.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("engine.json")));
    }
}
