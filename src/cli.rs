//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::ingest::UploadConfig;
use crate::pipeline::AnalysisConfig;

/// Passenger survey segmentation using K-Means clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file, or "-" to read it from stdin
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Directory for the generated charts
    #[arg(short, long, default_value = "charts")]
    pub output_dir: PathBuf,

    /// Write the full analysis report as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Seed for every K-Means fit
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Number of k-means++ restarts per fit
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Run all fits on the current thread
    #[arg(long)]
    pub sequential: bool,

    /// Directory where stdin uploads are staged
    #[arg(long, default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn reads_stdin(&self) -> bool {
        self.input == "-"
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            seed: self.seed,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_init: self.n_init,
            parallel: !self.sequential,
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            upload_dir: self.upload_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_analysis_config() {
        let args = Args::parse_from(["paxseg"]);
        assert_eq!(args.analysis_config(), AnalysisConfig::default());
        assert_eq!(args.upload_config(), UploadConfig::default());
        assert!(!args.reads_stdin());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "paxseg",
            "--input",
            "-",
            "--seed",
            "7",
            "--n-init",
            "3",
            "--sequential",
            "--json",
            "report.json",
        ]);
        assert!(args.reads_stdin());
        assert_eq!(args.json, Some(PathBuf::from("report.json")));

        let config = args.analysis_config();
        assert_eq!(config.seed, 7);
        assert_eq!(config.n_init, 3);
        assert!(!config.parallel);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        assert!(Args::try_parse_from(["paxseg", "--seed", "abc"]).is_err());
    }
}
