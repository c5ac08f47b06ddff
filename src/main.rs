//! paxseg: passenger survey segmentation CLI
//!
//! Loads a survey CSV, runs the clustering analysis, prints the cluster
//! summary and renders the diagnostic charts.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use paxseg::{analyze, load_and_process_data, viz, Args, StagedUpload};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // the staged copy of stdin lives until the end of main and is removed on
    // every return path
    let staged = if args.reads_stdin() {
        Some(StagedUpload::from_reader(io::stdin().lock(), &args.upload_config())?)
    } else {
        None
    };
    let input = match &staged {
        Some(upload) => upload.path(),
        None => Path::new(&args.input),
    };

    run_pipeline(&args, input)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

/// Run full clustering pipeline
fn run_pipeline(args: &Args, input: &Path) -> Result<()> {
    let start_time = Instant::now();

    let data = load_and_process_data(input)
        .with_context(|| format!("loading survey data from {}", input.display()))?;
    println!("✓ Data loaded: {} passengers", data.len());
    debug!("features shape: {:?}", data.features.shape());

    let config = args.analysis_config();
    let model_start = Instant::now();
    let report = analyze(&data, &config).context("clustering analysis failed")?;
    info!("analysis took {:.2}s", model_start.elapsed().as_secs_f64());

    viz::print_cluster_summary(&report);

    if !args.no_charts {
        let inputs = report.visualization_inputs(&data);
        let paths = viz::generate_visualization_report(&inputs, &args.output_dir)?;
        println!("\n✓ Charts written:");
        for path in paths {
            println!("  {}", path.display());
        }
    }

    if let Some(json_path) = &args.json {
        let file = File::create(json_path)
            .with_context(|| format!("creating {}", json_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        println!("✓ Report saved to: {}", json_path.display());
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
