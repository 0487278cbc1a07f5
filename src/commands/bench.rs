//! Benchmark command: fit and evaluate allocation models on one dataset.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::calibrate;
use crate::cli::{BenchArgs, Cli};
use crate::dataset::{self, Dataset, Level};
use crate::eval;
use crate::model::Model;
use crate::report;
use crate::sample::{MassSelection, SampleMatrix};

/// Explicit benchmark configuration, assembled from CLI arguments.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub dataset: Dataset,
    pub level: Level,
    pub models: Vec<Model>,
    pub mass: MassSelection,
    pub modified_io: bool,
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

pub fn run(cli: &Cli, args: &BenchArgs) -> Result<()> {
    let config = BenchConfig {
        dataset: args.dataset.parse()?,
        level: args.level.parse()?,
        models: args.models.iter().map(|tag| tag.parse()).collect::<Result<_>>()?,
        mass: if args.residence_mass { MassSelection::Residence } else { MassSelection::Workplace },
        modified_io: args.modified_io,
        data_dir: args.data_dir.clone(),
        out_dir: args.out_dir.clone(),
    };
    run_bench(&config, cli.verbose)
}

/// Pipeline entry point: load the dataset once, then calibrate,
/// predict, evaluate and plot every model in order, and write the
/// combined prediction report.
pub fn run_bench(config: &BenchConfig, verbose: u8) -> Result<()> {
    let data = dataset::load(&config.data_dir, config.dataset, config.level, config.modified_io)?;
    let samples = SampleMatrix::build(&data, config.mass)?;
    println!("{} origins, {} samples", samples.num_origins(), samples.len());

    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("[bench] Failed to create {}", config.out_dir.display()))?;
    let stem = format!("bench_{}_{}", config.dataset, config.level);

    let mut predictions: Vec<(Model, Vec<f64>)> = Vec::with_capacity(config.models.len());
    for &model in &config.models {
        let log_every = if verbose > 1 { 10 } else { 0 };
        let fitted = calibrate::calibrate(model, &samples, log_every)?;
        if let Some(fit) = &fitted {
            if verbose > 0 {
                eprintln!(
                    "[bench] {model}: param {:.8} objective {:.6e} after {} iterations{}",
                    fit.param,
                    fit.objective,
                    fit.iterations,
                    if fit.converged { "" } else { " (not converged)" },
                );
            }
        }

        let predicted = samples.predict(model, fitted.map(|fit| fit.param))?;
        let stats = eval::evaluate(samples.observed(), &predicted)?;
        println!("{model}: {stats}");

        let plot_path = config.out_dir.join(format!("{stem}_{}.svg", model.tag()));
        report::scatter_loglog(&plot_path, samples.observed(), &predicted, "Truth", "Prediction")?;
        predictions.push((model, predicted));
    }

    let report_path = config.out_dir.join(format!("{stem}.csv"));
    report::write_bench_report(&report_path, &samples, &predictions)?;
    if verbose > 0 {
        eprintln!("[bench] wrote {}", report_path.display());
    }
    Ok(())
}
