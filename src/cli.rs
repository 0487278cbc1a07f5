use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Spatial interaction model benchmarking CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "flowbench", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit and evaluate allocation models against observed flows
    Bench(BenchArgs),

    /// Generate a synthetic flow table from one model plus noise
    Synth(SynthArgs),
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Dataset name: england | US | JJJ | gd_commute | gd_mobility
    pub dataset: String,

    /// Aggregation level: msoa | mlad | county | subdistrict
    #[arg(long, default_value = "county")]
    pub level: String,

    /// Comma-separated model tags to evaluate
    #[arg(long, value_delimiter = ',',
        default_value = "GM_Zipf,GM_Pow,GM_Exp,RM,ERM,IO,OPS")]
    pub models: Vec<String>,

    /// Use residence-side mass and opportunity instead of workplace
    #[arg(long)]
    pub residence_mass: bool,

    /// England only: use the modified intervening-opportunity tables
    #[arg(long)]
    pub modified_io: bool,

    /// Directory holding the dataset files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Output directory for the report and plots
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Model tag generating the synthetic flows
    pub model: String,

    /// Dataset name providing units, predictors and outflows
    #[arg(long, default_value = "england")]
    pub dataset: String,

    /// Aggregation level
    #[arg(long, default_value = "msoa")]
    pub level: String,

    /// Model parameter (required for parametric models)
    #[arg(long)]
    pub param: Option<f64>,

    /// Noise type: mul | logadd
    #[arg(long, default_value = "mul")]
    pub noise: String,

    /// Noise standard deviation
    #[arg(long, default_value_t = 0.0)]
    pub sigma: f64,

    /// RNG seed
    #[arg(long, default_value_t = 1231)]
    pub seed: u64,

    /// Minimum synthetic flow kept in the output table
    #[arg(long, default_value_t = 3)]
    pub threshold: i64,

    /// Use residence-side mass and opportunity instead of workplace
    #[arg(long)]
    pub residence_mass: bool,

    /// Directory holding the dataset files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Output directory for the flow table, metadata and plot
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,
}
