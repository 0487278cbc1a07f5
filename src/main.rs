use anyhow::Result;
use clap::Parser;

use flowbench::cli::{Cli, Commands};
use flowbench::commands::{bench, synth};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Bench(args) => bench::run(&cli, args),
        Commands::Synth(args) => synth::run(&cli, args),
    }
}
