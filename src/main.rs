use std::path::PathBuf;

use clap::Parser;
use log::trace;
use molvec::{config::Config, pipeline, Error};

#[derive(Parser)]
struct Cli {
    /// The TOML file describing the molecule sources, output paths, and
    /// training parameters.
    config: PathBuf,

    /// The number of threads to use. Overrides `threads` in the config file,
    /// where 0 means the number of logical CPUs as detected by rayon.
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let cli = Cli::parse();
    trace!("loading config from {}", cli.config.display());
    let config = Config::load(&cli.config)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.unwrap_or(config.threads))
        .build_global()?;

    let report = pipeline::run(&config)?;
    println!("{report}");

    Ok(())
}
