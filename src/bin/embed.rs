//! Embed new molecules with a trained model and print their pairwise cosine
//! similarities.

use std::path::PathBuf;

use clap::Parser;
use log::warn;
use molvec::{
    aggregate::{aggregate, AggregateConfig, Aggregation, OovPolicy},
    sentence::sentence,
    similarity::pairwise_similarity,
    train::EmbeddingTable,
    Error,
};

#[derive(Parser)]
struct Cli {
    /// The embedding table written by `molvec`.
    #[arg(short, long)]
    model: PathBuf,

    /// The Morgan radius. This should match the radius used for training.
    #[arg(short, long, default_value_t = 1)]
    radius: u32,

    /// Average the token vectors instead of summing them.
    #[arg(long)]
    mean: bool,

    /// The SMILES to embed.
    #[arg(required = true)]
    smiles: Vec<String>,
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let cli = Cli::parse();
    let table = EmbeddingTable::load(&cli.model)?;
    let cfg = AggregateConfig {
        mode: if cli.mean {
            Aggregation::Mean
        } else {
            Aggregation::Sum
        },
        oov: OovPolicy::Skip,
    };

    let vectors: Vec<Vec<f32>> = cli
        .smiles
        .iter()
        .map(|smiles| match sentence(smiles, cli.radius) {
            Ok(s) => {
                let oov = s.iter().filter(|&&t| !table.contains(t)).count();
                if oov == s.len() {
                    warn!("no token of {smiles} is in the vocabulary");
                }
                aggregate(&s, &table, &cfg)
            }
            Err(e) => {
                warn!("{e}");
                vec![0.0; table.dim()]
            }
        })
        .collect();

    for (i, smiles) in cli.smiles.iter().enumerate() {
        println!("{i:>4} {smiles}");
    }
    print!("{}", pairwise_similarity(&vectors));

    Ok(())
}
