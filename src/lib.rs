//! Build a deduplicated corpus of canonical SMILES from several molecule
//! sources, turn each molecule into a sentence of Morgan environment tokens,
//! train word2vec embeddings over those sentences, and compare molecules by
//! the cosine similarity of their aggregated vectors.

pub mod aggregate;
pub mod chem;
pub mod config;
pub mod corpus;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod report;
pub mod sentence;
pub mod similarity;
pub mod sources;
pub mod train;

pub use error::Error;
