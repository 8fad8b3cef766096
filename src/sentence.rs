//! Molecules as sentences of Morgan environment identifiers.

use std::fmt::Display;

use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::chem::{morgan, ChemError, Mol};

/// One atom environment. The value is a fixed hash of the environment, so
/// the same molecule and radius give the same tokens in every run.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Token(pub u32);

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Sentence = Vec<Token>;

/// tokens for each atom in input order, from radius 0 up to `radius`
pub fn sentence(notation: &str, radius: u32) -> Result<Sentence, ChemError> {
    let mol = Mol::from_smiles(notation)?;
    Ok(morgan::environments(&mol, radius)
        .into_iter()
        .flatten()
        .flatten()
        .map(Token)
        .collect())
}

/// tokenize a whole corpus in parallel, keeping its order. molecules that fail
/// to parse get `None`
pub fn sentences(corpus: &[String], radius: u32) -> Vec<Option<Sentence>> {
    corpus
        .par_iter()
        .map(|smiles| match sentence(smiles, radius) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("failed to tokenize {smiles}: {e}");
                None
            }
        })
        .collect()
}
