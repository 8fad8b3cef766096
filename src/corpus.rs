//! Canonicalization, deduplication, and annotation of raw molecules, and the
//! corpus and properties files written from them.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    chem::{ChemError, Mol},
    error::Error,
    sources::{RawMolecule, SourceKind},
};

#[derive(Clone, Debug, PartialEq)]
pub struct MoleculeRecord {
    pub raw: String,
    pub canonical: String,
    /// average molecular weight, NaN when it could not be computed
    pub weight: f64,
    pub source: SourceKind,
}

/// canonical SMILES for `notation`, parsed without sanitization. applying this
/// to its own output returns the output unchanged
pub fn canonical_smiles(notation: &str) -> Result<String, ChemError> {
    Ok(Mol::from_smiles(notation)?.to_smiles())
}

/// canonicalize every raw molecule in parallel. the results line up with
/// `raw`
pub fn canonicalize(
    raw: &[RawMolecule],
) -> Vec<Result<MoleculeRecord, ChemError>> {
    raw.par_iter()
        .map(|m| {
            Ok(MoleculeRecord {
                canonical: canonical_smiles(&m.notation)?,
                raw: m.notation.clone(),
                weight: f64::NAN,
                source: m.source,
            })
        })
        .collect()
}

/// keep the successfully canonicalized records, returning them with the
/// number dropped
pub fn valid(
    results: Vec<Result<MoleculeRecord, ChemError>>,
) -> (Vec<MoleculeRecord>, usize) {
    let mut dropped = 0;
    let mut ret = Vec::with_capacity(results.len());
    for res in results {
        match res {
            Ok(r) => ret.push(r),
            Err(e) => {
                debug!("dropping unparsable molecule: {e}");
                dropped += 1;
            }
        }
    }
    (ret, dropped)
}

/// remove records whose canonical SMILES was already seen, keeping the first
/// occurrence of each and the original order. returns the number removed
pub fn dedup(records: Vec<MoleculeRecord>) -> (Vec<MoleculeRecord>, usize) {
    let before = records.len();
    let mut seen: IndexMap<String, MoleculeRecord> =
        IndexMap::with_capacity(before);
    for r in records {
        seen.entry(r.canonical.clone()).or_insert(r);
    }
    let ret: Vec<_> = seen.into_values().collect();
    let removed = before - ret.len();
    (ret, removed)
}

/// fill in the molecular weight of each record, returning the number of
/// failures. failed records keep a NaN weight
pub fn annotate(records: &mut [MoleculeRecord]) -> usize {
    let failures = AtomicUsize::new(0);
    records.par_iter_mut().for_each(|r| {
        match Mol::from_smiles(&r.canonical).and_then(|m| m.mol_wt()) {
            Ok(w) => r.weight = w,
            Err(e) => {
                debug!("no weight for {}: {e}", r.canonical);
                r.weight = f64::NAN;
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
    failures.into_inner()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// statistics over the finite weights, if there are any
pub fn weight_summary(records: &[MoleculeRecord]) -> Option<WeightSummary> {
    let weights: Vec<f64> = records
        .iter()
        .map(|r| r.weight)
        .filter(|w| w.is_finite())
        .collect();
    if weights.is_empty() {
        return None;
    }
    let count = weights.len();
    Some(WeightSummary {
        count,
        min: weights.iter().copied().fold(f64::INFINITY, f64::min),
        max: weights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: weights.iter().sum::<f64>() / count as f64,
    })
}

#[derive(Serialize)]
struct PropertyRow<'a> {
    canonical: &'a str,
    weight: f64,
    source: SourceKind,
}

/// write `canonical,weight,source` rows
pub fn write_properties(
    path: impl AsRef<Path>,
    records: &[MoleculeRecord],
) -> Result<(), Error> {
    let path = path.as_ref();
    let csv_err = |cause| Error::Csv {
        path: path.to_owned(),
        cause,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    for r in records {
        wtr.serialize(PropertyRow {
            canonical: &r.canonical,
            weight: r.weight,
            source: r.source,
        })
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(Error::io(path))?;
    info!(
        "wrote properties for {} molecules to {}",
        records.len(),
        path.display()
    );
    Ok(())
}

/// one notation per line, no header
pub fn write_corpus(
    path: impl AsRef<Path>,
    corpus: &[String],
) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for smiles in corpus {
        writeln!(w, "{smiles}")?;
    }
    w.flush()
}

pub fn read_corpus(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut ret = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            ret.push(line.to_owned());
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn raw(notations: &[&str]) -> Vec<RawMolecule> {
        notations
            .iter()
            .map(|n| RawMolecule {
                notation: n.to_string(),
                source: SourceKind::Tabular,
            })
            .collect()
    }

    fn clean(notations: &[&str]) -> (Vec<String>, usize, usize) {
        let (records, unparsable) = valid(canonicalize(&raw(notations)));
        let (records, duplicates) = dedup(records);
        let corpus = records.into_iter().map(|r| r.canonical).collect();
        (corpus, unparsable, duplicates)
    }

    #[test]
    fn end_to_end_example() {
        let input = ["c1ccccc1", "c1ccccc1", "CC=O"];
        let (corpus, unparsable, duplicates) = clean(&input);
        assert_eq!(corpus, vec!["c1ccccc1", "CC=O"]);
        assert_eq!(unparsable, 0);
        assert_eq!(duplicates, 1);
        assert_eq!(input.len() - duplicates, corpus.len());
    }

    #[test]
    fn dedup_by_canonical_form() {
        let input =
            ["OCC", "C1=CC=CC=C1", "xyz", "CCO", "c1ccccc1", "C(O)C"];
        let (corpus, unparsable, duplicates) = clean(&input);
        assert_eq!(corpus, vec!["CCO", "c1ccccc1"]);
        assert_eq!(unparsable, 1);
        assert_eq!(duplicates, 3);
    }

    #[test]
    fn dedup_keeps_first_record() {
        let records = vec![
            MoleculeRecord {
                raw: "OCC".to_owned(),
                canonical: "CCO".to_owned(),
                weight: f64::NAN,
                source: SourceKind::Scraped,
            },
            MoleculeRecord {
                raw: "C".to_owned(),
                canonical: "C".to_owned(),
                weight: f64::NAN,
                source: SourceKind::Tabular,
            },
            MoleculeRecord {
                raw: "CCO".to_owned(),
                canonical: "CCO".to_owned(),
                weight: f64::NAN,
                source: SourceKind::Tabular,
            },
        ];
        let (got, removed) = dedup(records);
        assert_eq!(removed, 1);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].raw, "OCC");
        assert_eq!(got[0].source, SourceKind::Scraped);
        assert_eq!(got[1].canonical, "C");
    }

    #[test]
    fn idempotent() {
        for smiles in ["OC(=O)c1ccccc1", "C1CC1N", "[NH4+].[Cl-]", "CC#N"] {
            let once = canonical_smiles(smiles).unwrap();
            assert_eq!(canonical_smiles(&once).unwrap(), once);
        }
    }

    #[test]
    fn weights() {
        let input = raw(&["CCO", "*C", "[CH]"]);
        let (mut records, _) = valid(canonicalize(&input));
        let failures = annotate(&mut records);
        assert_eq!(failures, 1);
        assert_eq!(records.len(), 3);
        assert_abs_diff_eq!(records[0].weight, 46.069, epsilon = 1e-3);
        assert!(records[1].weight.is_nan());
        // radicals are weighed with the hydrogens they were written with
        assert_abs_diff_eq!(records[2].weight, 13.019, epsilon = 1e-3);

        let summary = weight_summary(&records).unwrap();
        assert_eq!(summary.count, 2);
        assert_abs_diff_eq!(summary.min, 13.019, epsilon = 1e-3);
        assert_abs_diff_eq!(summary.max, 46.069, epsilon = 1e-3);
    }

    #[test]
    fn corpus_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.smi");
        let corpus = vec!["c1ccccc1".to_owned(), "CC=O".to_owned()];
        write_corpus(&path, &corpus).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "c1ccccc1\nCC=O\n"
        );
        assert_eq!(read_corpus(&path).unwrap(), corpus);
    }

    #[test]
    fn properties_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("props.csv");
        let (mut records, _) = valid(canonicalize(&raw(&["O", "*"])));
        annotate(&mut records);
        write_properties(&path, &records).unwrap();
        let got = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = got.lines().collect();
        assert_eq!(lines[0], "canonical,weight,source");
        assert!(lines[1].starts_with("O,18.01"));
        assert!(lines[1].ends_with(",tabular"));
        assert_eq!(lines[2], "*,NaN,tabular");
    }
}
