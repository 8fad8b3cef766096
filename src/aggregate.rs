//! Molecule vectors from sentences and a trained [EmbeddingTable].

use std::path::Path;

use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    sentence::{Sentence, Token},
    train::EmbeddingTable,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

/// What to do with tokens that have no vector in the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OovPolicy {
    /// leave them out entirely
    #[default]
    Skip,

    /// use the vector of this token instead, mol2vec's `UNK` convention. when
    /// the substitute itself is missing from the table this acts like `Skip`
    Substitute(Token),
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub mode: Aggregation,
    pub oov: OovPolicy,
}

/// Combine the vectors of the tokens in `sentence`. The mean divides by the
/// number of tokens that contributed a vector. If none did, the result is the
/// zero vector.
pub fn aggregate(
    sentence: &[Token],
    table: &EmbeddingTable,
    cfg: &AggregateConfig,
) -> Vec<f32> {
    let substitute = match cfg.oov {
        OovPolicy::Skip => None,
        OovPolicy::Substitute(t) => table.get(t),
    };
    let mut ret = vec![0.0; table.dim()];
    let mut used = 0;
    for &t in sentence {
        let Some(v) = table.get(t).or(substitute) else {
            continue;
        };
        for (r, x) in ret.iter_mut().zip(v) {
            *r += x;
        }
        used += 1;
    }
    if cfg.mode == Aggregation::Mean && used > 0 {
        let n = used as f32;
        ret.iter_mut().for_each(|r| *r /= n);
    }
    ret
}

/// One row per sentence, in order. Missing sentences get a zero row so the
/// rows stay aligned with the corpus.
pub fn aggregate_all(
    sentences: &[Option<Sentence>],
    table: &EmbeddingTable,
    cfg: &AggregateConfig,
) -> Array2<f32> {
    let rows: Vec<Vec<f32>> = sentences
        .par_iter()
        .map(|s| match s {
            Some(s) => aggregate(s, table, cfg),
            None => vec![0.0; table.dim()],
        })
        .collect();
    let mut ret = Array2::zeros((rows.len(), table.dim()));
    for (mut dst, src) in ret.rows_mut().into_iter().zip(rows) {
        dst.iter_mut().zip(src).for_each(|(d, s)| *d = s);
    }
    ret
}

/// rows with no representation
pub fn count_empty(vectors: &Array2<f32>) -> usize {
    vectors
        .rows()
        .into_iter()
        .filter(|r| r.iter().all(|&x| x == 0.0))
        .count()
}

pub fn write_vectors(
    path: impl AsRef<Path>,
    vectors: &Array2<f32>,
) -> Result<(), Error> {
    Ok(write_npy(path, vectors)?)
}

pub fn read_vectors(path: impl AsRef<Path>) -> Result<Array2<f32>, Error> {
    Ok(read_npy(path)?)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn table() -> EmbeddingTable {
        EmbeddingTable::new(
            3,
            vec![Token(10), Token(20), Token(30)],
            vec![5, 3, 1],
            vec![
                1.0, 0.0, 2.0, //
                0.0, 1.0, -1.0, //
                4.0, 4.0, 4.0,
            ],
        )
    }

    const SUM: AggregateConfig = AggregateConfig {
        mode: Aggregation::Sum,
        oov: OovPolicy::Skip,
    };

    const MEAN: AggregateConfig = AggregateConfig {
        mode: Aggregation::Mean,
        oov: OovPolicy::Skip,
    };

    fn check(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert_abs_diff_eq!(g, w, epsilon = 1e-6);
        }
    }

    #[test]
    fn sum_and_mean() {
        let t = table();
        let s = [Token(10), Token(20), Token(20)];
        check(&aggregate(&s, &t, &SUM), &[1.0, 2.0, 0.0]);
        check(&aggregate(&s, &t, &MEAN), &[1.0 / 3.0, 2.0 / 3.0, 0.0]);
    }

    #[test]
    fn out_of_vocabulary_is_skipped() {
        let t = table();
        let with_oov = [Token(10), Token(99), Token(30)];
        let without = [Token(10), Token(30)];
        check(
            &aggregate(&with_oov, &t, &MEAN),
            &aggregate(&without, &t, &MEAN),
        );
        check(&aggregate(&with_oov, &t, &MEAN), &[2.5, 2.0, 3.0]);

        let all_oov = [Token(1), Token(2)];
        check(&aggregate(&all_oov, &t, &SUM), &[0.0; 3]);
        check(&aggregate(&all_oov, &t, &MEAN), &[0.0; 3]);
        check(&aggregate(&[], &t, &MEAN), &[0.0; 3]);
    }

    #[test]
    fn substitute() {
        let t = table();
        let cfg = AggregateConfig {
            mode: Aggregation::Sum,
            oov: OovPolicy::Substitute(Token(30)),
        };
        check(&aggregate(&[Token(10), Token(99)], &t, &cfg), &[5.0, 4.0, 6.0]);

        let missing = AggregateConfig {
            oov: OovPolicy::Substitute(Token(42)),
            ..cfg
        };
        check(
            &aggregate(&[Token(10), Token(99)], &t, &missing),
            &[1.0, 0.0, 2.0],
        );
    }

    #[test]
    fn order_invariant() {
        let t = table();
        let a = [Token(10), Token(20), Token(30), Token(10)];
        let b = [Token(30), Token(10), Token(10), Token(20)];
        for cfg in [SUM, MEAN] {
            check(&aggregate(&a, &t, &cfg), &aggregate(&b, &t, &cfg));
        }
    }

    #[test]
    fn batch() {
        let t = table();
        let sentences = vec![
            Some(vec![Token(10)]),
            None,
            Some(vec![Token(99)]),
            Some(vec![Token(20), Token(30)]),
        ];
        let got = aggregate_all(&sentences, &t, &SUM);
        assert_eq!(got.shape(), &[4, 3]);
        check(got.row(0).as_slice().unwrap(), &[1.0, 0.0, 2.0]);
        check(got.row(3).as_slice().unwrap(), &[4.0, 5.0, 3.0]);
        assert_eq!(count_empty(&got), 2);
    }

    #[test]
    fn npy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.npy");
        let t = table();
        let vectors =
            aggregate_all(&[Some(vec![Token(10), Token(30)]), None], &t, &SUM);
        write_vectors(&path, &vectors).unwrap();
        assert_eq!(read_vectors(&path).unwrap(), vectors);
    }

    #[test]
    fn config_format() {
        let cfg: AggregateConfig =
            toml::from_str("mode = \"mean\"\noov = { substitute = 7 }")
                .unwrap();
        assert_eq!(cfg.mode, Aggregation::Mean);
        assert_eq!(cfg.oov, OovPolicy::Substitute(Token(7)));
    }
}
