use rayon::prelude::*;

use crate::matrix::Matrix;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SimilarityError {
    #[error("cosine similarity is undefined for a zero vector")]
    ZeroVector,

    #[error("vectors have different lengths ({0} and {1})")]
    LengthMismatch(usize, usize),
}

/// dot(a, b) / (|a| |b|), accumulated in f64
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::LengthMismatch(a.len(), b.len()));
    }
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Err(SimilarityError::ZeroVector);
    }
    Ok((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// the symmetric N×N matrix of cosine similarities between `rows`. the
/// diagonal is exactly 1.0, and every entry involving a zero vector is NaN
pub fn pairwise_similarity<V>(rows: &[V]) -> Matrix<f64>
where
    V: AsRef<[f32]> + Sync,
{
    let n = rows.len();
    // upper triangle in parallel, one row of it per task
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = rows[i].as_ref();
            (i + 1..n)
                .map(|j| {
                    cosine_similarity(a, rows[j].as_ref()).unwrap_or(f64::NAN)
                })
                .collect()
        })
        .collect();

    let mut ret = Matrix::zeros(n, n);
    for (i, row) in upper.into_iter().enumerate() {
        ret[(i, i)] = if is_zero(rows[i].as_ref()) { f64::NAN } else { 1.0 };
        for (k, s) in row.into_iter().enumerate() {
            let j = i + 1 + k;
            ret[(i, j)] = s;
            ret[(j, i)] = s;
        }
    }
    ret
}

/// indices and similarities of the `k` rows most similar to `query`, best
/// first. rows where the similarity is undefined are left out
pub fn nearest<V: AsRef<[f32]>>(
    query: &[f32],
    rows: &[V],
    k: usize,
) -> Vec<(usize, f64)> {
    let mut ret: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            cosine_similarity(query, r.as_ref()).ok().map(|s| (i, s))
        })
        .collect();
    ret.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ret.truncate(k);
    ret
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn cosine() {
        let tests = [
            (vec![1.0, 0.0], vec![0.0, 1.0], 0.0),
            (vec![1.0, 2.0], vec![2.0, 4.0], 1.0),
            (vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0], -1.0),
            (vec![1.0, 1.0], vec![1.0, 0.0], std::f64::consts::FRAC_1_SQRT_2),
        ];
        for (a, b, want) in tests {
            let got = cosine_similarity(&a, &b).unwrap();
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn self_similarity() {
        for v in [vec![0.3, -1.2, 7.5], vec![1e-3; 300], vec![-4.0]] {
            let got = cosine_similarity(&v, &v).unwrap();
            assert_abs_diff_eq!(got, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn degenerate() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]),
            Err(SimilarityError::ZeroVector)
        );
        assert_eq!(
            cosine_similarity(&[1.0], &[1.0, 2.0]),
            Err(SimilarityError::LengthMismatch(1, 2))
        );
    }

    #[test]
    fn pairwise() {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.5, 0.5, 0.0],
            vec![0.0, 0.0, 0.0],
            vec![-2.0, 1.0, 3.0],
        ];
        let got = pairwise_similarity(&rows);
        assert_eq!(got.shape(), (4, 4));
        for i in 0..4 {
            for j in 0..4 {
                let (a, b) = (got[(i, j)], got[(j, i)]);
                assert!(a == b || (a.is_nan() && b.is_nan()), "{i} {j}");
                if i == 2 || j == 2 {
                    assert!(a.is_nan(), "{i} {j}");
                }
            }
        }
        for i in [0, 1, 3] {
            assert_eq!(got[(i, i)], 1.0);
        }
        assert_abs_diff_eq!(
            got[(0, 1)],
            std::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-12
        );
        assert!(pairwise_similarity::<Vec<f32>>(&[]).data().is_empty());
    }

    #[test]
    fn top_k() {
        let rows = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.1],
            vec![0.0, 0.0],
            vec![1.0, 0.0],
        ];
        let got = nearest(&[1.0, 0.0], &rows, 2);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, 3);
        assert_eq!(got[1].0, 1);
        assert_eq!(nearest(&[1.0, 0.0], &rows, 10).len(), 3);
    }
}
