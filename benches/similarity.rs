use molvec::{sentence::sentence, similarity::pairwise_similarity};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn main() {
    divan::main();
}

fn random_vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

#[divan::bench(args = [100, 500, 1000])]
fn pairwise(bencher: divan::Bencher, n: usize) {
    let vectors = random_vectors(n, 100);
    bencher.bench(|| pairwise_similarity(divan::black_box(&vectors)));
}

#[divan::bench(args = [
    "CCO",
    "c1ccccc1",
    "CC(=O)Oc1ccccc1C(=O)O",
    "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
])]
fn tokenize(smiles: &str) -> usize {
    sentence(smiles, 1).map_or(0, |s| s.len())
}
