//! word2vec with negative sampling over molecule sentences, and the embedding
//! table it produces.
//!
//! Each epoch shuffles the sentences, splits them into one shard per worker,
//! trains every shard on a private copy of the weights, and adds each copy's
//! change back onto the shared weights in shard order. Nothing depends on
//! thread scheduling, so a fixed seed and worker count reproduce the same
//! table exactly.

use std::{
    cmp::Reverse,
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    sentence::{Sentence, Token},
    similarity::cosine_similarity,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// predict the context from each token
    SkipGram,
    /// predict each token from the mean of its context
    Cbow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// vector dimensionality
    pub dim: usize,

    /// maximum distance between a token and its context
    pub window: usize,

    /// tokens seen fewer times than this are dropped from the vocabulary
    pub min_count: u64,

    /// worker threads and shards per epoch. 0 uses rayon's default, which
    /// depends on the machine
    pub workers: usize,

    pub epochs: usize,

    pub seed: u64,

    /// noise tokens drawn per positive example
    pub negative: usize,

    /// initial and final learning rates
    pub alpha: f32,
    pub min_alpha: f32,

    /// threshold for downsampling frequent tokens, 0 to disable
    pub sample: f64,

    pub objective: Objective,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dim: 300,
            window: 10,
            min_count: 1,
            workers: 0,
            epochs: 5,
            seed: 0,
            negative: 5,
            alpha: 0.025,
            min_alpha: 0.0001,
            sample: 0.0,
            objective: Objective::SkipGram,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("no token occurs at least {0} times")]
    EmptyVocab(u64),

    #[error("embedding dimension must be positive")]
    ZeroDim,

    #[error("number of epochs must be positive")]
    ZeroEpochs,

    #[error("context window must be positive")]
    ZeroWindow,

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Deserialize)]
struct TableData {
    dim: usize,
    vocab: Vec<Token>,
    counts: Vec<u64>,
    vectors: Vec<f32>,
}

/// Trained vectors for every token in the vocabulary. Tokens outside the
/// vocabulary have no vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TableData")]
pub struct EmbeddingTable {
    dim: usize,
    vocab: Vec<Token>,
    counts: Vec<u64>,
    vectors: Vec<f32>,
    #[serde(skip)]
    index: HashMap<Token, usize>,
}

impl TryFrom<TableData> for EmbeddingTable {
    type Error = String;

    fn try_from(data: TableData) -> Result<Self, Self::Error> {
        let TableData {
            dim,
            vocab,
            counts,
            vectors,
        } = data;
        if counts.len() != vocab.len() || vectors.len() != dim * vocab.len() {
            return Err(format!(
                "inconsistent table: {} tokens, {} counts, {} values for \
                 dimension {dim}",
                vocab.len(),
                counts.len(),
                vectors.len()
            ));
        }
        Ok(Self::new(dim, vocab, counts, vectors))
    }
}

impl EmbeddingTable {
    pub(crate) fn new(
        dim: usize,
        vocab: Vec<Token>,
        counts: Vec<u64>,
        vectors: Vec<f32>,
    ) -> Self {
        let index = vocab.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        Self {
            dim,
            vocab,
            counts,
            vectors,
            index,
        }
    }

    pub fn get(&self, token: Token) -> Option<&[f32]> {
        let &i = self.index.get(&token)?;
        Some(&self.vectors[i * self.dim..(i + 1) * self.dim])
    }

    pub fn contains(&self, token: Token) -> bool {
        self.index.contains_key(&token)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    /// tokens by descending training count
    pub fn vocab(&self) -> &[Token] {
        &self.vocab
    }

    /// how often `token` occurred in the training sentences
    pub fn count(&self, token: Token) -> Option<u64> {
        self.index.get(&token).map(|&i| self.counts[i])
    }

    /// the `k` tokens closest to `token` by cosine similarity, best first
    pub fn most_similar(&self, token: Token, k: usize) -> Vec<(Token, f64)> {
        let Some(query) = self.get(token) else {
            return Vec::new();
        };
        let mut ret: Vec<(Token, f64)> = self
            .vocab
            .iter()
            .filter(|&&t| t != token)
            .filter_map(|&t| {
                let v = self.get(t)?;
                cosine_similarity(query, v).ok().map(|s| (t, s))
            })
            .collect();
        ret.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ret.truncate(k);
        ret
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let f = File::create(path).map_err(Error::io(path))?;
        serde_json::to_writer(BufWriter::new(f), self).map_err(|cause| {
            Error::Model {
                path: path.to_owned(),
                cause,
            }
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let f = File::open(path).map_err(Error::io(path))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|cause| {
            Error::Model {
                path: path.to_owned(),
                cause,
            }
        })
    }
}

struct Vocab {
    tokens: Vec<Token>,
    counts: Vec<u64>,
    index: HashMap<Token, usize>,
}

impl Vocab {
    fn build(sentences: &[Sentence], min_count: u64) -> Self {
        let mut counts: HashMap<Token, u64> = HashMap::new();
        for s in sentences {
            for &t in s {
                *counts.entry(t).or_default() += 1;
            }
        }
        let mut kept: Vec<(Token, u64)> = counts
            .into_iter()
            .filter(|&(_, c)| c >= min_count)
            .collect();
        kept.sort_by_key(|&(t, c)| (Reverse(c), t));
        let (tokens, counts): (Vec<Token>, Vec<u64>) = kept.into_iter().unzip();
        let index = tokens.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        Self {
            tokens,
            counts,
            index,
        }
    }

    /// sentences as vocabulary indices, without out-of-vocabulary tokens
    fn encode(&self, sentences: &[Sentence]) -> Vec<Vec<usize>> {
        sentences
            .iter()
            .map(|s| {
                s.iter()
                    .filter_map(|t| self.index.get(t).copied())
                    .collect()
            })
            .filter(|s: &Vec<usize>| !s.is_empty())
            .collect()
    }
}

/// cumulative unigram^0.75 weights for drawing noise tokens
struct NoiseTable(Vec<f64>);

impl NoiseTable {
    fn new(counts: &[u64]) -> Self {
        let mut total = 0.0;
        let cumulative = counts
            .iter()
            .map(|&c| {
                total += (c as f64).powf(0.75);
                total
            })
            .collect();
        Self(cumulative)
    }

    fn sample(&self, rng: &mut impl Rng) -> usize {
        let total = self.0.last().copied().unwrap_or(0.0);
        let r = rng.gen::<f64>() * total;
        self.0.partition_point(|&c| c <= r).min(self.0.len() - 1)
    }
}

#[derive(Clone)]
struct Weights {
    dim: usize,
    /// input vectors, the embeddings
    syn0: Vec<f32>,
    /// output vectors for negative sampling
    syn1neg: Vec<f32>,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-6.0, 6.0)).exp())
}

struct Shard<'a> {
    weights: Weights,
    cfg: &'a TrainConfig,
    noise: &'a NoiseTable,
    keep: &'a [f64],
    rng: StdRng,
    neu1: Vec<f32>,
    neu1e: Vec<f32>,
    loss: f64,
    examples: usize,
}

impl Shard<'_> {
    /// one positive and `negative` noise updates for the hidden vector `h`,
    /// accumulating its gradient in `neu1e`
    fn negative_sampling(&mut self, h: &[f32], target: usize, alpha: f32) {
        let d = self.weights.dim;
        for k in 0..=self.cfg.negative {
            let (t, label) = if k == 0 {
                (target, 1.0)
            } else {
                let t = self.noise.sample(&mut self.rng);
                if t == target {
                    continue;
                }
                (t, 0.0)
            };
            let out = &mut self.weights.syn1neg[t * d..(t + 1) * d];
            let f: f32 = h.iter().zip(out.iter()).map(|(a, b)| a * b).sum();
            let p = sigmoid(f);
            let likelihood = if label > 0.0 { p } else { 1.0 - p };
            self.loss -= (likelihood.max(1e-7) as f64).ln();
            let g = (label - p) * alpha;
            for ((e, o), x) in self.neu1e.iter_mut().zip(out).zip(h) {
                *e += g * *o;
                *o += g * x;
            }
        }
        self.examples += 1;
    }

    fn skip_gram(
        &mut self,
        sentence: &[usize],
        pos: usize,
        span: usize,
        alpha: f32,
    ) {
        let d = self.weights.dim;
        let lo = pos.saturating_sub(span);
        let hi = (pos + span + 1).min(sentence.len());
        for c in lo..hi {
            if c == pos {
                continue;
            }
            let input = sentence[c];
            let h = self.weights.syn0[input * d..(input + 1) * d].to_vec();
            self.neu1e.iter_mut().for_each(|e| *e = 0.0);
            self.negative_sampling(&h, sentence[pos], alpha);
            let v = &mut self.weights.syn0[input * d..(input + 1) * d];
            for (x, e) in v.iter_mut().zip(&self.neu1e) {
                *x += e;
            }
        }
    }

    fn cbow(
        &mut self,
        sentence: &[usize],
        pos: usize,
        span: usize,
        alpha: f32,
    ) {
        let d = self.weights.dim;
        let lo = pos.saturating_sub(span);
        let hi = (pos + span + 1).min(sentence.len());
        let context: Vec<usize> =
            (lo..hi).filter(|&c| c != pos).map(|c| sentence[c]).collect();
        if context.is_empty() {
            return;
        }
        self.neu1.iter_mut().for_each(|x| *x = 0.0);
        for &c in &context {
            let v = &self.weights.syn0[c * d..(c + 1) * d];
            for (h, x) in self.neu1.iter_mut().zip(v) {
                *h += x;
            }
        }
        let n = context.len() as f32;
        self.neu1.iter_mut().for_each(|h| *h /= n);
        self.neu1e.iter_mut().for_each(|e| *e = 0.0);
        let h = std::mem::take(&mut self.neu1);
        self.negative_sampling(&h, sentence[pos], alpha);
        self.neu1 = h;
        for &c in &context {
            let v = &mut self.weights.syn0[c * d..(c + 1) * d];
            for (x, e) in v.iter_mut().zip(&self.neu1e) {
                *x += e;
            }
        }
    }

    /// train on `sentences`, decaying the learning rate across `progress`,
    /// the fraction of training done before and after this shard
    fn run(&mut self, sentences: &[&Vec<usize>], progress: (f32, f32)) {
        let total: usize = sentences.iter().map(|s| s.len()).sum();
        let cfg = self.cfg;
        let mut done = 0;
        let mut kept = Vec::new();
        for sentence in sentences {
            kept.clear();
            for &w in sentence.iter() {
                let p = self.keep[w];
                if p >= 1.0 || self.rng.gen::<f64>() < p {
                    kept.push(w);
                }
            }
            for pos in 0..kept.len() {
                let frac = done as f32 / total.max(1) as f32;
                let at = progress.0 + (progress.1 - progress.0) * frac;
                let alpha = (cfg.alpha - (cfg.alpha - cfg.min_alpha) * at)
                    .max(cfg.min_alpha);
                // word2vec's reduced window
                let span = cfg.window - self.rng.gen_range(0..cfg.window);
                match cfg.objective {
                    Objective::SkipGram => {
                        self.skip_gram(&kept, pos, span, alpha)
                    }
                    Objective::Cbow => self.cbow(&kept, pos, span, alpha),
                }
                done += 1;
            }
            done += sentence.len() - kept.len();
        }
    }
}

/// word2vec keep probabilities for downsampling frequent tokens
fn keep_probabilities(counts: &[u64], sample: f64) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    if sample <= 0.0 || total == 0 {
        return vec![1.0; counts.len()];
    }
    let threshold = sample * total as f64;
    counts
        .iter()
        .map(|&c| {
            let c = c as f64;
            ((c / threshold).sqrt() + 1.0) * threshold / c
        })
        .collect()
}

/// add every shard's change from `base` onto it, in shard order, so the
/// model moves as far per epoch whatever the number of shards
fn merge(base: &Weights, copies: Vec<Weights>) -> Weights {
    let mut acc = base.clone();
    for w in copies {
        for ((a, b), x) in acc.syn0.iter_mut().zip(&base.syn0).zip(&w.syn0) {
            *a += x - b;
        }
        for ((a, b), x) in
            acc.syn1neg.iter_mut().zip(&base.syn1neg).zip(&w.syn1neg)
        {
            *a += x - b;
        }
    }
    acc
}

/// learn an [EmbeddingTable] from `sentences`
pub fn train(
    sentences: &[Sentence],
    cfg: &TrainConfig,
) -> Result<EmbeddingTable, TrainError> {
    if cfg.dim == 0 {
        return Err(TrainError::ZeroDim);
    }
    if cfg.epochs == 0 {
        return Err(TrainError::ZeroEpochs);
    }
    if cfg.window == 0 {
        return Err(TrainError::ZeroWindow);
    }
    let vocab = Vocab::build(sentences, cfg.min_count);
    if vocab.tokens.is_empty() {
        return Err(TrainError::EmptyVocab(cfg.min_count));
    }
    let corpus = vocab.encode(sentences);
    let words: usize = corpus.iter().map(Vec::len).sum();
    info!(
        "training on {} sentences, {words} tokens, vocabulary of {}",
        corpus.len(),
        vocab.tokens.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers)
        .build()?;
    let workers = pool.current_num_threads().max(1);

    let dim = cfg.dim;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let syn0: Vec<f32> = (0..vocab.tokens.len() * dim)
        .map(|_| (rng.gen::<f32>() - 0.5) / dim as f32)
        .collect();
    let mut weights = Weights {
        dim,
        syn0,
        syn1neg: vec![0.0; vocab.tokens.len() * dim],
    };
    let noise = NoiseTable::new(&vocab.counts);
    let keep = keep_probabilities(&vocab.counts, cfg.sample);

    let mut order: Vec<usize> = (0..corpus.len()).collect();
    for epoch in 0..cfg.epochs {
        order.shuffle(&mut rng);
        let shard_len = order.len().div_ceil(workers).max(1);
        let shards: Vec<Vec<&Vec<usize>>> = order
            .chunks(shard_len)
            .map(|c| c.iter().map(|&i| &corpus[i]).collect())
            .collect();
        let seeds: Vec<u64> = shards.iter().map(|_| rng.gen()).collect();
        let progress = (
            epoch as f32 / cfg.epochs as f32,
            (epoch + 1) as f32 / cfg.epochs as f32,
        );

        let results: Vec<(Weights, f64, usize)> = pool.install(|| {
            shards
                .par_iter()
                .zip(&seeds)
                .map(|(shard, &seed)| {
                    let mut s = Shard {
                        weights: weights.clone(),
                        cfg,
                        noise: &noise,
                        keep: &keep,
                        rng: StdRng::seed_from_u64(seed),
                        neu1: vec![0.0; dim],
                        neu1e: vec![0.0; dim],
                        loss: 0.0,
                        examples: 0,
                    };
                    s.run(shard, progress);
                    (s.weights, s.loss, s.examples)
                })
                .collect()
        });

        let loss: f64 = results.iter().map(|r| r.1).sum();
        let examples: usize = results.iter().map(|r| r.2).sum();
        weights = merge(&weights, results.into_iter().map(|r| r.0).collect());
        info!(
            "epoch {}/{}: loss {:.4}",
            epoch + 1,
            cfg.epochs,
            loss / examples.max(1) as f64
        );
        debug!("epoch {} trained {examples} examples", epoch + 1);
    }

    Ok(EmbeddingTable::new(dim, vocab.tokens, vocab.counts, weights.syn0))
}
