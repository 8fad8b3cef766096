use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::aggregate::AggregateConfig;
use crate::error::Error;
use crate::train::TrainConfig;

/// A delimited, optionally gzip-compressed, table with a notation column.
#[derive(Clone, Debug, Deserialize)]
pub struct TabularSource {
    /// The path to the table. Files ending in `.gz` are decompressed on the
    /// fly.
    pub path: PathBuf,

    /// The header of the column holding the molecule notations.
    #[serde(default = "default_column")]
    pub column: String,

    /// The single-byte field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_column() -> String {
    "smiles".to_owned()
}

fn default_delimiter() -> char {
    ','
}

/// A directory tree of line-delimited structure files, each with a header
/// line.
#[derive(Clone, Debug, Deserialize)]
pub struct StructureSource {
    pub dir: PathBuf,

    /// Glob pattern relative to `dir`. Use `**` to descend into
    /// subdirectories.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    "**/*.smi".to_owned()
}

/// An HTML page with a table of name to InChI rows.
#[derive(Clone, Debug, Deserialize)]
pub struct ScrapedSource {
    pub url: String,

    /// Read the page from this file instead of fetching `url`, for offline
    /// reruns against an earlier snapshot.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,

    /// The class attribute identifying the table of interest.
    pub table_class: String,

    /// Where to store the raw page and the extracted mapping.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// File name prefix for the raw page, followed by a timestamp.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// File name of the `name,inchi` mapping inside `snapshot_dir`.
    #[serde(default = "default_mapping")]
    pub mapping: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("data/scraped")
}

fn default_prefix() -> String {
    "page".to_owned()
}

fn default_mapping() -> String {
    "mapping.csv".to_owned()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourcesConfig {
    pub tabular: Option<TabularSource>,
    pub structure: Option<StructureSource>,
    pub scraped: Option<ScrapedSource>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Output {
    /// Newline-delimited canonical SMILES.
    #[serde(default = "default_corpus")]
    pub corpus: PathBuf,

    /// CSV of `canonical,weight,source`.
    #[serde(default)]
    pub properties: Option<PathBuf>,

    /// The trained embedding table.
    #[serde(default = "default_model")]
    pub model: PathBuf,

    /// N×D `.npy` array of molecule vectors, aligned with the corpus lines.
    #[serde(default = "default_vectors")]
    pub vectors: PathBuf,

    /// Whitespace-separated N×N cosine similarity matrix. Skipped when
    /// absent, since it grows quadratically with the corpus.
    #[serde(default)]
    pub similarity: Option<PathBuf>,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            corpus: default_corpus(),
            properties: None,
            model: default_model(),
            vectors: default_vectors(),
            similarity: None,
        }
    }
}

fn default_corpus() -> PathBuf {
    PathBuf::from("corpus.smi")
}

fn default_model() -> PathBuf {
    PathBuf::from("model.json")
}

fn default_vectors() -> PathBuf {
    PathBuf::from("vectors.npy")
}

#[derive(Clone, Debug, Deserialize)]
pub struct SentenceConfig {
    /// Morgan radius used to build sentences
    #[serde(default = "default_radius")]
    pub radius: u32,
}

impl Default for SentenceConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
        }
    }
}

fn default_radius() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The number of threads to use. Defaults to the number of logical CPUs as
    /// detected by rayon.
    #[serde(default)]
    pub threads: usize,

    /// Abort the run when any configured source cannot be loaded, instead of
    /// continuing with the others.
    #[serde(default)]
    pub fail_on_source_error: bool,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub sentence: SentenceConfig,

    #[serde(default)]
    pub train: TrainConfig,

    #[serde(default)]
    pub aggregate: AggregateConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let s = read_to_string(path).map_err(Error::io(path))?;
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{aggregate::Aggregation, train::Objective};

    use super::*;

    #[test]
    fn load_example() {
        let got = Config::load("testfiles/config.toml").unwrap();
        assert_eq!(got.threads, 2);
        assert!(!got.fail_on_source_error);

        let tabular = got.sources.tabular.unwrap();
        assert_eq!(tabular.path, PathBuf::from("testfiles/molecules.csv.gz"));
        assert_eq!(tabular.column, "smiles");

        let structure = got.sources.structure.unwrap();
        assert_eq!(structure.pattern, "**/*.smi");

        let scraped = got.sources.scraped.unwrap();
        assert_eq!(scraped.table_class, "wikitable");
        assert_eq!(scraped.timeout, 10);

        assert_eq!(got.sentence.radius, 1);
        assert_eq!(got.train.dim, 16);
        assert_eq!(got.train.objective, Objective::SkipGram);
        assert_eq!(got.aggregate.mode, Aggregation::Mean);
    }

    #[test]
    fn defaults() {
        let got = Config::parse("").unwrap();
        assert_eq!(got.threads, 0);
        assert!(got.sources.tabular.is_none());
        assert_eq!(got.output.corpus, PathBuf::from("corpus.smi"));
        assert_eq!(got.sentence.radius, 1);
        assert_eq!(got.train.dim, 300);
        assert_eq!(got.train.window, 10);
        assert_eq!(got.aggregate.mode, Aggregation::Sum);
    }

    #[test]
    fn unknown_objective() {
        assert!(Config::parse("[train]\nobjective = \"glove\"").is_err());
    }
}
