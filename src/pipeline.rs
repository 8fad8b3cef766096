//! The whole run: load, clean, annotate, write the corpus, tokenize, train,
//! and embed.

use std::{fs, path::Path};

use log::{info, warn};

use crate::{
    aggregate::{aggregate_all, count_empty, write_vectors},
    config::Config,
    corpus::{
        annotate, canonicalize, dedup, valid, weight_summary, write_corpus,
        write_properties,
    },
    error::Error,
    report::Report,
    sentence::{sentences, Sentence},
    similarity::pairwise_similarity,
    sources::load_all,
    train::train,
};

fn ensure_parent(path: &Path) -> Result<(), Error> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(Error::io(dir))
        }
        _ => Ok(()),
    }
}

pub fn run(config: &Config) -> Result<Report, Error> {
    let mut report = Report::default();

    let mut raw = Vec::new();
    for (kind, res) in load_all(&config.sources) {
        match res {
            Ok(loaded) => {
                report.add_source(kind, &loaded);
                raw.extend(loaded.molecules);
            }
            Err(cause) if config.fail_on_source_error => {
                return Err(Error::Source { kind, cause })
            }
            Err(e) => {
                warn!("continuing without {kind} source: {e}");
                report.failed_sources.push(kind);
            }
        }
    }
    info!("{} raw molecules", raw.len());

    let (records, unparsable) = valid(canonicalize(&raw));
    let (mut records, duplicates) = dedup(records);
    report.unparsable = unparsable;
    report.duplicates = duplicates;
    report.corpus = records.len();
    info!(
        "{} unique molecules, {unparsable} unparsable, {duplicates} duplicates",
        records.len()
    );

    report.descriptor_failures = annotate(&mut records);
    if let Some(s) = weight_summary(&records) {
        info!(
            "weights of {} molecules: min {:.3}, max {:.3}, mean {:.3}",
            s.count, s.min, s.max, s.mean
        );
    }

    let out = &config.output;
    let corpus: Vec<String> =
        records.iter().map(|r| r.canonical.clone()).collect();
    ensure_parent(&out.corpus)?;
    write_corpus(&out.corpus, &corpus).map_err(Error::io(&out.corpus))?;
    info!("wrote corpus to {}", out.corpus.display());
    if let Some(path) = &out.properties {
        ensure_parent(path)?;
        write_properties(path, &records)?;
    }

    let cached = sentences(&corpus, config.sentence.radius);
    report.untokenizable = cached.iter().filter(|s| s.is_none()).count();
    let training: Vec<Sentence> = cached.iter().flatten().cloned().collect();

    let table = train(&training, &config.train)?;
    report.vocab = table.len();
    ensure_parent(&out.model)?;
    table.save(&out.model)?;
    info!("wrote model to {}", out.model.display());

    let vectors = aggregate_all(&cached, &table, &config.aggregate);
    report.empty_vectors = count_empty(&vectors);
    ensure_parent(&out.vectors)?;
    write_vectors(&out.vectors, &vectors)?;
    info!("wrote {} vectors to {}", vectors.nrows(), out.vectors.display());

    if let Some(path) = &out.similarity {
        let rows: Vec<Vec<f32>> =
            vectors.rows().into_iter().map(|r| r.to_vec()).collect();
        let m = pairwise_similarity(&rows);
        ensure_parent(path)?;
        m.write(path).map_err(Error::io(path))?;
        info!("wrote similarity matrix to {}", path.display());
    }

    info!("{report}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::{
        aggregate::read_vectors,
        config::{Output, StructureSource, TabularSource},
        corpus::read_corpus,
        sources::SourceKind,
        train::{EmbeddingTable, TrainConfig},
    };

    use super::*;

    fn config(dir: &Path) -> Config {
        let mut config = Config::parse("").unwrap();
        config.sources.tabular = Some(TabularSource {
            path: PathBuf::from("testfiles/molecules.csv.gz"),
            column: "smiles".to_owned(),
            delimiter: ',',
        });
        config.sources.structure = Some(StructureSource {
            dir: PathBuf::from("testfiles/structures"),
            pattern: "**/*.smi".to_owned(),
        });
        config.output = Output {
            corpus: dir.join("out/corpus.smi"),
            properties: Some(dir.join("out/properties.csv")),
            model: dir.join("out/model.json"),
            vectors: dir.join("out/vectors.npy"),
            similarity: Some(dir.join("out/similarity.txt")),
        };
        config.train = TrainConfig {
            dim: 8,
            window: 4,
            workers: 1,
            epochs: 2,
            seed: 1,
            ..Default::default()
        };
        config
    }

    #[test]
    fn full_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let report = run(&config).unwrap();

        assert_eq!(
            report.loaded,
            vec![(SourceKind::Tabular, 4), (SourceKind::StructureFile, 4)]
        );
        assert_eq!(report.skipped, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.unparsable, 0);
        assert_eq!(report.corpus, 7);
        assert_eq!(report.untokenizable, 0);
        assert_eq!(report.empty_vectors, 0);

        let corpus = read_corpus(&config.output.corpus).unwrap();
        assert_eq!(corpus.len(), 7);
        assert_eq!(&corpus[..3], &["CCO", "c1ccccc1", "CC=O"]);

        let table = EmbeddingTable::load(&config.output.model).unwrap();
        assert_eq!(table.len(), report.vocab);
        assert_eq!(table.dim(), 8);

        let vectors = read_vectors(&config.output.vectors).unwrap();
        assert_eq!(vectors.shape(), &[7, 8]);

        let sim =
            fs::read_to_string(config.output.similarity.as_ref().unwrap())
                .unwrap();
        assert_eq!(sim.lines().count(), 7);
    }

    #[test]
    fn source_failure_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.sources.structure = Some(StructureSource {
            dir: PathBuf::from("testfiles/no-such-dir"),
            pattern: "*.smi".to_owned(),
        });

        let report = run(&config).unwrap();
        assert_eq!(report.failed_sources, vec![SourceKind::StructureFile]);
        assert_eq!(report.corpus, 3);

        config.fail_on_source_error = true;
        assert!(matches!(
            run(&config),
            Err(Error::Source {
                kind: SourceKind::StructureFile,
                ..
            })
        ));
    }
}
