use std::fmt::Display;

use crate::sources::{Loaded, SourceKind};

/// Counts of everything a pipeline run kept, dropped, or could not process.
#[derive(Debug, Default)]
pub struct Report {
    /// molecules loaded from each source that could be reached
    pub loaded: Vec<(SourceKind, usize)>,

    /// sources that could not be reached
    pub failed_sources: Vec<SourceKind>,

    /// malformed records inside otherwise readable sources
    pub skipped: usize,

    /// scraped names with no identifier
    pub ignored: Vec<String>,

    /// scraped identifiers that did not convert to a structure
    pub rejected: usize,

    pub unparsable: usize,
    pub duplicates: usize,
    pub corpus: usize,
    pub descriptor_failures: usize,
    pub untokenizable: usize,

    /// molecules whose tokens were all out of vocabulary
    pub empty_vectors: usize,

    pub vocab: usize,
}

impl Report {
    pub fn add_source(&mut self, kind: SourceKind, loaded: &Loaded) {
        self.loaded.push((kind, loaded.molecules.len()));
        self.skipped += loaded.skipped;
        self.ignored.extend(loaded.ignored.iter().cloned());
        self.rejected += loaded.rejected;
    }

    pub fn total_loaded(&self) -> usize {
        self.loaded.iter().map(|(_, n)| n).sum()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "loaded {} molecules", self.total_loaded())?;
        for (kind, n) in &self.loaded {
            writeln!(f, "    {kind:<16}{n:>8}")?;
        }
        for kind in &self.failed_sources {
            writeln!(f, "    {kind:<16}  failed")?;
        }
        writeln!(f, "skipped malformed records    {:>8}", self.skipped)?;
        writeln!(f, "ignored without identifier   {:>8}", self.ignored.len())?;
        writeln!(f, "rejected identifiers         {:>8}", self.rejected)?;
        writeln!(f, "unparsable                   {:>8}", self.unparsable)?;
        writeln!(f, "duplicates removed           {:>8}", self.duplicates)?;
        writeln!(f, "corpus size                  {:>8}", self.corpus)?;
        writeln!(
            f,
            "descriptor failures          {:>8}",
            self.descriptor_failures
        )?;
        writeln!(f, "untokenizable                {:>8}", self.untokenizable)?;
        writeln!(f, "empty vectors                {:>8}", self.empty_vectors)?;
        write!(f, "vocabulary size              {:>8}", self.vocab)
    }
}
