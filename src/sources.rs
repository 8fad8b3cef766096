//! Loading raw molecule notations from the three kinds of input: a delimited
//! table, a tree of structure files, and a scraped HTML table of InChIs.
//!
//! Single bad records are skipped and counted in [Loaded]. Failing to reach a
//! source at all is returned as a [SourceError], and whether the run goes on
//! without that source is up to the caller.

use std::{
    fmt::Display,
    fs::{self, read_to_string, File},
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use log::{debug, info, warn};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::{
    chem::Mol,
    config::{ScrapedSource, SourcesConfig, StructureSource, TabularSource},
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Tabular,
    StructureFile,
    Scraped,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Tabular => "tabular",
            SourceKind::StructureFile => "structure-file",
            SourceKind::Scraped => "scraped",
        };
        f.pad(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawMolecule {
    pub notation: String,
    pub source: SourceKind,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {cause}")]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("failed to fetch {url}: {cause}")]
    Http {
        url: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("failed to read table {path}: {cause}")]
    Csv {
        path: PathBuf,
        #[source]
        cause: csv::Error,
    },

    #[error("invalid glob pattern `{pattern}`: {cause}")]
    Pattern {
        pattern: String,
        #[source]
        cause: glob::PatternError,
    },

    #[error("delimiter {0:?} is not a single byte")]
    Delimiter(char),

    #[error("no column named `{column}` in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("data directory {0} does not exist")]
    MissingDir(PathBuf),

    #[error("no table with class `{0}` in page")]
    MissingTable(String),

    #[error("invalid selector: {0}")]
    Selector(String),
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError + '_ {
    move |cause| SourceError::Io {
        path: path.to_owned(),
        cause,
    }
}

/// The molecules read from a single source, along with what was left out.
#[derive(Debug, Default)]
pub struct Loaded {
    pub molecules: Vec<RawMolecule>,

    /// malformed records: empty cells, unreadable rows, short table rows
    pub skipped: usize,

    /// names of scraped rows without an identifier
    pub ignored: Vec<String>,

    /// scraped identifiers that could not be converted to a structure
    pub rejected: usize,
}

impl Loaded {
    fn push(&mut self, notation: impl Into<String>, source: SourceKind) {
        self.molecules.push(RawMolecule {
            notation: notation.into(),
            source,
        });
    }
}

/// Read the configured notation column of a delimited file. Files ending in
/// `.gz` are decompressed while reading.
pub fn load_tabular(src: &TabularSource) -> Result<Loaded, SourceError> {
    let path = &src.path;
    let delimiter = Some(src.delimiter)
        .filter(char::is_ascii)
        .and_then(|c| u8::try_from(c).ok())
        .ok_or(SourceError::Delimiter(src.delimiter))?;
    let file = File::open(path).map_err(io(path))?;
    let reader: Box<dyn Read> =
        if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
    let csv_err = |cause| SourceError::Csv {
        path: path.clone(),
        cause,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(reader);
    let column = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .position(|h| h.trim() == src.column)
        .ok_or_else(|| SourceError::MissingColumn {
            path: path.clone(),
            column: src.column.clone(),
        })?;

    let mut loaded = Loaded::default();
    for (i, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            // a broken stream is a broken source, not a bad record
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(csv_err(e))
            }
            Err(e) => {
                debug!("skipping record {i} of {}: {e}", path.display());
                loaded.skipped += 1;
                continue;
            }
        };
        match record.get(column).map(str::trim) {
            Some(s) if !s.is_empty() => loaded.push(s, SourceKind::Tabular),
            _ => loaded.skipped += 1,
        }
    }
    info!(
        "loaded {} molecules from {}, skipped {}",
        loaded.molecules.len(),
        path.display(),
        loaded.skipped
    );
    Ok(loaded)
}

/// Read every file matching `src.pattern` under `src.dir`, in path order. The
/// first line of each file is a header. Every other non-empty line contributes
/// its first whitespace-separated field.
pub fn load_structure_files(
    src: &StructureSource,
) -> Result<Loaded, SourceError> {
    if !src.dir.is_dir() {
        return Err(SourceError::MissingDir(src.dir.clone()));
    }
    let pattern = src.dir.join(&src.pattern).to_string_lossy().into_owned();
    let entries =
        glob::glob(&pattern).map_err(|cause| SourceError::Pattern {
            pattern: pattern.clone(),
            cause,
        })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("skipping {}: {}", e.path().display(), e.error()),
        }
    }
    paths.sort();
    if paths.is_empty() {
        warn!("no files match {pattern}");
    }

    let mut loaded = Loaded::default();
    for path in &paths {
        let contents = read_to_string(path).map_err(io(path))?;
        let before = loaded.molecules.len();
        for line in contents.lines().skip(1) {
            if let Some(notation) = line.split_whitespace().next() {
                loaded.push(notation, SourceKind::StructureFile);
            }
        }
        debug!(
            "{} molecules from {}",
            loaded.molecules.len() - before,
            path.display()
        );
    }
    info!(
        "loaded {} molecules from {} structure files",
        loaded.molecules.len(),
        paths.len()
    );
    Ok(loaded)
}

/// GET `src.url` once, failing on timeouts and non-success statuses
pub fn fetch_page(src: &ScrapedSource) -> Result<String, SourceError> {
    let http = |cause| SourceError::Http {
        url: src.url.clone(),
        cause,
    };
    info!("fetching {}", src.url);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(src.timeout))
        .build()
        .map_err(http)?;
    client
        .get(&src.url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.text())
        .map_err(http)
}

#[derive(Debug, Default, PartialEq)]
pub struct ScrapedTable {
    /// name -> InChI, in page order. the first row for a name wins
    pub entries: IndexMap<String, String>,

    /// rows with no usable identifier, by name
    pub ignored: Vec<String>,

    /// rows with fewer than three cells
    pub malformed: usize,
}

fn selector(s: &str) -> Result<Selector, SourceError> {
    Selector::parse(s).map_err(|e| SourceError::Selector(e.to_string()))
}

/// Extract (index, name, identifier) rows from the first `<table>` carrying
/// `class`. Header rows, which have no `<td>` cells, are passed over.
pub fn parse_table(
    html: &str,
    class: &str,
) -> Result<ScrapedTable, SourceError> {
    let doc = Html::parse_document(html);
    let (tables, rows, cells) =
        (selector("table")?, selector("tr")?, selector("td")?);
    let table = doc
        .select(&tables)
        .find(|t| t.value().classes().any(|c| c == class))
        .ok_or_else(|| SourceError::MissingTable(class.to_owned()))?;

    let mut ret = ScrapedTable::default();
    for row in table.select(&rows) {
        let tds: Vec<String> = row
            .select(&cells)
            .map(|td| td.text().collect::<String>().trim().to_owned())
            .collect();
        if tds.is_empty() {
            continue;
        }
        if tds.len() < 3 {
            ret.malformed += 1;
            continue;
        }
        let (name, id) = (&tds[1], &tds[2]);
        if !id.starts_with("InChI=") {
            ret.ignored.push(name.clone());
            continue;
        }
        ret.entries
            .entry(name.clone())
            .or_insert_with(|| id.clone());
    }
    Ok(ret)
}

/// `<dir>/<prefix>-<YYYYmmdd-HHMMSS>.html`
pub fn snapshot_path(
    dir: &Path,
    prefix: &str,
    time: DateTime<Local>,
) -> PathBuf {
    dir.join(format!("{prefix}-{}.html", time.format("%Y%m%d-%H%M%S")))
}

fn write_mapping(
    path: &Path,
    entries: &IndexMap<String, String>,
) -> Result<(), SourceError> {
    let csv_err = |cause| SourceError::Csv {
        path: path.to_owned(),
        cause,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["name", "inchi"]).map_err(csv_err)?;
    for (name, inchi) in entries {
        wtr.write_record([name, inchi]).map_err(csv_err)?;
    }
    wtr.flush().map_err(io(path))
}

/// Fetch (or reread) the page, keep a timestamped copy and the extracted
/// mapping next to it, and convert each identifier to canonical SMILES.
/// Identifiers that do not convert are logged and counted.
pub fn load_scraped(src: &ScrapedSource) -> Result<Loaded, SourceError> {
    fs::create_dir_all(&src.snapshot_dir).map_err(io(&src.snapshot_dir))?;
    let html = match &src.snapshot {
        Some(path) => {
            info!("reading page snapshot {}", path.display());
            read_to_string(path).map_err(io(path))?
        }
        None => {
            let html = fetch_page(src)?;
            let path =
                snapshot_path(&src.snapshot_dir, &src.prefix, Local::now());
            fs::write(&path, &html).map_err(io(&path))?;
            info!("saved page to {}", path.display());
            html
        }
    };

    let table = parse_table(&html, &src.table_class)?;
    write_mapping(&src.snapshot_dir.join(&src.mapping), &table.entries)?;

    let mut loaded = Loaded {
        skipped: table.malformed,
        ignored: table.ignored,
        ..Default::default()
    };
    for (name, inchi) in &table.entries {
        match Mol::from_inchi(inchi) {
            Ok(mol) => loaded.push(mol.to_smiles(), SourceKind::Scraped),
            Err(e) => {
                warn!("rejecting {name}: {e}");
                loaded.rejected += 1;
            }
        }
    }
    info!(
        "loaded {} scraped molecules, {} without identifiers, {} rejected",
        loaded.molecules.len(),
        loaded.ignored.len(),
        loaded.rejected
    );
    Ok(loaded)
}

/// Load every configured source, in the order tabular, structure files,
/// scraped.
pub fn load_all(
    cfg: &SourcesConfig,
) -> Vec<(SourceKind, Result<Loaded, SourceError>)> {
    let mut ret = Vec::new();
    if let Some(src) = &cfg.tabular {
        ret.push((SourceKind::Tabular, load_tabular(src)));
    }
    if let Some(src) = &cfg.structure {
        ret.push((SourceKind::StructureFile, load_structure_files(src)));
    }
    if let Some(src) = &cfg.scraped {
        ret.push((SourceKind::Scraped, load_scraped(src)));
    }
    ret
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn notations(loaded: &Loaded) -> Vec<&str> {
        loaded.molecules.iter().map(|m| m.notation.as_str()).collect()
    }

    fn tabular(path: &str, column: &str) -> TabularSource {
        TabularSource {
            path: PathBuf::from(path),
            column: column.to_owned(),
            delimiter: ',',
        }
    }

    fn scraped(dir: &Path) -> ScrapedSource {
        ScrapedSource {
            url: "http://localhost:1/unused".to_owned(),
            snapshot: Some(PathBuf::from("testfiles/page.html")),
            table_class: "wikitable".to_owned(),
            snapshot_dir: dir.to_owned(),
            prefix: "page".to_owned(),
            mapping: "mapping.csv".to_owned(),
            timeout: 1,
        }
    }

    #[test]
    fn tabular_gz() {
        let got = load_tabular(&tabular("testfiles/molecules.csv.gz", "smiles"))
            .unwrap();
        assert_eq!(notations(&got), vec!["CCO", "c1ccccc1", "CC=O", "CCO"]);
        assert_eq!(got.skipped, 2);
        assert!(got.molecules.iter().all(|m| m.source == SourceKind::Tabular));
    }

    #[test]
    fn tabular_plain_matches_gz() {
        let plain = load_tabular(&tabular("testfiles/molecules.csv", "smiles"))
            .unwrap();
        let gz = load_tabular(&tabular("testfiles/molecules.csv.gz", "smiles"))
            .unwrap();
        assert_eq!(plain.molecules, gz.molecules);
        assert_eq!(plain.skipped, gz.skipped);
    }

    #[test]
    fn tabular_errors() {
        assert!(matches!(
            load_tabular(&tabular("testfiles/molecules.csv", "inchi")),
            Err(SourceError::MissingColumn { .. })
        ));
        assert!(matches!(
            load_tabular(&tabular("testfiles/nonexistent.csv", "smiles")),
            Err(SourceError::Io { .. })
        ));
        for delimiter in ['é', '\u{2028}'] {
            let src = TabularSource {
                delimiter,
                ..tabular("testfiles/molecules.csv", "smiles")
            };
            assert!(matches!(
                load_tabular(&src),
                Err(SourceError::Delimiter(c)) if c == delimiter
            ));
        }
    }

    #[test]
    fn structure_files() {
        let got = load_structure_files(&StructureSource {
            dir: PathBuf::from("testfiles/structures"),
            pattern: "**/*.smi".to_owned(),
        })
        .unwrap();
        assert_eq!(notations(&got), vec!["C#N", "CC#N", "O=C=O", "C=O"]);
    }

    #[test]
    fn structure_files_missing_dir() {
        let got = load_structure_files(&StructureSource {
            dir: PathBuf::from("testfiles/no-such-dir"),
            pattern: "*.smi".to_owned(),
        });
        assert!(matches!(got, Err(SourceError::MissingDir(_))));
    }

    #[test]
    fn scraped_row() {
        let html = r#"<table class="sortable wikitable">
            <tr><th>#</th><th>name</th><th>InChI</th></tr>
            <tr><td>1</td><td>H2O</td><td>InChI=1S/H2O/h1H2</td></tr>
            </table>"#;
        let got = parse_table(html, "wikitable").unwrap();
        let want: IndexMap<String, String> =
            [("H2O".to_owned(), "InChI=1S/H2O/h1H2".to_owned())].into();
        assert_eq!(got.entries, want);
        assert!(got.ignored.is_empty());
        assert_eq!(got.malformed, 0);
    }

    #[test]
    fn scraped_table() {
        let html = read_to_string("testfiles/page.html").unwrap();
        let got = parse_table(&html, "wikitable").unwrap();
        let names: Vec<&str> = got.entries.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["H2O", "hydrogen cyanide", "ethanol", "benzene", "CH+"]
        );
        assert_eq!(got.entries["H2O"], "InChI=1S/H2O/h1H2");
        assert_eq!(got.ignored, vec!["C3H", "HC5N"]);
        assert_eq!(got.malformed, 1);

        assert!(matches!(
            parse_table(&html, "no-such-class"),
            Err(SourceError::MissingTable(_))
        ));
    }

    #[test]
    fn scraped_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let got = load_scraped(&scraped(dir.path())).unwrap();
        assert_eq!(notations(&got), vec!["O", "C#N", "CCO", "c1ccccc1"]);
        assert_eq!(got.rejected, 1);
        assert_eq!(got.ignored.len(), 2);
        assert_eq!(got.skipped, 1);

        let mapping = read_to_string(dir.path().join("mapping.csv")).unwrap();
        let mut lines = mapping.lines();
        assert_eq!(lines.next(), Some("name,inchi"));
        assert_eq!(lines.next(), Some("H2O,InChI=1S/H2O/h1H2"));
        assert_eq!(lines.count(), 4);
    }

    #[test]
    fn snapshot_name() {
        let time = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let got = snapshot_path(Path::new("data"), "molecules", time);
        assert_eq!(got, PathBuf::from("data/molecules-20240305-070809.html"));
    }

    #[test]
    fn all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SourcesConfig {
            tabular: Some(tabular("testfiles/missing.csv.gz", "smiles")),
            structure: Some(StructureSource {
                dir: PathBuf::from("testfiles/structures"),
                pattern: "**/*.smi".to_owned(),
            }),
            scraped: Some(scraped(dir.path())),
        };
        let got = load_all(&cfg);
        let kinds: Vec<SourceKind> = got.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::Tabular,
                SourceKind::StructureFile,
                SourceKind::Scraped
            ]
        );
        assert!(got[0].1.is_err());
        assert!(got[1].1.is_ok());
        assert!(got[2].1.is_ok());
    }
}
