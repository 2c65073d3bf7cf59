use crate::models::{parse_cutoff, Category, CategoryScores, CutoffRecord, CutoffTable};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const COLLEGE_COLUMN: &str = "COLLEGE NAME";
pub const PROGRAM_COLUMN: &str = "PROGRAM NAME";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read cutoff table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cutoff table: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to fetch cutoff table: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cutoff table request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
}

/// Non-fatal problems found while loading. The table is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    SourceMissing(PathBuf),
    ColumnMissing(&'static str),
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::SourceMissing(path) => {
                write!(f, "cutoff table {} not found", path.display())
            }
            LoadWarning::ColumnMissing(column) => {
                write!(f, "cutoff table is missing required column '{}'", column)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadedTable {
    pub table: CutoffTable,
    pub warnings: Vec<LoadWarning>,
    pub rows_read: usize,
}

pub struct CutoffLoader {
    client: reqwest::Client,
}

impl CutoffLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Load a cutoff CSV from disk. A missing file yields an empty table.
    pub fn load_file(&self, path: &Path) -> Result<LoadedTable, LoadError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "cutoff table not found");
                return Ok(LoadedTable {
                    warnings: vec![LoadWarning::SourceMissing(path.to_path_buf())],
                    ..LoadedTable::default()
                });
            }
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let loaded = parse_cutoff_csv(file)?;
        tracing::info!(
            path = %path.display(),
            rows_read = loaded.rows_read,
            records = loaded.table.records.len(),
            "loaded cutoff table"
        );
        Ok(loaded)
    }

    pub async fn load_url(&self, url: &str, timeout: Duration) -> Result<LoadedTable, LoadError> {
        tracing::info!(url, "fetching cutoff table");

        let response = self.client.get(url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        parse_cutoff_csv(body.as_ref())
    }
}

impl Default for CutoffLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim, upper-case and strip a leading BOM from a header cell.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_uppercase()
}

struct ColumnLayout {
    college: Option<usize>,
    program: Option<usize>,
    categories: Vec<(Category, usize)>,
}

impl ColumnLayout {
    fn from_headers(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        let position = |wanted: &str| names.iter().position(|name| name == wanted);

        let categories = Category::ALL
            .into_iter()
            .filter_map(|category| position(category.column_key()).map(|idx| (category, idx)))
            .collect();

        Self {
            college: position(COLLEGE_COLUMN),
            program: position(PROGRAM_COLUMN),
            categories,
        }
    }

    fn text(record: &StringRecord, idx: Option<usize>) -> String {
        idx.and_then(|i| record.get(i))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }
}

/// Parse raw CSV into the canonical cutoff table.
pub fn parse_cutoff_csv<R: Read>(reader: R) -> Result<LoadedTable, LoadError> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let layout = ColumnLayout::from_headers(&headers);

    let mut warnings = Vec::new();
    if layout.college.is_none() {
        tracing::warn!(column = COLLEGE_COLUMN, "required column missing");
        warnings.push(LoadWarning::ColumnMissing(COLLEGE_COLUMN));
    }
    if layout.program.is_none() {
        tracing::warn!(column = PROGRAM_COLUMN, "required column missing");
        warnings.push(LoadWarning::ColumnMissing(PROGRAM_COLUMN));
    }

    let mut records = Vec::new();
    let mut rows_read = 0;

    for row in csv_reader.records() {
        let row = row?;
        rows_read += 1;

        let college = ColumnLayout::text(&row, layout.college);
        let program = ColumnLayout::text(&row, layout.program);

        // Spacer rows from table extraction, or rows missing an identity
        if college.is_empty() || program.is_empty() {
            tracing::trace!(row = rows_read, "skipping row without college or program");
            continue;
        }

        let mut cutoffs = CategoryScores::default();
        for &(category, idx) in &layout.categories {
            cutoffs.set(category, row.get(idx).and_then(parse_cutoff));
        }

        records.push(CutoffRecord {
            college,
            program,
            cutoffs,
        });
    }

    tracing::debug!(
        rows_read,
        records = records.len(),
        categories = layout.categories.len(),
        "parsed cutoff csv"
    );

    Ok(LoadedTable {
        table: CutoffTable {
            records,
            available_categories: layout.categories.iter().map(|(c, _)| *c).collect(),
        },
        warnings,
        rows_read,
    })
}

/// Rewrite an uploaded CSV with normalized headers, leaving cells untouched.
pub fn normalize_csv<R: Read>(reader: R) -> Result<Vec<u8>, LoadError> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = csv_reader.headers()?.iter().map(normalize_header).collect();

    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in csv_reader.records() {
        writer.write_record(&row?)?;
    }

    writer
        .into_inner()
        .map_err(|e| LoadError::Csv(csv::Error::from(e.into_error())))
}

/// Sorted, de-duplicated program names for the program picker.
pub fn programs(table: &CutoffTable) -> Vec<String> {
    table
        .records
        .iter()
        .map(|record| record.program.as_str())
        .filter(|program| !program.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
