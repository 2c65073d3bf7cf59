use crate::loader::{CutoffLoader, LoadError, LoadWarning, LoadedTable};
use crate::models::CutoffTable;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The table a reader saw, tagged with the cache version it came from.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub table: Arc<CutoffTable>,
    pub version: u64,
    pub warnings: Vec<LoadWarning>,
}

/// Holds the loaded cutoff table for the process. Replacing the file bumps
/// the version and drops the cached copy, so the next read reloads.
pub struct TableCache {
    path: PathBuf,
    loader: CutoffLoader,
    cached: Option<TableSnapshot>,
    version: u64,
}

impl TableCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loader: CutoffLoader::new(),
            cached: None,
            version: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&mut self) -> Result<TableSnapshot, LoadError> {
        if let Some(snapshot) = &self.cached {
            tracing::trace!(version = snapshot.version, "cutoff table cache hit");
            return Ok(snapshot.clone());
        }

        let loaded = self.loader.load_file(&self.path)?;
        Ok(self.store(loaded))
    }

    /// Seed the cache with a table obtained elsewhere (for example over HTTP).
    pub fn store(&mut self, loaded: LoadedTable) -> TableSnapshot {
        let snapshot = TableSnapshot {
            table: Arc::new(loaded.table),
            version: self.version,
            warnings: loaded.warnings,
        };
        self.cached = Some(snapshot.clone());
        snapshot
    }

    /// Overwrite the backing file and invalidate the cached table.
    pub fn replace(&mut self, contents: &[u8]) -> Result<u64, LoadError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        std::fs::write(&self.path, contents).map_err(|source| self.io_error(source))?;
        self.invalidate();
        tracing::info!(path = %self.path.display(), version = self.version, "cutoff table replaced");
        Ok(self.version)
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
        self.version += 1;
    }

    fn io_error(&self, source: io::Error) -> LoadError {
        LoadError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn replace_invalidates_and_next_read_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.csv");
        std::fs::write(&path, "COLLEGE NAME,PROGRAM NAME,UR\nCollegeA,ProgA,590\n").unwrap();

        let mut cache = TableCache::new(&path);
        let first = cache.get().unwrap();
        assert_eq!(first.version, 0);
        assert_eq!(first.table.records.len(), 1);

        // Served from cache even though the file changed underneath
        std::fs::write(&path, "COLLEGE NAME,PROGRAM NAME,UR\n").unwrap();
        assert_eq!(cache.get().unwrap().table.records.len(), 1);

        let version = cache
            .replace(b"COLLEGE NAME,PROGRAM NAME,UR,ST\nCollegeA,ProgA,590,400\nCollegeB,ProgA,610,\n")
            .unwrap();
        assert_eq!(version, 1);

        let second = cache.get().unwrap();
        assert_eq!(second.version, 1);
        assert_eq!(second.table.records.len(), 2);
        assert!(second.table.has_category(Category::ST));

        // Earlier readers keep the snapshot they captured
        assert_eq!(first.table.records.len(), 1);
    }

    #[test]
    fn missing_file_is_cached_as_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TableCache::new(dir.path().join("missing.csv"));

        let snapshot = cache.get().unwrap();
        assert!(snapshot.table.is_empty());
        assert!(matches!(snapshot.warnings.as_slice(), [LoadWarning::SourceMissing(_)]));
    }
}
