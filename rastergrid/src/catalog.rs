//! Grid file cache.

use crate::{flt::canonical_path, FloatGrid, RasterError};
use dashmap::DashMap;
use log::debug;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Opens grid files on demand and hands out shared references, so a
/// grid named by several inputs is only mapped once.
#[derive(Default)]
pub struct GridCatalog {
    /// Grids which have been opened, keyed by `.flt` path.
    grids: DashMap<PathBuf, Arc<FloatGrid>>,
}

impl GridCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the grid at `path`, opening it if this catalog has not
    /// seen it before.
    pub fn open(&self, path: &Path) -> Result<Arc<FloatGrid>, RasterError> {
        let key = canonical_path(path);
        self.grids
            .entry(key)
            .or_try_insert_with(|| {
                debug!("opening grid {path:?}");
                FloatGrid::open(path).map(Arc::new)
            })
            .map(|r| r.clone())
    }

    /// Returns the number of distinct grids opened so far.
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::GridCatalog;
    use std::{fs, sync::Arc};

    #[test]
    fn test_same_grid_opened_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lc.hdr"),
            "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n",
        )
        .unwrap();
        fs::write(dir.path().join("lc.flt"), 3.0_f32.to_le_bytes()).unwrap();

        let catalog = GridCatalog::new();
        let a = catalog.open(&dir.path().join("lc.hdr")).unwrap();
        let b = catalog.open(&dir.path().join("lc.flt")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_relative_spellings_share_a_grid() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a");
        fs::create_dir(&sub).unwrap();
        fs::write(
            sub.join("lc.hdr"),
            "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n",
        )
        .unwrap();
        fs::write(sub.join("lc.flt"), 3.0_f32.to_le_bytes()).unwrap();

        let catalog = GridCatalog::new();
        let a = catalog.open(&dir.path().join("a/lc.hdr")).unwrap();
        let b = catalog.open(&sub.join(".").join("lc.flt")).unwrap();
        let c = catalog.open(&dir.path().join("a/../a/lc")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_missing_grid_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = GridCatalog::new();
        assert!(catalog.open(&dir.path().join("nope.hdr")).is_err());
        assert!(catalog.is_empty());
    }
}
