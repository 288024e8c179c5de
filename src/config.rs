use std::path::PathBuf;

/// Configuration for the sheet store
#[derive(Debug, Clone)]
pub struct SheetDbConfig {
    /// Root directory on the file store (default: ./sheetdb)
    pub dir: PathBuf,

    /// Maximum number of sheets resident in memory at once (default: 64)
    pub cache_capacity: usize,

    /// Minimum number of rows for a fresh sheet (default: 10)
    pub min_rows: usize,

    /// Minimum number of columns for a fresh sheet (default: 10)
    pub min_cols: usize,

    /// Run the thorough consistency check on first access of each document.
    /// Set when this process takes over documents previously owned by a
    /// crashed server; the brief check suffices after a clean shutdown.
    pub thorough_check: bool,
}

impl Default for SheetDbConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./sheetdb"),
            cache_capacity: 64,
            min_rows: 10,
            min_cols: 10,
            thorough_check: false,
        }
    }
}

impl SheetDbConfig {
    /// Create a new config with the given root directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the minimum sheet shape
    pub fn min_shape(mut self, rows: usize, cols: usize) -> Self {
        self.min_rows = rows;
        self.min_cols = cols;
        self
    }

    /// Enable the thorough consistency check on first access
    pub fn thorough_check(mut self, enabled: bool) -> Self {
        self.thorough_check = enabled;
        self
    }
}
