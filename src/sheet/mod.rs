//! Sheet persistence: per-document checkpoint + write-ahead log.
//!
//! Each document `fid` lives under `<root>/sheet/<fid>/` as two directories
//! of unpadded decimal filenames:
//!
//! ```text
//! checkpoint/1, 2, ..., C     full snapshots
//! log/1, 2, ..., L            cell mutation logs
//! ```
//!
//! The checkpoint-log invariant holds in every quiescent state: `L = C + 1`.
//! `log/L` is the active log accepting appends; every earlier log is sealed
//! by a trailing commit marker. A commit writes `checkpoint/C+1`, seals
//! `log/C+1`, then creates the empty `log/C+2`, in that order; a crash
//! between any pair of those steps leaves a state that [`SheetStore::check`]
//! repairs. Reconstruction needs only the pair (`checkpoint/C`, `log/C+1`).

mod check;
pub mod grid;
pub mod record;
mod recovery;

pub use grid::{MemSheet, SharedSheet};
pub use record::{Checkpoint, LogRecord};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::cache::Cache;
use crate::config::SheetDbConfig;
use crate::dfs::{Dfs, LocalDfs};
use crate::encoding::json;
use crate::error::Result;
use crate::errunrecoverable;
use crate::Error;

/// The persistence manager. Owns the on-disk layout of every document and
/// the bounded cache of resident sheets.
///
/// On-disk files are owned exclusively by this type; no other component may
/// create, rename, or delete them. A resident sheet is owned by the cache;
/// a commit borrows it under the sheet's own lock.
///
/// Lock order: the cache lock is acquired before any sheet lock and released
/// before any file-store I/O; only the committing sheet's lock is held
/// across the I/O of its own commit.
pub struct SheetStore {
    dfs: Arc<dyn Dfs>,
    cache: Mutex<Cache<u64, SharedSheet>>,
    config: SheetDbConfig,
}

impl SheetStore {
    /// Creates a store over the given file store.
    pub fn new(config: SheetDbConfig, dfs: Arc<dyn Dfs>) -> Self {
        let cache = Mutex::new(Cache::new(config.cache_capacity));
        Self { dfs, cache, config }
    }

    /// Opens a store over the local filesystem at `config.dir`.
    pub fn open(config: SheetDbConfig) -> Result<Self> {
        let dfs = Arc::new(LocalDfs::open(config.dir.clone())?);
        Ok(Self::new(config, dfs))
    }

    pub fn config(&self) -> &SheetDbConfig {
        &self.config
    }

    /// Initializes the on-disk layout for a new document: an empty
    /// `checkpoint/` directory and an empty active `log/1`.
    pub fn create_document(&self, fid: u64) -> Result<()> {
        self.dfs.mkdir(&self.checkpoint_root(fid))?;
        self.dfs.mkdir(&self.log_root(fid))?;
        self.dfs.create(&self.log_path(fid, 1), 0)?;
        Ok(())
    }

    /// Appends one encoded mutation entry to `log/lid`. The caller supplies
    /// `lid = C + 1` under the sheet lock, which totally orders appends per
    /// document.
    ///
    /// Failures are logged and swallowed: the client already applied the
    /// mutation optimistically, and the consistency check on next open
    /// detects any damage.
    pub fn append_log(&self, fid: u64, lid: u64, record: &LogRecord) {
        let line = match json::serialize_line(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(fid, lid, error = %e, "failed to encode log entry");
                return;
            }
        };
        if let Err(e) = self.dfs.append(&self.log_path(fid, lid), &line) {
            tracing::error!(fid, lid, error = %e, "log file append failed");
        }
    }

    /// Commits the sheet: writes `checkpoint/C+1` from its current content,
    /// seals the active `log/C+1`, and creates the empty `log/C+2`. Returns
    /// the new checkpoint number, or the current one when the active log
    /// holds no mutations.
    pub fn commit(&self, fid: u64, sheet: &SharedSheet) -> Result<u64> {
        let guard = sheet.lock()?;

        let cur_cid = self.checkpoint_count(fid)?;
        let lid = cur_cid + 1;

        let entries = self.read_log(fid, lid)?;
        if entries.iter().all(LogRecord::is_commit_marker) {
            // Nothing mutated since the last checkpoint; writing another
            // would inflate the chain on repeated no-op commits.
            return Ok(cur_cid);
        }

        let cid = cur_cid + 1;
        let (rows, cols) = guard.shape();
        let checkpoint = Checkpoint {
            cid,
            timestamp: chrono::Utc::now().timestamp_millis(),
            rows: rows as u64,
            columns: cols as u64,
            content: guard.to_content(),
        };

        // Mandatory ordering: checkpoint create, log seal, next-log create.
        // A crash between any pair leaves a state `check` can repair.
        let chkp_path = self.checkpoint_path(fid, cid);
        self.dfs.create(&chkp_path, 0)?;
        self.dfs.overwrite_all(&chkp_path, &json::serialize(&checkpoint)?)?;

        let marker = json::serialize_line(&LogRecord::commit_marker())?;
        self.dfs.append(&self.log_path(fid, lid), &marker)?;

        self.dfs.create(&self.log_path(fid, lid + 1), 0)?;

        tracing::debug!(fid, cid, "committed sheet");
        Ok(cid)
    }

    /// Number of checkpoints on disk. The latest numeric filename must match
    /// the listing length; a discrepancy is a consistency violation.
    pub fn checkpoint_count(&self, fid: u64) -> Result<u64> {
        let names = self.dfs.list_sorted(&self.checkpoint_root(fid))?;
        let mut latest = 0u64;
        for name in &names {
            let n = name
                .parse::<u64>()
                .ok()
                .filter(|n| n.to_string() == *name)
                .ok_or_else(|| {
                    Error::Unrecoverable(format!("document {fid}: bad checkpoint name {name:?}"))
                })?;
            latest = latest.max(n);
        }
        if latest != names.len() as u64 {
            return errunrecoverable!(
                "document {fid}: latest checkpoint {latest} does not match {} checkpoint files",
                names.len()
            );
        }
        Ok(latest)
    }

    /// Returns the resident sheet for `fid`, updating recency.
    pub fn lookup(&self, fid: u64) -> Result<Option<SharedSheet>> {
        Ok(self.cache.lock()?.get(&fid))
    }

    /// Removes the resident sheet for `fid` without committing it.
    pub fn remove_resident(&self, fid: u64) -> Result<Option<SharedSheet>> {
        Ok(self.cache.lock()?.remove(&fid))
    }

    fn document_root(&self, fid: u64) -> PathBuf {
        self.config.dir.join("sheet").join(fid.to_string())
    }

    fn checkpoint_root(&self, fid: u64) -> PathBuf {
        self.document_root(fid).join("checkpoint")
    }

    fn log_root(&self, fid: u64) -> PathBuf {
        self.document_root(fid).join("log")
    }

    fn checkpoint_path(&self, fid: u64, cid: u64) -> PathBuf {
        self.checkpoint_root(fid).join(cid.to_string())
    }

    fn log_path(&self, fid: u64, lid: u64) -> PathBuf {
        self.log_root(fid).join(lid.to_string())
    }

    fn read_log(&self, fid: u64, lid: u64) -> Result<Vec<LogRecord>> {
        let bytes = self.dfs.read_all(&self.log_path(fid, lid))?;
        json::deserialize_lines(&bytes)
    }

    fn read_checkpoint(&self, fid: u64, cid: u64) -> Result<Checkpoint> {
        let bytes = self.dfs.read_all(&self.checkpoint_path(fid, cid))?;
        json::deserialize(&bytes)
    }
}
