//! On-disk record types for sheet persistence.
//!
//! A checkpoint file holds one [`Checkpoint`]; a log file holds a sequence
//! of [`LogRecord`]s, one per line. A sealed log ends with the commit
//! marker, the sentinel record with `row == -1 && col == -1`.

use serde::{Deserialize, Serialize};

/// Full snapshot of a document at the moment of a commit.
///
/// `cid` equals the integer filename the checkpoint lives under. `content`
/// is the row-major materialization of the grid, `rows * columns` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub cid: u64,
    /// Commit time, milliseconds since the epoch.
    pub timestamp: i64,
    pub rows: u64,
    pub columns: u64,
    pub content: Vec<String>,
}

impl Checkpoint {
    /// Whether the stored shape and content are coherent.
    pub fn is_well_formed(&self) -> bool {
        self.rows > 0
            && self.columns > 0
            && self
                .rows
                .checked_mul(self.columns)
                .is_some_and(|cells| self.content.len() as u64 == cells)
    }
}

/// A single log entry: either one cell mutation or the commit marker.
///
/// For a mutation, `lid` matches the containing log file's number and
/// `row`/`col` are 1-based cell coordinates. `old` is recorded for future
/// undo support and is never consulted during recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub lid: u64,
    pub row: i64,
    pub col: i64,
    pub old: String,
    pub new: String,
}

impl LogRecord {
    /// A cell mutation entry.
    pub fn mutation(lid: u64, row: i64, col: i64, old: String, new: String) -> Self {
        Self {
            lid,
            row,
            col,
            old,
            new,
        }
    }

    /// The sentinel entry terminating a sealed log. Fields other than
    /// `row`/`col` are at their zero values and ignored by readers.
    pub fn commit_marker() -> Self {
        Self {
            lid: 0,
            row: -1,
            col: -1,
            old: String::new(),
            new: String::new(),
        }
    }

    /// Whether this entry is the commit marker. Only `row` and `col`
    /// participate in the decision.
    pub fn is_commit_marker(&self) -> bool {
        self.row == -1 && self.col == -1
    }

    /// Whether a mutation entry is valid for the log file numbered `lid`.
    pub fn is_valid_mutation(&self, lid: u64) -> bool {
        self.lid == lid && self.row >= 1 && self.col >= 1
    }
}
