//! Consistency check of a document's on-disk state.
//!
//! The brief mode runs on clean startup of a document previously owned by
//! this process and only verifies that the active log is sealed. The
//! thorough mode runs when the previous owner crashed and proves every
//! historical file well-formed, because a live owner could have been
//! mid-append at the crash moment.
//!
//! All repairs are explicit: sealing a trailing unterminated log, and
//! creating the missing next log after an interrupted commit. Everything
//! else is `Error::Unrecoverable`.

use crate::error::Result;
use crate::errunrecoverable;
use crate::Error;

use super::record::LogRecord;
use super::SheetStore;

impl SheetStore {
    /// Checks the consistency of the document's on-disk state and makes
    /// best efforts to recover it. Returns the current `(C, L)` counts on
    /// success.
    ///
    /// Both modes verify dense numbering of both directories and the
    /// checkpoint-log invariant `L = C + 1`, allowing the single transient
    /// `L = C` left by a commit that crashed after writing its checkpoint;
    /// that state is repaired by sealing `log/L` and creating `log/L+1`.
    pub fn check(&self, fid: u64, thorough: bool) -> Result<(u64, u64)> {
        let log_names = self.dfs.list_sorted(&self.log_root(fid))?;
        let chkp_names = self.dfs.list_sorted(&self.checkpoint_root(fid))?;

        let mut l = verify_dense(fid, &log_names, "log")?;
        let c = verify_dense(fid, &chkp_names, "checkpoint")?;

        if l != c + 1 && l != c {
            return errunrecoverable!(
                "document {fid}: {l} log files vs {c} checkpoints breaks L = C + 1"
            );
        }

        if thorough {
            for k in 1..=l {
                self.check_log_thorough(fid, k, l)?;
            }
            for k in 1..=c {
                self.check_checkpoint_thorough(fid, k)?;
            }
        } else if l >= 1 {
            self.check_active_log_brief(fid, l)?;
        }

        if l == c {
            // checkpoint/C was written but the commit died before creating
            // the next active log; restore L = C + 1.
            self.dfs.create(&self.log_path(fid, l + 1), 0)?;
            tracing::warn!(
                fid,
                lid = l + 1,
                "created missing active log after interrupted commit"
            );
            l += 1;
        }

        Ok((c, l))
    }

    /// Thorough validation of `log/k`: it must decode, every mutation entry
    /// must carry `lid = k` and 1-based coordinates, and it must be sealed
    /// unless it is the last log, which is sealed in place.
    fn check_log_thorough(&self, fid: u64, k: u64, last: u64) -> Result<()> {
        let entries = self.read_log(fid, k).map_err(|e| match e {
            Error::InvalidData(msg) => {
                Error::Unrecoverable(format!("document {fid}: log {k} is invalid: {msg}"))
            }
            other => other,
        })?;

        for entry in entries.iter().filter(|e| !e.is_commit_marker()) {
            if !entry.is_valid_mutation(k) {
                return errunrecoverable!(
                    "document {fid}: log {k} holds invalid mutation (lid {}, row {}, col {})",
                    entry.lid,
                    entry.row,
                    entry.col
                );
            }
        }

        let sealed = entries.last().is_some_and(LogRecord::is_commit_marker);
        if !sealed {
            if k == last {
                self.seal_log(fid, k)?;
            } else {
                return errunrecoverable!("document {fid}: middle log {k} is not sealed");
            }
        }
        Ok(())
    }

    /// Brief validation: the active log must decode and end with the commit
    /// marker; an unterminated active log is sealed in place (it is allowed
    /// to be unterminated only while a session owns it).
    fn check_active_log_brief(&self, fid: u64, last: u64) -> Result<()> {
        let entries = self.read_log(fid, last).map_err(|e| match e {
            Error::InvalidData(msg) => {
                Error::Unrecoverable(format!("document {fid}: log {last} is invalid: {msg}"))
            }
            other => other,
        })?;

        if !entries.last().is_some_and(LogRecord::is_commit_marker) {
            self.seal_log(fid, last)?;
        }
        Ok(())
    }

    /// Thorough validation of `checkpoint/k`: it must decode, carry
    /// `cid = k`, and have a coherent positive shape.
    fn check_checkpoint_thorough(&self, fid: u64, k: u64) -> Result<()> {
        let chkp = self.read_checkpoint(fid, k).map_err(|e| match e {
            Error::InvalidData(msg) => {
                Error::Unrecoverable(format!("document {fid}: checkpoint {k} is invalid: {msg}"))
            }
            other => other,
        })?;

        if chkp.cid != k || !chkp.is_well_formed() {
            return errunrecoverable!(
                "document {fid}: checkpoint {k} is invalid (cid {}, {}x{}, {} cells)",
                chkp.cid,
                chkp.rows,
                chkp.columns,
                chkp.content.len()
            );
        }
        Ok(())
    }

    fn seal_log(&self, fid: u64, lid: u64) -> Result<()> {
        let marker = crate::encoding::json::serialize_line(&LogRecord::commit_marker())?;
        self.dfs.append(&self.log_path(fid, lid), &marker)?;
        tracing::warn!(fid, lid, "sealed unterminated log with a commit marker");
        Ok(())
    }
}

/// Verifies that the listed names form the dense set `{"1", ..., "N"}` and
/// returns `N`. Names are compared numerically; the listing itself is
/// lexicographic.
fn verify_dense(fid: u64, names: &[String], kind: &str) -> Result<u64> {
    let mut numbers = Vec::with_capacity(names.len());
    for name in names {
        // Names must be exactly the unpadded decimal, so "01" or "+1" are
        // rejected even though they parse.
        let n = name
            .parse::<u64>()
            .ok()
            .filter(|n| n.to_string() == *name)
            .ok_or_else(|| {
                Error::Unrecoverable(format!("document {fid}: bad {kind} file name {name:?}"))
            })?;
        numbers.push(n);
    }
    numbers.sort_unstable();
    for (i, n) in numbers.iter().enumerate() {
        if *n != i as u64 + 1 {
            return errunrecoverable!(
                "document {fid}: hole in {kind} files, expected {} found {n}",
                i + 1
            );
        }
    }
    Ok(numbers.len() as u64)
}
