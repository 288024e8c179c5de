//! Collaborator-facing surface of the persistence core.
//!
//! The WebSocket transport and the operational-transform merge logic live
//! upstream; they deliver ordered cell-mutation events per `(uid, fid)` and
//! connection lifecycle notifications, which this module turns into sheet
//! mutations, log appends, commits, and cache traffic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::encoding::json;
use crate::error::Result;
use crate::errinput;
use crate::sheet::record::LogRecord;
use crate::sheet::{SharedSheet, SheetStore};

/// An authenticated collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: u64,
    pub username: String,
}

/// Resolves a session token to a user identity before any document id is
/// handed to this core.
pub trait Authenticator: Send + Sync {
    fn resolve(&self, token: &str) -> Result<User>;
}

/// A single cell edit delivered by the session layer, already merged by the
/// upstream operational-transform logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    pub row: i64,
    pub col: i64,
    pub old: String,
    pub new: String,
}

/// Session-layer bridge: presence bookkeeping per document, plus the
/// connection and message hooks the transport calls into.
pub struct SheetSession {
    store: Arc<SheetStore>,
    auth: Arc<dyn Authenticator>,
    /// fid -> connected uids
    users: Mutex<HashMap<u64, HashSet<u64>>>,
    /// Documents whose on-disk state was already checked by this process.
    checked: Mutex<HashSet<u64>>,
}

impl SheetSession {
    pub fn new(store: Arc<SheetStore>, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            store,
            auth,
            users: Mutex::new(HashMap::new()),
            checked: Mutex::new(HashSet::new()),
        }
    }

    /// Authentication bridge, called before the connection is upgraded.
    /// Refuses the session when the token does not resolve or when the
    /// document's on-disk state cannot be recovered; all other sessions
    /// proceed.
    pub fn on_conn_established(&self, token: &str, fid: u64) -> Result<User> {
        let user = self.auth.resolve(token)?;
        self.ensure_resident(fid)?;
        Ok(user)
    }

    /// A user joined the document: make its sheet resident and register the
    /// user's presence.
    pub fn on_conn(&self, uid: u64, fid: u64) -> Result<()> {
        self.ensure_resident(fid)?;
        self.users.lock()?.entry(fid).or_default().insert(uid);
        tracing::debug!(uid, fid, "user connected");
        Ok(())
    }

    /// A user left the document. When the last user leaves, the sheet is
    /// committed and dropped from the cache; commit failures are logged and
    /// repaired on the document's next open.
    pub fn on_disconn(&self, uid: u64, fid: u64) -> Result<()> {
        let last = {
            let mut users = self.users.lock()?;
            match users.get_mut(&fid) {
                Some(present) => {
                    present.remove(&uid);
                    let empty = present.is_empty();
                    if empty {
                        users.remove(&fid);
                    }
                    empty
                }
                None => true,
            }
        };
        tracing::debug!(uid, fid, last, "user disconnected");

        if last {
            if let Some(sheet) = self.store.lookup(fid)? {
                if let Err(e) = self.store.commit(fid, &sheet) {
                    tracing::error!(fid, error = %e, "commit on last disconnect failed");
                }
            }
            self.store.remove_resident(fid)?;
        }
        Ok(())
    }

    /// Applies one cell edit: decode the payload, mutate the in-memory
    /// sheet, and record the log entry with `lid = C + 1`, all under the
    /// sheet's exclusion lock.
    pub fn on_message(&self, uid: u64, fid: u64, payload: &[u8]) -> Result<()> {
        let edit: CellEdit = json::deserialize(payload)?;
        if edit.row < 1 || edit.col < 1 {
            return errinput!(
                "cell coordinates are 1-based, got ({}, {})",
                edit.row,
                edit.col
            );
        }

        let sheet = self.ensure_resident(fid)?;
        {
            let mut guard = sheet.lock()?;
            let lid = self.store.checkpoint_count(fid)? + 1;
            guard.set(edit.row as usize, edit.col as usize, edit.new.clone())?;
            self.store.append_log(
                fid,
                lid,
                &LogRecord::mutation(lid, edit.row, edit.col, edit.old, edit.new),
            );
        }
        tracing::debug!(uid, fid, "applied cell edit");
        Ok(())
    }

    /// Returns the resident sheet for `fid`, recovering it from disk on a
    /// miss. The first access in this process runs the consistency check
    /// (brief, or thorough when configured for a crashed-owner takeover).
    fn ensure_resident(&self, fid: u64) -> Result<SharedSheet> {
        if let Some(sheet) = self.store.lookup(fid)? {
            return Ok(sheet);
        }

        // The gate stays locked across the check: its repairs create files
        // exclusively, so two first accesses racing the same document would
        // spuriously reject one of them. A document is marked checked only
        // once the check passes, so quarantined documents stay quarantined.
        {
            let mut checked = self.checked.lock()?;
            if !checked.contains(&fid) {
                self.store.check(fid, self.store.config().thorough_check)?;
                checked.insert(fid);
            }
        }

        let (sheet, _resident) = self.store.recover(fid)?;
        Ok(sheet)
    }
}
