//! Serialization of on-disk records.
//!
//! Checkpoint files hold a single JSON object; log files hold one JSON
//! object per line. The line framing is self-delimited, so appending a new
//! entry never rewrites earlier bytes. This encoding is the compatibility
//! contract with existing on-disk data.
//!
//! The codec performs no I/O and no logging.

pub mod json;
