use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::Error;

/// Serialize a record as a single JSON object.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Serialize a record as one newline-terminated JSON line.
pub fn serialize_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a record from a JSON object.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Deserialize every record in a line-delimited JSON buffer, in append
/// order. Empty lines are skipped; any malformed line fails the whole
/// decode.
pub fn deserialize_lines<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::InvalidData(format!("log is not valid utf-8: {e}")))?;

    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|e| Error::InvalidData(format!("bad record on line {}: {e}", i + 1)))?;
        records.push(record);
    }
    Ok(records)
}
