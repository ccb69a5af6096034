//! Bootstrap node list: the fixed set of `(host, port)` pairs a fresh
//! station tries first before the overlay's own discovery takes over.
//!
//! Grounded verbatim on `lib/bootstraplist.cc`'s `fromFile`/`add`: a
//! missing or unparsable file yields an empty list rather than an error,
//! entries missing `host` or `port` are skipped individually instead of
//! failing the whole load, and `append` is read-modify-write over the same
//! file.

use std::path::Path;
use tracing::warn;

#[derive(serde::Serialize, serde::Deserialize)]
struct BootstrapEntry {
    host: String,
    port: u16,
}

/// Reads the bootstrap list from `path`. Missing file, unparsable JSON, a
/// non-array document, or a malformed entry are all tolerated: the caller
/// gets whatever valid entries could be recovered, never an error.
pub fn load(path: &Path) -> Vec<(String, u16)> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open bootstrap node list");
            return Vec::new();
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot parse bootstrap node list");
            return Vec::new();
        }
    };

    let Some(items) = value.as_array() else {
        warn!(path = %path.display(), "bootstrap node list is not a JSON array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<BootstrapEntry>(item.clone()).ok())
        .map(|entry| (entry.host, entry.port))
        .collect()
}

/// Appends `(host, port)` to the bootstrap list at `path`, rewriting the
/// whole file. Mirrors `BootstrapList::add`.
pub fn append(path: &Path, host: &str, port: u16) -> std::io::Result<()> {
    let mut entries = load(path);
    entries.push((host.to_string(), port));
    let json: Vec<BootstrapEntry> = entries
        .into_iter()
        .map(|(host, port)| BootstrapEntry { host, port })
        .collect();
    std::fs::write(path, serde_json::to_vec(&json)?)
}
