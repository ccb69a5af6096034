//! Content-addressed directory of dataset files.
//!
//! Grounded on the original `lib/datasetfile.cc`'s `DataSetDir` (a
//! `QAbstractTableModel`-backed directory scan), re-expressed as a plain
//! struct over an in-memory index — there is no GUI model base class here,
//! just `insert`/`contains`/`get`/`reload`/`catalog_json`.

use crate::dataset_file::DatasetFile;
use crate::error::Error;
use crate::identifier::{hash_bytes, Identifier};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct DatasetStore {
    dir: PathBuf,
    index: HashMap<Identifier, DatasetFile>,
}

impl DatasetStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut store = DatasetStore {
            dir,
            index: HashMap::new(),
        };
        store.reload();
        Ok(store)
    }

    /// Enumerates the directory, parsing each file's header. Files that fail
    /// validation are skipped with a warning rather than aborting the scan.
    pub fn reload(&mut self) {
        self.index.clear();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, dir = %self.dir.display(), "dataset store directory unreadable");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(claimed_id) = Identifier::from_base32(name) else {
                warn!(file = name, "skipping file whose name is not a valid identifier");
                continue;
            };
            match DatasetFile::load(&path) {
                Ok(file) => {
                    self.index.insert(claimed_id, file);
                }
                Err(e) => {
                    warn!(file = name, error = %e, "skipping invalid dataset file on reload");
                }
            }
        }
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &Identifier) -> Option<&DatasetFile> {
        self.index.get(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Atomically moves `bytes` into the store under `base32(hash(bytes))`.
    /// Rejects the insert if the recomputed hash does not match `claimed_id`
    /// (a download that failed its hash check never reaches this far, but
    /// the check is repeated here so `insert` alone is a safe boundary).
    pub fn insert(&mut self, claimed_id: Identifier, bytes: &[u8]) -> Result<Identifier, Error> {
        let actual_id = hash_bytes(bytes);
        if actual_id != claimed_id {
            return Err(Error::InvalidFormat(format!(
                "claimed id {claimed_id} does not match content hash {actual_id}"
            )));
        }
        self.insert_trusted(bytes)
    }

    /// Like [`insert`] but computes the id from content instead of checking
    /// a caller-supplied claim; used by the Receiver pipeline, which always
    /// seals its own recordings and has no external claim to verify against.
    pub fn insert_trusted(&mut self, bytes: &[u8]) -> Result<Identifier, Error> {
        let id = hash_bytes(bytes);
        let final_path = self.dir.join(id.to_base32());
        if !final_path.exists() {
            let tmp_path = self.dir.join(format!(".{}.tmp", id.to_base32()));
            std::fs::write(&tmp_path, bytes)?;
            std::fs::rename(&tmp_path, &final_path)?;
        }
        let file = DatasetFile::load(&final_path)?;
        self.index.insert(id, file);
        Ok(id)
    }

    pub fn catalog_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .index
            .iter()
            .map(|(id, file)| (id.to_base32(), file.metadata_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
