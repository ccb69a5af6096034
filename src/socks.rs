//! Allowlist gate for the SOCKS egress service.
//!
//! The actual proxying (`SocksOutStream`, `SecureSocket`) is owned by the
//! overlay library and out of scope here (spec §1); this crate's slice is
//! the policy decision `allowConnection` makes, grounded on
//! `lib/socksservice.cc`: load a whitelist of peer identifiers from a JSON
//! array, and answer `true` only for a peer whose id is in that set. A
//! missing, unparsable, or non-array whitelist file degrades to an empty
//! allowlist (deny everything) rather than an error, mirroring the
//! original's behavior of logging and proceeding with `_whitelist` empty.

use crate::identifier::Identifier;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

pub struct SocksEgress {
    whitelist: HashSet<Identifier>,
}

impl SocksEgress {
    pub fn load(path: &Path) -> Self {
        let whitelist = Self::read_whitelist(path);
        SocksEgress { whitelist }
    }

    fn read_whitelist(path: &Path) -> HashSet<Identifier> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open SOCKS whitelist");
                return HashSet::new();
            }
        };
        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot parse SOCKS whitelist");
                return HashSet::new();
            }
        };
        let Some(items) = value.as_array() else {
            warn!(path = %path.display(), "SOCKS whitelist is not a JSON array");
            return HashSet::new();
        };
        items
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| Identifier::from_base32(s).ok())
            .collect()
    }

    pub fn allow(&self, peer_id: &Identifier) -> bool {
        self.whitelist.contains(peer_id)
    }

    pub fn len(&self) -> usize {
        self.whitelist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty()
    }
}
