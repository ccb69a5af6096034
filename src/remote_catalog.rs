//! Aggregates dataset catalogs advertised by peer stations into a single
//! `dataset id -> advertising peers` index, used to pick a source when a
//! download is requested.
//!
//! The original defines this as `RemoteDataSetList`, a `QAbstractTableModel`
//! over `RemoteDataSet` entries (`lib/datasetfile.cc`), subscribed to
//! `stationUpdated` the same way this crate's `station_updated` publisher
//! drives [`ingest`](RemoteCatalog::ingest). `RemoteDataSet` itself carries
//! a timestamp, sample count/rate, a per-timeseries location list, and the
//! advertising-peer set; the table model exists only to expose those fields
//! to a Qt view (`datetime`, `samples`, `numTimeseries`, `numRemotes`
//! columns), which this headless station has no counterpart for. This
//! module keeps the part the core queries actually need — advertiser set
//! plus the raw last-seen metadata per dataset — the same flattening
//! [`RemoteSchedule`](crate::remote_schedule::RemoteSchedule) applies to
//! per-peer schedules, applied here to catalog entries gathered through
//! [`crate::query::dataset_catalog`].

use crate::identifier::Identifier;
use std::collections::{HashMap, HashSet};

pub struct RemoteCatalog {
    /// dataset id -> (peers advertising it, metadata last seen from any of them)
    entries: HashMap<Identifier, (HashSet<Identifier>, serde_json::Value)>,
}

impl Default for RemoteCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteCatalog {
    pub fn new() -> Self {
        RemoteCatalog {
            entries: HashMap::new(),
        }
    }

    /// Merges one peer's advertised catalog (as returned by
    /// [`crate::query::dataset_catalog`]) into the aggregate index.
    pub fn ingest(&mut self, peer_id: Identifier, catalog: HashMap<Identifier, serde_json::Value>) {
        for (dataset_id, metadata) in catalog {
            let entry = self
                .entries
                .entry(dataset_id)
                .or_insert_with(|| (HashSet::new(), metadata.clone()));
            entry.0.insert(peer_id);
            entry.1 = metadata;
        }
    }

    /// Drops `peer_id` from every dataset's advertiser set, pruning entries
    /// that no longer have any advertiser. Called when a station is
    /// recognized as gone so stale routes are not offered.
    pub fn forget_peer(&mut self, peer_id: &Identifier) {
        self.entries.retain(|_, (peers, _)| {
            peers.remove(peer_id);
            !peers.is_empty()
        });
    }

    pub fn peers_for(&self, dataset_id: &Identifier) -> Option<&HashSet<Identifier>> {
        self.entries.get(dataset_id).map(|(peers, _)| peers)
    }

    pub fn metadata_for(&self, dataset_id: &Identifier) -> Option<&serde_json::Value> {
        self.entries.get(dataset_id).map(|(_, metadata)| metadata)
    }

    /// Picks an arbitrary advertiser for `dataset_id`; used by the download
    /// path when the caller has no source preference.
    pub fn any_peer_for(&self, dataset_id: &Identifier) -> Option<Identifier> {
        self.peers_for(dataset_id).and_then(|peers| peers.iter().next().copied())
    }

    pub fn num_datasets(&self) -> usize {
        self.entries.len()
    }
}
