//! Membership table of known and candidate peer stations.
//!
//! Grounded on `lib/stationlist.hh`/`stationlist.cc`'s `StationItem` and
//! `StationList`. The Qt model/view base class and its row-change signals
//! are dropped; the candidate-drain-then-random-refresh tick and the
//! known/candidate set invariants are kept exactly.

use crate::geo::Geo;
use crate::identifier::Identifier;
use crate::overlay::NodeAddr;
use crate::publisher::Publisher;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Cadence of `tick`'s candidate-drain / known-refresh cycle, matching the
/// original's `_networkUpdateTimer` (10 minutes).
pub const NETWORK_UPDATE_INTERVAL_SECS: u64 = 600;

#[derive(Clone, Debug)]
pub struct StationItem {
    last_seen: DateTime<Utc>,
    node: NodeAddr,
    location: Geo,
    description: String,
}

impl StationItem {
    pub fn new(node: NodeAddr, location: Geo, description: impl Into<String>) -> Self {
        StationItem {
            last_seen: Utc::now(),
            node,
            location,
            description: description.into(),
        }
    }

    /// An item is null iff its node carries the all-zero identifier —
    /// mirrors `StationItem::isNull`'s `_node.id().isEmpty()` check.
    pub fn is_null(&self) -> bool {
        !self.node.id.is_valid()
    }

    pub fn id(&self) -> Identifier {
        self.node.id
    }

    pub fn node(&self) -> &NodeAddr {
        &self.node
    }

    pub fn location(&self) -> &Geo {
        &self.location
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Refreshes the node's address and timestamp after a successful
    /// contact, mirrors `StationItem::update`.
    pub fn refresh(&mut self, node: NodeAddr, now: DateTime<Utc>) {
        self.node = node;
        self.last_seen = now;
    }
}

pub struct StationRegistry {
    self_id: Identifier,
    known: Vec<StationItem>,
    candidates: HashSet<Identifier>,
    pub station_updated: Publisher<Identifier>,
}

impl StationRegistry {
    pub fn new(self_id: Identifier) -> Self {
        StationRegistry {
            self_id,
            known: Vec::new(),
            candidates: HashSet::new(),
            station_updated: Publisher::new(),
        }
    }

    pub fn num_known(&self) -> usize {
        self.known.len()
    }

    pub fn has_station(&self, id: &Identifier) -> bool {
        self.known.iter().any(|s| s.id() == *id)
    }

    pub fn station(&self, id: &Identifier) -> Option<&StationItem> {
        self.known.iter().find(|s| s.id() == *id)
    }

    pub fn known(&self) -> &[StationItem] {
        &self.known
    }

    pub fn candidates(&self) -> &HashSet<Identifier> {
        &self.candidates
    }

    /// Adds `id` as a contact candidate, unless it is already known or is
    /// the station's own id. Mirrors `StationList::addCandidate`.
    pub fn add_candidate(&mut self, id: Identifier) {
        if id != self.self_id && !self.has_station(&id) {
            self.candidates.insert(id);
        }
    }

    /// Bulk variant, mirrors `StationList::addToCandidates`.
    pub fn add_candidates(&mut self, ids: impl IntoIterator<Item = Identifier>) {
        for id in ids {
            self.add_candidate(id);
        }
    }

    /// Records a station info response from a peer. A null item (failed
    /// lookup) is ignored. An existing entry is updated in place; a new one
    /// is moved out of `candidates` and appended. Mirrors
    /// `StationList::updateStation`.
    pub fn update(&mut self, item: StationItem) {
        if item.is_null() {
            return;
        }
        let id = item.id();
        if let Some(existing) = self.known.iter_mut().find(|s| s.id() == id) {
            *existing = item;
        } else {
            self.candidates.remove(&id);
            self.known.push(item);
        }
        self.station_updated.publish(id);
    }

    /// One step of the network-maintenance cycle: drain a pending
    /// candidate to contact, or — once the candidate queue is empty — pick
    /// a random known station to refresh and request its peer list.
    /// Returns the id to contact (a candidate) and, if the drain was
    /// empty, an additional id whose own peer list should be queried.
    /// Mirrors `StationList::_onUpdateNetwork`.
    pub fn tick(&mut self) -> RegistryTickAction {
        if let Some(&id) = self.candidates.iter().next() {
            self.candidates.remove(&id);
            return RegistryTickAction::ContactCandidate(id);
        }
        if self.known.is_empty() {
            return RegistryTickAction::Idle;
        }
        let idx = (rand::random::<u32>() as usize) % self.known.len();
        let id = self.known[idx].id();
        RegistryTickAction::RefreshKnown(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryTickAction {
    ContactCandidate(Identifier),
    RefreshKnown(Identifier),
    Idle,
}
