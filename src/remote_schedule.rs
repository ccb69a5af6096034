//! Aggregates per-peer schedules into a single view of "which events are
//! advertised by which stations". Grounded on `lib/schedule.hh`'s
//! `RemoteScheduledEvent`/`RemoteSchedule`.

use crate::identifier::Identifier;
use crate::schedule::{ScheduleView, ScheduledEvent};
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct RemoteScheduledEvent {
    event: ScheduledEvent,
    origins: HashSet<Identifier>,
}

impl RemoteScheduledEvent {
    pub fn event(&self) -> ScheduledEvent {
        self.event
    }

    pub fn origins(&self) -> &HashSet<Identifier> {
        &self.origins
    }

    pub fn num_origins(&self) -> usize {
        self.origins.len()
    }
}

#[derive(Default)]
pub struct RemoteSchedule {
    events: Vec<RemoteScheduledEvent>,
}

impl RemoteSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `peer_id` into the origin set of a matching event, or
    /// appends a fresh `RemoteScheduledEvent` with a single origin.
    pub fn add(&mut self, peer_id: Identifier, event: ScheduledEvent) {
        if let Some(existing) = self.events.iter_mut().find(|e| e.event == event) {
            existing.origins.insert(peer_id);
            return;
        }
        let mut origins = HashSet::new();
        origins.insert(peer_id);
        self.events.push(RemoteScheduledEvent { event, origins });
    }

    pub fn num_origins(&self, idx: usize) -> usize {
        self.events.get(idx).map(|e| e.num_origins()).unwrap_or(0)
    }

    pub fn entries(&self) -> &[RemoteScheduledEvent] {
        &self.events
    }
}

impl ScheduleView for RemoteSchedule {
    fn num_events(&self) -> usize {
        self.events.len()
    }

    fn event_at(&self, idx: usize) -> Option<ScheduledEvent> {
        self.events.get(idx).map(|e| e.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::hash_bytes;
    use chrono::TimeZone;

    fn peer(n: u8) -> Identifier {
        hash_bytes(&[n])
    }

    #[test]
    fn identical_events_union_origins_instead_of_duplicating() {
        let mut remote = RemoteSchedule::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let evt = ScheduledEvent::weekly(t);
        remote.add(peer(1), evt);
        remote.add(peer(2), evt);
        assert_eq!(remote.num_events(), 1);
        assert_eq!(remote.num_origins(0), 2);
    }

    #[test]
    fn distinct_events_append_separately() {
        let mut remote = RemoteSchedule::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        remote.add(peer(1), ScheduledEvent::weekly(t));
        remote.add(peer(1), ScheduledEvent::daily(t));
        assert_eq!(remote.num_events(), 2);
    }
}
