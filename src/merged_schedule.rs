//! The scheduler core: the local schedule plus a budget-admitted subset of
//! remote events. Grounded on `lib/schedule.hh`'s `MergedSchedule`, which
//! composes `LocalSchedule` and `RemoteSchedule` by reference rather than by
//! base class (spec §9).

use crate::publisher::Publisher;
use crate::remote_schedule::RemoteSchedule;
use crate::schedule::{LocalSchedule, ScheduleView, ScheduledEvent};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Default per-station cost budget: one daily-event equivalent.
pub const DEFAULT_MAX_COST: f64 = 28.0;

pub struct MergedSchedule {
    local: LocalSchedule,
    remote: RemoteSchedule,
    max_cost: f64,
    admitted_remote: Vec<ScheduledEvent>,
    next_event: Option<DateTime<Utc>>,
    pub start_recording: Publisher<ChronoDuration>,
}

impl MergedSchedule {
    pub fn new(local: LocalSchedule, max_cost: f64) -> Self {
        let mut merged = MergedSchedule {
            local,
            remote: RemoteSchedule::new(),
            max_cost,
            admitted_remote: Vec::new(),
            next_event: None,
            start_recording: Publisher::new(),
        };
        merged.recompute(Utc::now());
        merged
    }

    pub fn local(&self) -> &LocalSchedule {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut LocalSchedule {
        &mut self.local
    }

    pub fn remote(&self) -> &RemoteSchedule {
        &self.remote
    }

    /// Adds a peer's event to the remote aggregator and recomputes
    /// admission; called whenever a `/schedule` query result arrives.
    pub fn add_remote(&mut self, peer_id: crate::identifier::Identifier, event: ScheduledEvent) {
        self.remote.add(peer_id, event);
        self.recompute(Utc::now());
    }

    /// Recomputes which remote events are admitted under the cost budget.
    /// Invoked whenever either input changes or time advances a day
    /// boundary. This is the admission algorithm from spec §4.6:
    ///
    /// 1. `remaining = max_cost - sum(local.cost)`.
    /// 2. If `remaining <= 0`, admit nothing.
    /// 3. Filter candidates: drop already-local, drop passed, drop
    ///    `cost > remaining`.
    /// 4. Sort stably by `weight = cost / origins` ascending.
    /// 5. Greedily admit while `remaining >= event.cost`.
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        let local_cost: u32 = (0..self.local.num_events())
            .filter_map(|i| self.local.event_at(i))
            .map(|e| e.cost())
            .sum();
        let mut remaining = self.max_cost - local_cost as f64;

        self.admitted_remote.clear();
        if remaining > 0.0 {
            let mut candidates: Vec<(f64, ScheduledEvent)> = self
                .remote
                .entries()
                .iter()
                .filter(|entry| {
                    let evt = entry.event();
                    !self.local.contains(&evt) && !evt.passed(now) && (evt.cost() as f64) <= remaining
                })
                .map(|entry| {
                    let weight = entry.event().cost() as f64 / entry.num_origins().max(1) as f64;
                    (weight, entry.event())
                })
                .collect();

            candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

            for (_, evt) in candidates {
                if remaining >= evt.cost() as f64 {
                    remaining -= evt.cost() as f64;
                    self.admitted_remote.push(evt);
                }
            }
        }

        self.next_event = ScheduleView::next(self, now);
    }

    /// Invoked at sub-second cadence by the station's loop, same contract
    /// as `LocalSchedule::tick`: fires `start_recording` once the memoized
    /// next event is due, then recomputes.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(next) = self.next_event {
            if next <= now {
                self.start_recording
                    .publish(ChronoDuration::minutes(crate::schedule::DEFAULT_RECORDING_MINUTES));
                self.recompute(now);
            }
        }
    }
}

impl ScheduleView for MergedSchedule {
    fn num_events(&self) -> usize {
        self.local.num_events() + self.admitted_remote.len()
    }

    fn event_at(&self, idx: usize) -> Option<ScheduledEvent> {
        let local_count = self.local.num_events();
        if idx < local_count {
            self.local.event_at(idx)
        } else {
            self.admitted_remote.get(idx - local_count).copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::hash_bytes;
    use chrono::TimeZone;

    fn peer(n: u8) -> crate::identifier::Identifier {
        hash_bytes(&[n])
    }

    fn fresh_local(dir: &tempfile::TempDir) -> LocalSchedule {
        LocalSchedule::load(dir.path().join("schedule.json"))
    }

    #[test]
    fn merge_admission_scenario_one_admits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = fresh_local(&dir);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        local.add(ScheduledEvent::daily(now)); // cost 28
        let mut merged = MergedSchedule::new(local, 28.0);

        let weekly = ScheduledEvent::weekly(now + ChronoDuration::days(10));
        let single = ScheduledEvent::single(now + ChronoDuration::days(10));
        for p in 0..3u8 {
            merged.add_remote(peer(p), weekly);
        }
        for p in 10..15u8 {
            merged.add_remote(peer(p), single);
        }
        merged.recompute(now);

        assert_eq!(merged.num_events(), 1); // only the local Daily
    }

    #[test]
    fn merge_admission_scenario_two_matches_worked_example() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = fresh_local(&dir);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let future = now + ChronoDuration::days(10);
        local.add(ScheduledEvent::single(future));
        local.add(ScheduledEvent::single(future + ChronoDuration::seconds(1)));
        let mut merged = MergedSchedule::new(local, 28.0);

        // Weekly, 2 peers -> weight 2
        let weekly_a = ScheduledEvent::weekly(future);
        merged.add_remote(peer(1), weekly_a);
        merged.add_remote(peer(2), weekly_a);

        // Weekly, 1 peer -> weight 4
        let weekly_b = ScheduledEvent::weekly(future + ChronoDuration::seconds(2));
        merged.add_remote(peer(3), weekly_b);

        // Daily, 10 peers -> weight 2.8
        let daily = ScheduledEvent::daily(future + ChronoDuration::seconds(3));
        for p in 20..30u8 {
            merged.add_remote(peer(p), daily);
        }

        merged.recompute(now);

        let admitted: Vec<ScheduledEvent> = (0..merged.num_events())
            .filter_map(|i| merged.event_at(i))
            .filter(|e| e.event_type() == crate::schedule::EventType::Weekly)
            .collect();
        assert_eq!(admitted.len(), 2);
        let total_remote_cost: u32 = admitted.iter().map(|e| e.cost()).sum();
        assert_eq!(total_remote_cost, 8); // two Weekly events (cost 4 each)

        let daily_admitted = (0..merged.num_events())
            .filter_map(|i| merged.event_at(i))
            .any(|e| e.event_type() == crate::schedule::EventType::Daily && e == daily);
        assert!(!daily_admitted, "the expensive Daily candidate must be skipped");
    }

    #[test]
    fn budget_invariant_never_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = fresh_local(&dir);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        local.add(ScheduledEvent::single(now + ChronoDuration::days(1)));
        let mut merged = MergedSchedule::new(local, 28.0);
        let future = now + ChronoDuration::days(1);
        for p in 0..50u8 {
            merged.add_remote(peer(p), ScheduledEvent::daily(future + ChronoDuration::seconds(p as i64)));
        }
        merged.recompute(now);

        let total: u32 = (0..merged.num_events())
            .filter_map(|i| merged.event_at(i))
            .map(|e| e.cost())
            .sum();
        assert!((total as f64) <= 28.0);
    }

    #[test]
    fn no_admitted_remote_event_is_passed_or_equal_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = fresh_local(&dir);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let local_evt = ScheduledEvent::single(now + ChronoDuration::days(1));
        local.add(local_evt);
        let mut merged = MergedSchedule::new(local, 28.0);

        merged.add_remote(peer(1), local_evt); // same as local: must never be admitted
        let passed_evt = ScheduledEvent::single(now - ChronoDuration::days(1));
        merged.add_remote(peer(2), passed_evt);
        merged.recompute(now);

        for i in 0..merged.num_events() {
            let evt = merged.event_at(i).unwrap();
            assert!(!evt.passed(now));
        }
        // the local event must appear exactly once, not duplicated via remote admission
        let local_matches = (0..merged.num_events())
            .filter_map(|i| merged.event_at(i))
            .filter(|e| *e == local_evt)
            .count();
        assert_eq!(local_matches, 1);
    }
}
