//! `ScheduledEvent` and the local, persisted schedule.
//!
//! Grounded on the original `lib/schedule.hh`/`schedule.cc`'s
//! `ScheduledEvent`/`Schedule`/`LocalSchedule`. The polymorphic
//! `Schedule` base class (spec §9) becomes the [`ScheduleView`] trait here;
//! `Merged` composes `LocalSchedule` and `RemoteSchedule` by reference
//! instead of inheriting from a common base.

use crate::error::Error;
use crate::publisher::Publisher;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Single,
    Daily,
    Weekly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    event_type: EventType,
    first: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct ScheduledEventJson {
    first: String,
    repeat: String,
}

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl ScheduledEvent {
    pub fn single(at: DateTime<Utc>) -> Self {
        ScheduledEvent {
            event_type: EventType::Single,
            first: at,
        }
    }

    pub fn daily(first: DateTime<Utc>) -> Self {
        ScheduledEvent {
            event_type: EventType::Daily,
            first,
        }
    }

    pub fn weekly(first: DateTime<Utc>) -> Self {
        ScheduledEvent {
            event_type: EventType::Weekly,
            first,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn first(&self) -> DateTime<Utc> {
        self.first
    }

    /// Single=1, Weekly=4, Daily=28 — a per-event proxy for weekly
    /// storage/capture load, used to bound remote-event admission.
    pub fn cost(&self) -> u32 {
        match self.event_type {
            EventType::Single => 1,
            EventType::Weekly => 4,
            EventType::Daily => 28,
        }
    }

    /// `true` iff this is a `Single` event whose instant is before `now`.
    pub fn passed(&self, now: DateTime<Utc>) -> bool {
        self.event_type == EventType::Single && self.first < now
    }

    /// The next instant at or after `now` consistent with this event, or
    /// `None` for a `Single` event that has already passed.
    pub fn next_event(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.event_type {
            EventType::Single => (now <= self.first).then_some(self.first),
            EventType::Daily => Some(next_daily(self.first, now)),
            EventType::Weekly => Some(next_weekly(self.first, now)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let repeat = match self.event_type {
            EventType::Single => "never",
            EventType::Daily => "daily",
            EventType::Weekly => "weekly",
        };
        serde_json::to_value(ScheduledEventJson {
            first: self.first.format(WIRE_FORMAT).to_string(),
            repeat: repeat.to_string(),
        })
        .expect("ScheduledEvent serializes infallibly")
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        let parsed: ScheduledEventJson = serde_json::from_value(value.clone())?;
        let first = DateTime::parse_from_str(&format!("{} +0000", parsed.first), "%Y-%m-%d %H:%M:%S %z")
            .map_err(|e| Error::InvalidFormat(format!("bad timestamp '{}': {e}", parsed.first)))?
            .with_timezone(&Utc);
        let event_type = match parsed.repeat.as_str() {
            "never" => EventType::Single,
            "daily" => EventType::Daily,
            "weekly" => EventType::Weekly,
            other => {
                return Err(Error::InvalidFormat(format!("unknown repeat kind '{other}'")))
            }
        };
        Ok(ScheduledEvent { event_type, first })
    }
}

fn next_daily(first: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let anchor_time = first.time();
    let today_candidate = now.date_naive().and_time(anchor_time).and_utc();
    if now.time() <= anchor_time {
        today_candidate
    } else {
        today_candidate + ChronoDuration::days(1)
    }
}

fn next_weekly(first: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let anchor_time = first.time();
    let anchor_weekday = first.weekday().num_days_from_monday() as i64;
    let now_weekday = now.weekday().num_days_from_monday() as i64;
    let days_ahead = (anchor_weekday - now_weekday).rem_euclid(7);

    let candidate_date = now.date_naive() + ChronoDuration::days(days_ahead);
    let candidate = candidate_date.and_time(anchor_time).and_utc();
    if candidate < now {
        candidate + ChronoDuration::weeks(1)
    } else {
        candidate
    }
}

/// Replaces the source's `Schedule` base class (spec §9). `Merged`
/// composes a `LocalSchedule` and a `RemoteSchedule` by reference rather
/// than inheriting from a shared base.
pub trait ScheduleView {
    fn num_events(&self) -> usize;
    fn event_at(&self, idx: usize) -> Option<ScheduledEvent>;
    fn contains(&self, event: &ScheduledEvent) -> bool {
        (0..self.num_events()).any(|i| self.event_at(i).as_ref() == Some(event))
    }
    fn next(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (0..self.num_events())
            .filter_map(|i| self.event_at(i).and_then(|e| e.next_event(now)))
            .min()
    }
    fn to_json(&self) -> serde_json::Value {
        let events: Vec<serde_json::Value> = (0..self.num_events())
            .filter_map(|i| self.event_at(i))
            .map(|e| e.to_json())
            .collect();
        serde_json::Value::Array(events)
    }
}

/// Default capture duration fired by `tick()`, in minutes.
pub const DEFAULT_RECORDING_MINUTES: i64 = 10;

pub struct LocalSchedule {
    path: PathBuf,
    events: Vec<ScheduledEvent>,
    next_event: Option<DateTime<Utc>>,
    pub start_recording: Publisher<ChronoDuration>,
}

impl LocalSchedule {
    /// Loads `path` if it exists (malformed entries are dropped with a
    /// warning; a well-formed empty array is a valid empty schedule); a
    /// missing file yields an empty schedule.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let events = load_events(&path);
        let mut schedule = LocalSchedule {
            path,
            events,
            next_event: None,
            start_recording: Publisher::new(),
        };
        schedule.recompute_next(Utc::now());
        schedule
    }

    pub fn add(&mut self, event: ScheduledEvent) -> usize {
        if let Some(idx) = self.events.iter().position(|e| e == &event) {
            return idx;
        }
        self.events.push(event);
        self.recompute_next(Utc::now());
        self.events.len() - 1
    }

    pub fn remove(&mut self, idx: usize) {
        if idx < self.events.len() {
            self.events.remove(idx);
            self.recompute_next(Utc::now());
        }
    }

    pub fn save(&self) -> Result<(), Error> {
        let json: Vec<serde_json::Value> = self.events.iter().map(|e| e.to_json()).collect();
        let bytes = serde_json::to_vec_pretty(&json)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn recompute_next(&mut self, now: DateTime<Utc>) {
        self.next_event = ScheduleView::next(self, now);
    }

    /// Invoked at sub-second cadence by the station's loop. If the
    /// memoized next event is due, fires `start_recording` exactly once
    /// and recomputes the memo.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(next) = self.next_event {
            if next <= now {
                self.start_recording
                    .publish(ChronoDuration::minutes(DEFAULT_RECORDING_MINUTES));
                self.recompute_next(now);
            }
        }
    }
}

impl ScheduleView for LocalSchedule {
    fn num_events(&self) -> usize {
        self.events.len()
    }

    fn event_at(&self, idx: usize) -> Option<ScheduledEvent> {
        self.events.get(idx).copied()
    }
}

fn load_events(path: &Path) -> Vec<ScheduledEvent> {
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    let Ok(serde_json::Value::Array(items)) = serde_json::from_slice::<serde_json::Value>(&bytes)
    else {
        warn!(path = %path.display(), "schedule.json is not a JSON array; treating as empty");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match ScheduledEvent::from_json(&item) {
            Ok(evt) => Some(evt),
            Err(e) => {
                warn!(error = %e, "dropping malformed schedule entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekly_rollover_scenario() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap(); // Monday
        let now = Utc.with_ymd_and_hms(2024, 1, 4, 15, 0, 0).unwrap(); // Thursday
        let evt = ScheduledEvent::weekly(first);
        let expected = Utc.with_ymd_and_hms(2024, 1, 8, 13, 0, 0).unwrap();
        assert_eq!(evt.next_event(now), Some(expected));
    }

    #[test]
    fn daily_same_day_scenario() {
        let first = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 5, 59, 0).unwrap();
        let evt = ScheduledEvent::daily(first);
        let expected = Utc.with_ymd_and_hms(2024, 6, 20, 6, 0, 0).unwrap();
        assert_eq!(evt.next_event(now), Some(expected));
    }

    #[test]
    fn event_at_exactly_now_returns_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(ScheduledEvent::single(now).next_event(now), Some(now));
        assert_eq!(ScheduledEvent::daily(now).next_event(now), Some(now));
        assert_eq!(ScheduledEvent::weekly(now).next_event(now), Some(now));
    }

    #[test]
    fn single_event_in_the_past_has_no_next_and_has_passed() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let evt = ScheduledEvent::single(first);
        assert_eq!(evt.next_event(now), None);
        assert!(evt.passed(now));
    }

    #[test]
    fn cost_matches_event_type() {
        let t = Utc::now();
        assert_eq!(ScheduledEvent::single(t).cost(), 1);
        assert_eq!(ScheduledEvent::weekly(t).cost(), 4);
        assert_eq!(ScheduledEvent::daily(t).cost(), 28);
    }

    #[test]
    fn json_round_trips() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        for evt in [
            ScheduledEvent::single(t),
            ScheduledEvent::daily(t),
            ScheduledEvent::weekly(t),
        ] {
            let json = evt.to_json();
            let parsed = ScheduledEvent::from_json(&json).unwrap();
            assert_eq!(evt, parsed);
        }
    }

    #[test]
    fn next_event_is_monotonic_in_now() {
        let first = Utc.with_ymd_and_hms(2024, 2, 5, 8, 0, 0).unwrap();
        let evt = ScheduledEvent::weekly(first);
        let t1 = Utc.with_ymd_and_hms(2024, 2, 6, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 2, 7, 0, 0, 0).unwrap();
        let n1 = evt.next_event(t1).unwrap();
        let n2 = evt.next_event(t2).unwrap();
        assert!(n1 <= n2);
    }

    #[test]
    fn add_is_idempotent_and_remove_reproduces_semantic_equality() {
        let dir = tempfile::tempdir().unwrap();
        let mut sched = LocalSchedule::load(dir.path().join("schedule.json"));
        let evt = ScheduledEvent::single(Utc::now() + ChronoDuration::days(1));
        let i1 = sched.add(evt);
        let i2 = sched.add(evt);
        assert_eq!(i1, i2);
        assert_eq!(sched.num_events(), 1);

        sched.remove(i1);
        assert_eq!(sched.num_events(), 0);
        sched.add(evt);
        assert_eq!(sched.num_events(), 1);
        assert!(sched.contains(&evt));
    }

    #[test]
    fn malformed_entries_are_dropped_but_well_formed_ones_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(
            &path,
            r#"[{"first":"not-a-date","repeat":"never"},{"first":"2024-01-01 00:00:00","repeat":"daily"}]"#,
        )
        .unwrap();
        let sched = LocalSchedule::load(&path);
        assert_eq!(sched.num_events(), 1);
    }

    #[test]
    fn missing_file_yields_empty_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let sched = LocalSchedule::load(dir.path().join("missing.json"));
        assert_eq!(sched.num_events(), 0);
    }

    #[test]
    fn tick_fires_exactly_once_when_due() {
        let dir = tempfile::tempdir().unwrap();
        let mut sched = LocalSchedule::load(dir.path().join("schedule.json"));
        let now = Utc::now();
        sched.add(ScheduledEvent::single(now));
        let mut rx = sched.start_recording.subscribe();
        sched.tick(now);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
