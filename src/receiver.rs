//! Turns a run of incoming audio samples into a sealed [`DatasetFile`]
//! entry in the station's [`DatasetStore`].
//!
//! Grounded on `lib/receiver.cc`'s `Receiver`: `start` opens a fresh
//! recording and records the UTC start time, `writeData` appends
//! network-order samples as they arrive, `stop`/`save` assembles the
//! dataset file header plus timeseries header and moves the sealed result
//! into the dataset directory under its content hash. The actual capture
//! device (`QAudioDeviceInfo`, `fftw3`-based `BeaconReceiver`) is a platform
//! concern the original owns through `Audio`; this crate's scope is the
//! pipeline from "samples arrived" to "dataset sealed" (spec §1), so
//! `Receiver` here is driven by pushed samples rather than owning a device.

use crate::dataset_file::{DatasetFile, TimeseriesSpec};
use crate::dataset_store::DatasetStore;
use crate::error::Error;
use crate::geo::Geo;
use crate::identifier::Identifier;
use chrono::{DateTime, Utc};

pub struct Receiver {
    location: Geo,
    sample_rate_hz: u32,
    recording: Option<Recording>,
}

struct Recording {
    start_time: DateTime<Utc>,
    samples: Vec<i16>,
}

impl Receiver {
    pub fn new(location: Geo, sample_rate_hz: u32) -> Self {
        Receiver {
            location,
            sample_rate_hz,
            recording: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Opens a new recording. Mirrors `Receiver::start`'s refusal to begin
    /// a second recording while one is already open.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.recording.is_some() {
            return Err(Error::InvalidFormat("receiver is already recording".into()));
        }
        self.recording = Some(Recording {
            start_time: now,
            samples: Vec::new(),
        });
        Ok(())
    }

    /// Appends one batch of samples, mirrors the accumulation loop in
    /// `Receiver::writeData`.
    pub fn on_samples(&mut self, samples: &[i16]) -> Result<(), Error> {
        let recording = self
            .recording
            .as_mut()
            .ok_or_else(|| Error::InvalidFormat("receiver is not recording".into()))?;
        recording.samples.extend_from_slice(samples);
        Ok(())
    }

    /// Seals the open recording into a single-timeseries dataset file and
    /// admits it into `store`. Mirrors `Receiver::stop`/`Receiver::save`.
    pub fn finish(&mut self, store: &mut DatasetStore) -> Result<Identifier, Error> {
        let recording = self
            .recording
            .take()
            .ok_or_else(|| Error::InvalidFormat("receiver has no open recording to finish".into()))?;

        let specs = vec![TimeseriesSpec {
            location: self.location,
            identifier: None,
        }];
        let samples = vec![recording.samples];
        let mut buf = Vec::new();
        DatasetFile::write(&mut buf, recording.start_time, self.sample_rate_hz, &specs, &samples)?;
        store.insert_trusted(&buf)
    }

    /// Discards the open recording without sealing it, used when an audio
    /// device error aborts capture partway through.
    pub fn abort(&mut self) {
        self.recording = None;
    }
}
