//! Codec for the binary dataset container.
//!
//! Grounded on the original `lib/datasetfile.hh`/`datasetfile.cc`'s
//! `DataSetFile`/`Timeseries`, with the header's `parents` field dropped (not
//! part of this system's data model) and the per-timeseries load order fixed:
//! the original assigns the on-wire longitude into both the `longitude` and
//! `latitude` members of its in-memory struct (the second assignment
//! clobbers the first), so every loaded record silently lost its longitude.
//! This port reads longitude, then latitude, then height, in that order, and
//! `tests::catches_the_original_longitude_loss_bug` is a regression fixture
//! for exactly that defect.

use crate::codec::{
    read_f32_native, read_i16_network, read_u16_be, read_u32_be, read_u8, write_f32_native,
    write_i16_network, write_u16_be, write_u32_be, write_u8,
};
use crate::error::Error;
use crate::geo::Geo;
use crate::identifier::{HashContext, Identifier, HASH_SIZE};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Fixed header size in bytes: year(2) + month/day/hour/minute/second(5) +
/// n_timeseries(2) + n_samples(4) + sample_rate_hz(4).
const HEADER_SIZE: u64 = 2 + 5 + 2 + 4 + 4;
/// longitude(4) + latitude(4) + height(4) + identifier(HASH_SIZE).
const TS_HEADER_SIZE: u64 = 4 + 4 + 4 + HASH_SIZE as u64;

#[derive(Clone, Debug)]
pub struct TimeseriesEntry {
    pub location: Geo,
    pub identifier: Option<Identifier>,
    /// Byte offset of this timeseries' sample payload within the file.
    offset: u64,
}

impl TimeseriesEntry {
    pub fn location(&self) -> &Geo {
        &self.location
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct DatasetFile {
    path: PathBuf,
    timestamp: DateTime<Utc>,
    n_samples: u32,
    sample_rate_hz: u32,
    timeseries: Vec<TimeseriesEntry>,
}

/// Per-timeseries input to [`write`]: everything except the samples, which
/// are supplied separately so they can stream from anywhere.
pub struct TimeseriesSpec {
    pub location: Geo,
    pub identifier: Option<Identifier>,
}

impl DatasetFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        // Read the fixed-size header into a buffer up front: a short file
        // is a format defect, not an I/O failure, so it must surface as
        // `InvalidFormat` rather than letting an EOF read bubble up through
        // `codec`'s `#[from] std::io::Error` conversion as `IoError`.
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)
            .map_err(|_| Error::InvalidFormat("file is shorter than the dataset header".into()))?;
        let mut header = Cursor::new(&header_buf[..]);

        let year = read_u16_be(&mut header)?;
        let month = read_u8(&mut header)?;
        let day = read_u8(&mut header)?;
        let hour = read_u8(&mut header)?;
        let minute = read_u8(&mut header)?;
        let second = read_u8(&mut header)?;
        let n_timeseries = read_u16_be(&mut header)?;
        let n_samples = read_u32_be(&mut header)?;
        let sample_rate_hz = read_u32_be(&mut header)?;

        if n_samples == 0 || sample_rate_hz == 0 || n_timeseries == 0 {
            return Err(Error::InvalidFormat(
                "n_samples, sample_rate_hz and n_timeseries must all be non-zero".into(),
            ));
        }

        let timestamp = Utc
            .with_ymd_and_hms(
                year as i32,
                month as u32,
                day as u32,
                hour as u32,
                minute as u32,
                second as u32,
            )
            .single()
            .ok_or_else(|| Error::InvalidFormat("invalid timestamp in header".into()))?;

        let header_region = HEADER_SIZE + n_timeseries as u64 * TS_HEADER_SIZE;
        let payload_region = n_timeseries as u64 * n_samples as u64 * 2;
        let expected_len = header_region + payload_region;
        if file_len != expected_len {
            return Err(Error::InvalidFormat(format!(
                "file size {file_len} does not match expected {expected_len}"
            )));
        }

        let mut timeseries = Vec::with_capacity(n_timeseries as usize);
        for i in 0..n_timeseries as u64 {
            // Declared field order: longitude, latitude, height.
            let longitude = read_f32_native(&mut file)?;
            let latitude = read_f32_native(&mut file)?;
            let height = read_f32_native(&mut file)?;
            let mut id_bytes = [0u8; HASH_SIZE];
            file.read_exact(&mut id_bytes)?;
            let identifier = Identifier::from_bytes(id_bytes);
            let identifier = identifier.is_valid().then_some(identifier);

            timeseries.push(TimeseriesEntry {
                location: Geo::new(longitude as f64, latitude as f64, height as f64),
                identifier,
                offset: header_region + i * n_samples as u64 * 2,
            });
        }

        Ok(DatasetFile {
            path: path.to_path_buf(),
            timestamp,
            n_samples,
            sample_rate_hz,
            timeseries,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn n_samples(&self) -> u32 {
        self.n_samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn n_timeseries(&self) -> usize {
        self.timeseries.len()
    }

    pub fn timeseries(&self, i: usize) -> Option<&TimeseriesEntry> {
        self.timeseries.get(i)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seeks to the i-th timeseries' payload and reads `n_samples` samples,
    /// converting from network to host byte order.
    pub fn read_timeseries(&self, i: usize, out: &mut Vec<i16>) -> Result<(), Error> {
        let entry = self
            .timeseries
            .get(i)
            .ok_or_else(|| Error::InvalidFormat(format!("no timeseries at index {i}")))?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(entry.offset))?;
        out.clear();
        out.reserve(self.n_samples as usize);
        for _ in 0..self.n_samples {
            out.push(read_i16_network(&mut file)?);
        }
        Ok(())
    }

    pub fn metadata_json(&self) -> serde_json::Value {
        let timeseries: Vec<serde_json::Value> = self
            .timeseries
            .iter()
            .map(|ts| {
                let mut obj = serde_json::json!({ "location": ts.location.to_json() });
                if let Some(id) = &ts.identifier {
                    obj["id"] = serde_json::Value::String(id.to_base32());
                }
                obj
            })
            .collect();

        serde_json::json!({
            "timestamp": format_timestamp(self.timestamp),
            "samples": self.n_samples,
            "samplerate": self.sample_rate_hz,
            "timeseries": timeseries,
        })
    }

    /// Streams a canonical dataset file to `writer` and returns its content
    /// hash. Canonical order: header, then every timeseries header in input
    /// order, then every timeseries' sample block in the same order.
    pub fn write<W: Write>(
        writer: &mut W,
        timestamp: DateTime<Utc>,
        sample_rate_hz: u32,
        specs: &[TimeseriesSpec],
        samples: &[Vec<i16>],
    ) -> Result<Identifier, Error> {
        if specs.len() != samples.len() {
            return Err(Error::InvalidFormat(
                "timeseries spec count must match sample block count".into(),
            ));
        }
        if specs.is_empty() {
            return Err(Error::InvalidFormat("a dataset needs at least one timeseries".into()));
        }
        let n_samples = samples[0].len();
        if n_samples == 0 || samples.iter().any(|s| s.len() != n_samples) {
            return Err(Error::InvalidFormat(
                "every timeseries must carry the same non-zero sample count".into(),
            ));
        }

        let mut hashing = HashingWriter::new(writer);

        write_u16_be(&mut hashing, timestamp.year() as u16)?;
        write_u8(&mut hashing, timestamp.month() as u8)?;
        write_u8(&mut hashing, timestamp.day() as u8)?;
        write_u8(&mut hashing, timestamp.hour() as u8)?;
        write_u8(&mut hashing, timestamp.minute() as u8)?;
        write_u8(&mut hashing, timestamp.second() as u8)?;
        write_u16_be(&mut hashing, specs.len() as u16)?;
        write_u32_be(&mut hashing, n_samples as u32)?;
        write_u32_be(&mut hashing, sample_rate_hz)?;

        for spec in specs {
            write_f32_native(&mut hashing, spec.location.longitude_deg() as f32)?;
            write_f32_native(&mut hashing, spec.location.latitude_deg() as f32)?;
            write_f32_native(&mut hashing, spec.location.height_m() as f32)?;
            let id_bytes = spec
                .identifier
                .map(|id| *id.as_bytes())
                .unwrap_or([0u8; HASH_SIZE]);
            hashing.write_all(&id_bytes)?;
        }

        for block in samples {
            for &sample in block {
                write_i16_network(&mut hashing, sample)?;
            }
        }

        Ok(hashing.finish())
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `Write` adapter that mirrors every byte into a running hash, so the
/// writer never has to buffer the whole file to compute its content id.
struct HashingWriter<'w, W: Write> {
    inner: &'w mut W,
    hash: HashContext,
}

impl<'w, W: Write> HashingWriter<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        Self {
            inner,
            hash: HashContext::new(),
        }
    }

    fn finish(self) -> Identifier {
        self.hash.finalize()
    }
}

impl<'w, W: Write> Write for HashingWriter<'w, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hash.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_specs_and_samples() -> (Vec<TimeseriesSpec>, Vec<Vec<i16>>) {
        let specs = vec![
            TimeseriesSpec {
                location: Geo::new(28.9784, 41.0082, 39.0),
                identifier: None,
            },
            TimeseriesSpec {
                location: Geo::new(-0.1278, 51.5074, 11.0),
                identifier: None,
            },
        ];
        let samples = vec![vec![1, -2, 3, -4], vec![10, -20, 30, -40]];
        (specs, samples)
    }

    #[test]
    fn write_then_load_round_trips_header_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.vlf");
        let (specs, samples) = sample_specs_and_samples();
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();

        let mut buf = Vec::new();
        let digest = DatasetFile::write(&mut buf, ts, 8000, &specs, &samples).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let loaded = DatasetFile::load(&path).unwrap();
        assert_eq!(loaded.timestamp(), ts);
        assert_eq!(loaded.n_samples(), 4);
        assert_eq!(loaded.sample_rate_hz(), 8000);
        assert_eq!(loaded.n_timeseries(), 2);

        let rehash = crate::identifier::hash_bytes(&buf);
        assert_eq!(rehash, digest);
    }

    #[test]
    fn catches_the_original_longitude_loss_bug() {
        // The original C++ loader assigned the wire longitude into both the
        // longitude and latitude struct members, so it always lost
        // longitude. This dataset uses two timeseries with clearly distinct
        // longitude/latitude so that bug would be caught immediately.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regression.vlf");
        let specs = vec![TimeseriesSpec {
            location: Geo::new(100.0, -30.0, 0.0),
            identifier: None,
        }];
        let samples = vec![vec![0i16; 10]];
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut buf = Vec::new();
        DatasetFile::write(&mut buf, ts, 1000, &specs, &samples).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let loaded = DatasetFile::load(&path).unwrap();
        let entry = loaded.timeseries(0).unwrap();
        assert!((entry.location().longitude_deg() - 100.0).abs() < 1e-3);
        assert!((entry.location().latitude_deg() - (-30.0)).abs() < 1e-3);
        assert_ne!(entry.location().longitude_deg(), entry.location().latitude_deg());
    }

    #[test]
    fn read_timeseries_recovers_exact_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.vlf");
        let (specs, samples) = sample_specs_and_samples();
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();

        let mut buf = Vec::new();
        DatasetFile::write(&mut buf, ts, 8000, &specs, &samples).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let loaded = DatasetFile::load(&path).unwrap();
        let mut out = Vec::new();
        loaded.read_timeseries(1, &mut out).unwrap();
        assert_eq!(out, samples[1]);
    }

    #[test]
    fn truncated_file_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.vlf");
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert!(matches!(DatasetFile::load(&path), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn size_mismatch_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mismatch.vlf");
        let (specs, samples) = sample_specs_and_samples();
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();
        let mut buf = Vec::new();
        DatasetFile::write(&mut buf, ts, 8000, &specs, &samples).unwrap();
        buf.push(0); // corrupt trailing byte
        std::fs::write(&path, &buf).unwrap();
        assert!(matches!(DatasetFile::load(&path), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn metadata_json_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.vlf");
        let (specs, samples) = sample_specs_and_samples();
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();
        let mut buf = Vec::new();
        DatasetFile::write(&mut buf, ts, 8000, &specs, &samples).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let loaded = DatasetFile::load(&path).unwrap();
        let meta = loaded.metadata_json();
        assert_eq!(meta["timestamp"], "2024-06-15 06:00:00");
        assert_eq!(meta["samplerate"], 8000);
        assert_eq!(meta["timeseries"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn cursor_write_also_produces_a_stable_digest() {
        let (specs, samples) = sample_specs_and_samples();
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap();
        let mut a = Cursor::new(Vec::new());
        let mut b = Cursor::new(Vec::new());
        let d1 = DatasetFile::write(&mut a, ts, 8000, &specs, &samples).unwrap();
        let d2 = DatasetFile::write(&mut b, ts, 8000, &specs, &samples).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(a.into_inner(), b.into_inner());
    }
}
