//! CLI surface and the per-file config structs read out of a station's
//! data root. Grounded on `lib/station.cc`'s constructor (which reads
//! `location.json`, `bootstrap.json`, `schedule.json`, `receiver.json`,
//! `sockswhitelist.json` off a single path argument) and, for the CLI
//! layer itself, on the `clap` derive usage in ODIN's workspace crates.

use crate::error::Error;
use crate::geo::Geo;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7741";
pub const DEFAULT_CONFIG_DIR: &str = "./data";

#[derive(Parser, Debug)]
#[command(name = "vlf-station", about = "VLF observatory station daemon")]
pub struct Cli {
    /// Root directory holding identity, location, schedule and dataset files.
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Cost budget for admitting remote schedule events.
    #[arg(long, default_value_t = crate::merged_schedule::DEFAULT_MAX_COST)]
    pub max_cost: f64,

    /// HTTP bind address for the `vlf::station` service.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,
}

#[derive(Serialize, Deserialize)]
struct LocationFile {
    longitude: f64,
    latitude: f64,
    height: f64,
}

/// Reads `location.json`; a missing file yields a null location (the
/// station has not yet been told where it is), matching `Location::fromFile`'s
/// tolerant fallback.
pub fn load_location(dir: &Path) -> Geo {
    let path = dir.join("location.json");
    match std::fs::read(&path) {
        Ok(bytes) => match serde_json::from_slice::<LocationFile>(&bytes) {
            Ok(loc) => Geo::new(loc.longitude, loc.latitude, loc.height),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot parse location.json, using null location");
                Geo::null()
            }
        },
        Err(_) => Geo::null(),
    }
}

pub fn save_location(dir: &Path, location: &Geo) -> Result<(), Error> {
    let file = LocationFile {
        longitude: location.longitude_deg(),
        latitude: location.latitude_deg(),
        height: location.height_m(),
    };
    std::fs::write(dir.join("location.json"), serde_json::to_vec(&file)?)?;
    Ok(())
}

/// Reads `receiver.json`'s `sample_rate_hz`, defaulting as the original's
/// `ReceiverConfig` does when the file is absent or the field is missing.
/// Device selection itself is out of scope (§4.10); only the sample rate
/// the core needs to seal a DatasetFile is read here.
pub fn load_sample_rate_hz(dir: &Path) -> u32 {
    const DEFAULT_SAMPLE_RATE_HZ: u32 = 8000;
    let path = dir.join("receiver.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return DEFAULT_SAMPLE_RATE_HZ;
    };
    #[derive(Deserialize)]
    struct Rate {
        #[serde(default)]
        sample_rate_hz: Option<u32>,
    }
    serde_json::from_slice::<Rate>(&bytes)
        .ok()
        .and_then(|r| r.sample_rate_hz)
        .unwrap_or(DEFAULT_SAMPLE_RATE_HZ)
}
