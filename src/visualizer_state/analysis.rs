//! # Performance Instrumentation
//!
//! A keyed side channel for timing samples. Every key owns its own sample
//! history, fed in one of two ways:
//!
//! - `tick(key)` records the time since the previous tick of that key. The
//!   first tick only sets the baseline.
//! - `start_record(key)` / `stop_record(key)` record the interval between a
//!   matched pair. A stop without a start is ignored.
//!
//! `save_to_file` writes every history to a timestamped JSON report and only
//! logs when that fails.
//!
//! ## Key Components
//! - `PerformanceSink`: the opaque interface the pipeline talks to
//! - `PerformanceAnalysis`: the recorder used when instrumentation is on
//! - `DisabledAnalysis`: a sink that drops everything

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::{error, info};
use serde::{Deserialize, Serialize};
use web_time::{Instant, SystemTime, UNIX_EPOCH};

use crate::core::MtResource;

/// Key ticked for every accepted batch.
pub const MESSAGE_KEY: &str = "Message";
/// Key ticked for every dispatched batch.
pub const MESH_KEY: &str = "Mesh";

/// Key of the per-slot conversion interval.
pub fn conversion_key(slot: usize) -> String {
    format!("Conversion {}", slot)
}

/// Receiver of timing samples.
///
/// Shared between the ingress side, which may live on a transport thread,
/// and the scheduler, so implementations must be `Send + Sync`.
pub trait PerformanceSink: Send + Sync {
    fn tick(&self, key: &str);
    fn start_record(&self, key: &str);
    fn stop_record(&self, key: &str);

    /// Persists the collected samples.
    ///
    /// # Returns
    /// The path of the written report, or `None` if nothing was written
    fn save_to_file(&self) -> Option<PathBuf>;
}

/// Sink used when instrumentation is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAnalysis;

impl PerformanceSink for DisabledAnalysis {
    fn tick(&self, _key: &str) {}
    fn start_record(&self, _key: &str) {}
    fn stop_record(&self, _key: &str) {}

    fn save_to_file(&self) -> Option<PathBuf> {
        None
    }
}

/// One key's entry in the persisted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySamples {
    pub name: String,
    pub tick_times: Vec<f32>,
    pub last_tick_time: f32,
}

/// The persisted report: `{ "data": [ ... ] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub data: Vec<KeySamples>,
}

#[derive(Debug, Default)]
struct KeyRecord {
    tick_times: Vec<f32>,
    last_tick: Option<f32>,
    open_interval: Option<f32>,
}

/// Keyed timing recorder.
///
/// Times are stored as seconds since the recorder was created.
pub struct PerformanceAnalysis {
    origin: Instant,
    directory: PathBuf,
    file_name: String,
    records: MtResource<HashMap<String, KeyRecord>>,
}

impl PerformanceAnalysis {
    /// Creates a recorder whose report will land in `directory`.
    ///
    /// # Arguments
    /// * `directory` - Folder the report is written to on save
    /// * `label` - Optional suffix appended to the report file name
    pub fn new(directory: impl Into<PathBuf>, label: Option<&str>) -> Self {
        let file_name = report_file_name(SystemTime::now(), label);
        PerformanceAnalysis {
            origin: Instant::now(),
            directory: directory.into(),
            file_name,
            records: MtResource::new(HashMap::new()),
        }
    }

    /// Where `save_to_file` writes the report.
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Recorded samples for `key`, oldest first.
    pub fn samples(&self, key: &str) -> Vec<f32> {
        self.records
            .get()
            .get(key)
            .map(|record| record.tick_times.clone())
            .unwrap_or_default()
    }

    pub fn tick_at(&self, key: &str, now: Instant) {
        let now = self.seconds_since_origin(now);
        let mut records = self.records.get_mut();
        let record = records.entry(key.to_string()).or_default();
        if let Some(last_tick) = record.last_tick {
            record.tick_times.push(now - last_tick);
        }
        record.last_tick = Some(now);
    }

    pub fn start_record_at(&self, key: &str, now: Instant) {
        let now = self.seconds_since_origin(now);
        let mut records = self.records.get_mut();
        records.entry(key.to_string()).or_default().open_interval = Some(now);
    }

    pub fn stop_record_at(&self, key: &str, now: Instant) {
        let now = self.seconds_since_origin(now);
        let mut records = self.records.get_mut();
        let Some(record) = records.get_mut(key) else {
            return;
        };
        if let Some(started) = record.open_interval.take() {
            record.tick_times.push(now - started);
            record.last_tick = Some(now);
        }
    }

    /// Snapshot of every key's samples, sorted by key.
    pub fn report(&self) -> AnalysisReport {
        let records = self.records.get();
        let mut data: Vec<KeySamples> = records
            .iter()
            .map(|(name, record)| KeySamples {
                name: name.clone(),
                tick_times: record.tick_times.clone(),
                last_tick_time: record.last_tick.unwrap_or(0.0),
            })
            .collect();
        data.sort_by(|a, b| a.name.cmp(&b.name));
        AnalysisReport { data }
    }

    fn seconds_since_origin(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.origin).as_secs_f32()
    }

    fn write_report(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(&self.report())?;
        std::fs::write(path, json)
    }
}

impl PerformanceSink for PerformanceAnalysis {
    fn tick(&self, key: &str) {
        self.tick_at(key, Instant::now());
    }

    fn start_record(&self, key: &str) {
        self.start_record_at(key, Instant::now());
    }

    fn stop_record(&self, key: &str) {
        self.stop_record_at(key, Instant::now());
    }

    fn save_to_file(&self) -> Option<PathBuf> {
        let path = self.file_path();
        match self.write_report(&path) {
            Ok(()) => {
                info!("Performance analysis saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Error saving performance data to {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// `PerformanceAnalysis_<yyyy_MM_dd_HH_mm_ss_fff>[_<label>].json`, in UTC.
pub fn report_file_name(at: SystemTime, label: Option<&str>) -> String {
    let timestamp = format_timestamp(at);
    match label.filter(|label| !label.is_empty()) {
        Some(label) => format!("PerformanceAnalysis_{}_{}.json", timestamp, label),
        None => format!("PerformanceAnalysis_{}.json", timestamp),
    }
}

fn format_timestamp(at: SystemTime) -> String {
    let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let seconds_of_day = secs % 86_400;

    format!(
        "{:04}_{:02}_{:02}_{:02}_{:02}_{:02}_{:03}",
        year,
        month,
        day,
        seconds_of_day / 3600,
        seconds_of_day % 3600 / 60,
        seconds_of_day % 60,
        since_epoch.subsec_millis()
    )
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
