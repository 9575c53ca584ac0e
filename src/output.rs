//! Output for viewers and operators.
//!
//! Renders per-tick frames through `tracing`, appends tick reports to CSV, and
//! writes feed snapshot dumps as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::consumer::TickOutcome;
use crate::filter::{FilterSpec, filter, sort_by_speed_desc};
use crate::mode::Mode;
use crate::record::VehicleUpdate;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Rows listed per rendered frame.
const LISTED_VEHICLES: usize = 10;

/// What a viewer shows for one tick: the filtered current state plus freshness.
#[derive(Debug)]
pub struct Frame<'a> {
    pub mode: Mode,
    /// Filtered and sorted fastest first.
    pub vehicles: Vec<&'a VehicleUpdate>,
    /// Size of the unfiltered cache.
    pub cached: usize,
    pub lag_minutes: f64,
}

impl<'a> Frame<'a> {
    pub fn new(outcome: &'a TickOutcome, spec: &FilterSpec) -> Self {
        let mut vehicles = filter(&outcome.vehicles, spec);
        sort_by_speed_desc(&mut vehicles);
        Frame {
            mode: outcome.report.mode,
            vehicles,
            cached: outcome.vehicles.len(),
            lag_minutes: outcome.report.lag_minutes(),
        }
    }
}

/// Logs a frame: vehicle count, freshness indicator and the fastest vehicles.
pub fn render_frame(frame: &Frame<'_>) {
    if frame.cached == 0 {
        info!(mode = %frame.mode, "No vehicle data yet, waiting for the producer");
        return;
    }

    match frame.mode {
        Mode::Replay => warn!(
            lag_minutes = (frame.lag_minutes * 10.0).round() / 10.0,
            active = frame.vehicles.len(),
            "Replay running behind"
        ),
        Mode::Live => info!(active = frame.vehicles.len(), cached = frame.cached, "Live feed"),
    }

    for v in frame.vehicles.iter().take(LISTED_VEHICLES) {
        info!(
            id = %v.id,
            speed_mph = v.speed_or_zero(),
            latitude = v.latitude,
            longitude = v.longitude,
            trip_id = %v.trip_id,
            "Vehicle"
        );
    }
}

/// Appends a serializable record (e.g. a [`crate::stats::TickReport`]) as a CSV row.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &str, record: &T) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// JSON document written by the `dump` command.
#[derive(Debug, Serialize)]
pub struct SnapshotDump {
    pub generated_at: DateTime<Utc>,
    pub feed_timestamp: Option<u64>,
    pub vehicle_count: usize,
    /// Always present, empty when the feed carried no vehicles.
    pub vehicles: Vec<VehicleUpdate>,
}

impl SnapshotDump {
    pub fn new(feed_timestamp: Option<u64>, vehicles: Vec<VehicleUpdate>) -> Self {
        SnapshotDump {
            generated_at: Utc::now(),
            feed_timestamp,
            vehicle_count: vehicles.len(),
            vehicles,
        }
    }
}

/// Serializes `value` to `path`, creating parent directories.
pub fn write_json(path: &str, value: &impl Serialize) -> Result<Vec<u8>> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }

    let body = serde_json::to_vec(value)?;
    std::fs::write(path, &body).with_context(|| format!("failed to write {path}"))?;
    info!(path, bytes = body.len(), "Snapshot written");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Region;
    use crate::stats::TickReport;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn vehicle(id: &str, speed: f64) -> VehicleUpdate {
        VehicleUpdate {
            id: id.to_string(),
            trip_id: String::new(),
            route_id: String::new(),
            latitude: 40.7,
            longitude: -111.9,
            vehicle_timestamp: 0,
            source_timestamp: 0.0,
            speed_mph: Some(speed),
        }
    }

    fn outcome(vehicles: Vec<VehicleUpdate>) -> TickOutcome {
        TickOutcome {
            report: TickReport::new(Mode::Replay),
            vehicles,
        }
    }

    #[test]
    fn test_frame_filters_and_sorts() {
        let mut outcome = outcome(vec![
            vehicle("slow", 2.0),
            vehicle("fast", 40.0),
            vehicle("mid", 20.0),
        ]);
        outcome.report.lag_seconds = 90.0;
        let spec = FilterSpec::new(5.0, Region::All, Vec::<String>::new());

        let frame = Frame::new(&outcome, &spec);

        let ids: Vec<&str> = frame.vehicles.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "mid"]);
        assert_eq!(frame.cached, 3);
        assert_eq!(frame.lag_minutes, 1.5);
    }

    #[test]
    fn test_render_frame_does_not_panic() {
        let empty = outcome(Vec::new());
        render_frame(&Frame::new(&empty, &FilterSpec::default()));

        let busy = outcome(vec![vehicle("a", 1.0)]);
        render_frame(&Frame::new(&busy, &FilterSpec::default()));
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("gtfs_rt_stream_test_ticks.csv");
        let _ = fs::remove_file(&path);

        let report = TickReport::new(Mode::Live);
        append_record(&path, &report).unwrap();
        append_record(&path, &report).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,mode,status"));
        assert!(lines[1].contains(",live,ok,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json_empty_snapshot_keeps_vehicle_list() {
        let path = temp_path("gtfs_rt_stream_test_dump/realtime_dump.json");
        let _ = fs::remove_file(&path);

        write_json(&path, &SnapshotDump::new(None, Vec::new())).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["vehicles"], serde_json::json!([]));
        assert_eq!(value["vehicle_count"], 0);

        fs::remove_file(&path).unwrap();
    }
}
