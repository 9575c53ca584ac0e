//! Environment-level settings, passed through to the transport and fetcher unchanged.

/// Kinesis stream the producer writes and viewers read.
pub const DEFAULT_STREAM_NAME: &str = "uta-gtfs-kinesis-stream-v2";
pub const DEFAULT_REGION: &str = "us-east-1";
/// UTA vehicle positions, no key required.
pub const DEFAULT_FEED_URL: &str = "https://apps.rideuta.com/tms/gtfs/Vehicle";
/// UTA vehicle positions through Transitland; requires `TRANSITLAND_API_KEY`.
pub const TRANSITLAND_FEED_URL: &str =
    "https://transit.land/api/v2/rest/feeds/f-9x0-uta~rt/download_latest_rt/vehicle_positions.pb";
pub const DEFAULT_OUTPUT_PATH: &str = "/data/GTFS_realtime/realtime_dump.json";

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub stream_name: String,
    pub region: String,
    pub feed_url: String,
    pub api_key: Option<String>,
    pub output_path: String,
}

impl StreamConfig {
    /// Reads `STREAM_NAME`, `AWS_REGION`, `GTFS_RT_URL`, `TRANSITLAND_API_KEY`
    /// and `OUTPUT_PATH`, falling back to the defaults above.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StreamConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("TRANSITLAND_API_KEY");
        // An explicit feed URL wins; otherwise a Transitland key selects the
        // Transitland download.
        let feed_url = var("GTFS_RT_URL").unwrap_or_else(|| {
            if api_key.is_some() {
                TRANSITLAND_FEED_URL.to_string()
            } else {
                DEFAULT_FEED_URL.to_string()
            }
        });

        StreamConfig {
            stream_name: var("STREAM_NAME").unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string()),
            region: var("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            feed_url,
            api_key,
            output_path: var("OUTPUT_PATH").unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> StreamConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StreamConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.stream_name, DEFAULT_STREAM_NAME);
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.output_path, DEFAULT_OUTPUT_PATH);
    }

    #[test]
    fn test_api_key_selects_transitland() {
        let config = config(&[("TRANSITLAND_API_KEY", "secret")]);
        assert_eq!(config.feed_url, TRANSITLAND_FEED_URL);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_explicit_values_pass_through() {
        let config = config(&[
            ("STREAM_NAME", "buses"),
            ("AWS_REGION", "us-west-2"),
            ("GTFS_RT_URL", "https://cdn.mbta.com/realtime/VehiclePositions.pb"),
            ("TRANSITLAND_API_KEY", "  "),
        ]);
        assert_eq!(config.stream_name, "buses");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.feed_url, "https://cdn.mbta.com/realtime/VehiclePositions.pb");
        assert_eq!(config.api_key, None);
    }
}
