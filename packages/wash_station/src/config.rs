use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use station_core::{Thresholds, Timeouts};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [logging]
//                    device_id = "station-07"
//
//   env var:         WASH_LOGGING__DEVICE_ID=station-07   (double underscore = nesting)
//
//   (single underscore stays within field names: WASH_SENSOR__TIMING_BUDGET_MS)

/// Sensor timing presets, trading per-sample latency for accuracy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 20ms timing budget: quick but jittery readings
    Fast,
    /// 33ms timing budget: the sensor's stock compromise
    Balanced,
    /// 200ms timing budget: slow, accurate readings
    Accurate,
}

/// Where distance samples come from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    /// Linux IIO sysfs attribute (e.g. the vl53l0x driver's `in_distance_raw`)
    Iio,
    /// Synthetic visitors, for running without hardware
    Simulated,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub sensor: SensorFileConfig,
    #[serde(default)]
    pub thresholds: ThresholdFileConfig,
    #[serde(default)]
    pub timing: TimingFileConfig,
    #[serde(default)]
    pub logging: LoggingFileConfig,
}

/// HTTP server knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// State changes buffered per stream client before it is marked lagged
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            stream_capacity: default_stream_capacity(),
        }
    }
}

/// Sensor tunables (lives under `[sensor]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorFileConfig {
    #[serde(default = "default_sensor_source")]
    pub source: SensorSource,
    #[serde(default = "default_iio_path")]
    pub iio_path: PathBuf,
    #[serde(default = "default_timing_budget_ms")]
    pub timing_budget_ms: u64,
}

impl Default for SensorFileConfig {
    fn default() -> Self {
        Self {
            source: default_sensor_source(),
            iio_path: default_iio_path(),
            timing_budget_ms: default_timing_budget_ms(),
        }
    }
}

/// Classification cut-offs (lives under `[thresholds]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdFileConfig {
    #[serde(default = "default_wave_mm")]
    pub wave_mm: u32,
    #[serde(default = "default_person_mm")]
    pub person_mm: u32,
}

impl Default for ThresholdFileConfig {
    fn default() -> Self {
        Self {
            wave_mm: default_wave_mm(),
            person_mm: default_person_mm(),
        }
    }
}

/// State machine timeouts (lives under `[timing]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingFileConfig {
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_wash_duration_ms")]
    pub wash_duration_ms: u64,
    #[serde(default = "default_wash_idle_timeout_ms")]
    pub wash_idle_timeout_ms: u64,
    #[serde(default = "default_done_timeout_ms")]
    pub done_timeout_ms: u64,
}

impl Default for TimingFileConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            wash_duration_ms: default_wash_duration_ms(),
            wash_idle_timeout_ms: default_wash_idle_timeout_ms(),
            done_timeout_ms: default_done_timeout_ms(),
        }
    }
}

/// Usage collector settings (lives under `[logging]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingFileConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    #[serde(default = "default_collector_url")]
    pub base_url: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LoggingFileConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            base_url: default_collector_url(),
            device_id: default_device_id(),
            queue_capacity: default_queue_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_stream_capacity() -> usize {
    16
}
fn default_sensor_source() -> SensorSource {
    SensorSource::Iio
}
fn default_iio_path() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0/in_distance_raw")
}
fn default_timing_budget_ms() -> u64 {
    100
}
fn default_wave_mm() -> u32 {
    Thresholds::default().wave_mm
}
fn default_person_mm() -> u32 {
    Thresholds::default().person_mm
}
fn default_idle_timeout_ms() -> u64 {
    10_000
}
fn default_wash_duration_ms() -> u64 {
    25_500
}
fn default_wash_idle_timeout_ms() -> u64 {
    4_000
}
fn default_done_timeout_ms() -> u64 {
    4_000
}
fn default_logging_enabled() -> bool {
    true
}
fn default_collector_url() -> String {
    "http://127.0.0.1:5000/".to_string()
}
fn default_device_id() -> String {
    "xxxxxxxxx1".to_string()
}
fn default_queue_capacity() -> usize {
    64
}
fn default_request_timeout_ms() -> u64 {
    5_000
}

/// Build a figment that layers: defaults → profile defaults → config.toml → WASH_* env vars.
///
/// Profile defaults sit above struct defaults but below config.toml/env.
/// The CLI profile takes priority over the config file profile.
///
/// Env vars use double-underscore for nesting into sections:
///   `WASH_LOGGING__ENABLED=false`  →  `logging.enabled = false`
///   `WASH_SENSOR__SOURCE=simulated`  →  `sensor.source = "simulated"`
pub fn load_config(config_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    // Pass 1: peek at profile from config.toml/env (CLI overrides file)
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("WASH_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: rebuild with profile defaults as a layer between defaults and config.toml
    let profile_layer = profile_to_file_config(profile.as_ref());

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("WASH_").split("__"))
}

/// Convert a profile into a `FileConfig` with the profile's timing budget filled in.
fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    let timing_budget_ms = match profile {
        Some(Profile::Fast) => 20,
        Some(Profile::Balanced) => 33,
        Some(Profile::Accurate) => 200,
        None => return FileConfig::default(),
    };
    FileConfig {
        profile: profile.cloned(),
        sensor: SensorFileConfig {
            timing_budget_ms,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Default config directory: `$XDG_CONFIG_HOME/wash_station`, or `./` when
/// the platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("wash_station"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct SensorConfig {
    pub source: SensorSource,
    pub iio_path: PathBuf,
    pub timing_budget: Duration,
}

/// Usage logger configuration (runtime view).
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub enabled: bool,
    pub base_url: String,
    pub device_id: String,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
}

/// Everything the station needs at runtime.
#[derive(Clone, Debug)]
pub struct StationConfig {
    pub listen_addr: SocketAddr,
    pub stream_capacity: usize,
    pub sensor: SensorConfig,
    pub thresholds: Thresholds,
    pub timeouts: Timeouts,
    pub logger: LoggerConfig,
}

impl StationConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let host = fc.server.host.as_deref().unwrap_or("127.0.0.1");
        let port = fc.server.port.unwrap_or(5000);
        let listen_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        let thresholds = Thresholds {
            wave_mm: fc.thresholds.wave_mm,
            person_mm: fc.thresholds.person_mm,
        };
        thresholds.validate()?;

        info!(
            "Sensor: {:?}, timing budget {}ms",
            fc.sensor.source, fc.sensor.timing_budget_ms
        );

        Ok(Self {
            listen_addr,
            stream_capacity: fc.server.stream_capacity.max(1),
            sensor: SensorConfig {
                source: fc.sensor.source.clone(),
                iio_path: fc.sensor.iio_path.clone(),
                timing_budget: Duration::from_millis(fc.sensor.timing_budget_ms),
            },
            thresholds,
            timeouts: Timeouts {
                idle: Duration::from_millis(fc.timing.idle_timeout_ms),
                wash: Duration::from_millis(fc.timing.wash_duration_ms),
                wash_idle: Duration::from_millis(fc.timing.wash_idle_timeout_ms),
                done: Duration::from_millis(fc.timing.done_timeout_ms),
            },
            logger: LoggerConfig {
                enabled: fc.logging.enabled,
                base_url: fc.logging.base_url.clone(),
                device_id: fc.logging.device_id.clone(),
                queue_capacity: fc.logging.queue_capacity.max(1),
                request_timeout: Duration::from_millis(fc.logging.request_timeout_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── profile_to_file_config ──────────────────────────────────────────

    #[test]
    fn test_fast_profile() {
        let fc = profile_to_file_config(Some(&Profile::Fast));
        assert_eq!(fc.profile, Some(Profile::Fast));
        assert_eq!(fc.sensor.timing_budget_ms, 20);
    }

    #[test]
    fn test_accurate_profile() {
        let fc = profile_to_file_config(Some(&Profile::Accurate));
        assert_eq!(fc.profile, Some(Profile::Accurate));
        assert_eq!(fc.sensor.timing_budget_ms, 200);
        assert_eq!(fc.sensor.source, SensorSource::Iio);
    }

    #[test]
    fn test_no_profile() {
        let fc = profile_to_file_config(None);
        assert!(fc.profile.is_none());
        assert_eq!(fc.sensor.timing_budget_ms, 100);
    }

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_timing_defaults() {
        let d = TimingFileConfig::default();
        assert_eq!(d.idle_timeout_ms, 10_000);
        assert_eq!(d.wash_duration_ms, 25_500);
        assert_eq!(d.wash_idle_timeout_ms, 4_000);
        assert_eq!(d.done_timeout_ms, 4_000);
    }

    #[test]
    fn test_logging_defaults() {
        let d = LoggingFileConfig::default();
        assert!(d.enabled);
        assert_eq!(d.device_id, "xxxxxxxxx1");
        assert_eq!(d.queue_capacity, 64);
    }

    // ── StationConfig::from_file ────────────────────────────────────────

    #[test]
    fn test_station_config_from_defaults() {
        let sc = StationConfig::from_file(&FileConfig::default()).unwrap();
        assert_eq!(sc.listen_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(sc.thresholds, Thresholds::default());
        assert_eq!(sc.timeouts, Timeouts::default());
        assert_eq!(sc.sensor.timing_budget, Duration::from_millis(100));
        assert_eq!(sc.logger.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_station_config_rejects_inverted_thresholds() {
        let fc = FileConfig {
            thresholds: ThresholdFileConfig {
                wave_mm: 6000,
                person_mm: 5000,
            },
            ..Default::default()
        };
        assert!(StationConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_station_config_rejects_bad_host() {
        let fc = FileConfig {
            server: ServerFileConfig {
                host: Some("not a host".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(StationConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_zero_capacities_are_clamped() {
        let fc = FileConfig {
            server: ServerFileConfig {
                stream_capacity: 0,
                ..Default::default()
            },
            logging: LoggingFileConfig {
                queue_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let sc = StationConfig::from_file(&fc).unwrap();
        assert_eq!(sc.stream_capacity, 1);
        assert_eq!(sc.logger.queue_capacity, 1);
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert!(fc.profile.is_none());
        assert!(fc.server.host.is_none());
        assert_eq!(fc.thresholds.wave_mm, 300);
        assert_eq!(fc.thresholds.person_mm, 5000);
    }

    #[test]
    fn test_load_config_with_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path(), Some(&Profile::Balanced))
            .extract()
            .unwrap();
        assert_eq!(fc.sensor.timing_budget_ms, 33);
    }

    #[test]
    fn test_load_config_toml_overrides_profile() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[sensor]\ntiming_budget_ms = 50\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path(), Some(&Profile::Fast))
            .extract()
            .unwrap();
        assert_eq!(fc.sensor.timing_budget_ms, 50);
    }

    #[test]
    fn test_load_config_profile_from_toml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "profile = \"accurate\"\n").unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert_eq!(fc.profile, Some(Profile::Accurate));
        assert_eq!(fc.sensor.timing_budget_ms, 200);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 8080\n\n\
             [sensor]\nsource = \"simulated\"\n\n\
             [logging]\nbase_url = \"http://collector.local:5000/\"\ndevice_id = \"station-07\"\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(fc.sensor.source, SensorSource::Simulated);
        assert_eq!(fc.logging.device_id, "station-07");

        let sc = StationConfig::from_file(&fc).unwrap();
        assert_eq!(sc.listen_addr.port(), 8080);
        assert_eq!(sc.logger.base_url, "http://collector.local:5000/");
    }
}
