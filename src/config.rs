//! Configuration management.
//!
//! Settings are loaded from `config/<name>.toml` (defaulting to
//! `config/default.toml`) and validated before use. Durations are written in
//! human-readable form (`"300ms"`, `"2s"`) via `humantime-serde`.

use crate::error::{PsuError, PsuResult};
use config::Config;
use serde::Deserialize;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log level filter for the tracing subscriber (e.g. "info").
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Instrument link configuration.
    #[serde(default)]
    pub instrument: InstrumentSettings,
    /// Poller timing configuration.
    #[serde(default)]
    pub polling: PollingSettings,
}

/// Connection and timing parameters for the instrument link.
#[derive(Debug, Deserialize, Clone)]
pub struct InstrumentSettings {
    /// Resource identifier of the instrument. Opaque to the core; the link
    /// layer decides how to interpret it (serial port path, VISA resource).
    #[serde(default = "defaults::address")]
    pub address: String,
    /// Serial baud rate.
    #[serde(default = "defaults::baud_rate")]
    pub baud_rate: u32,
    /// Total time to keep retrying the initial connection before failing
    /// permanently.
    #[serde(with = "humantime_serde", default = "defaults::connect_timeout")]
    pub connect_timeout: Duration,
    /// Fixed backoff between connection attempts.
    #[serde(with = "humantime_serde", default = "defaults::reconnect_delay")]
    pub reconnect_delay: Duration,
    /// Time the instrument needs to apply a command before the next one may
    /// be issued. Spent inside the access lock.
    #[serde(with = "humantime_serde", default = "defaults::settle_time")]
    pub settle_time: Duration,
    /// Timeout for a single response read on the link.
    #[serde(with = "humantime_serde", default = "defaults::read_timeout")]
    pub read_timeout: Duration,
}

/// Intervals for the two periodic pollers.
#[derive(Debug, Deserialize, Clone)]
pub struct PollingSettings {
    /// Interval between measurement cycles.
    #[serde(with = "humantime_serde", default = "defaults::measure_interval")]
    pub measure_interval: Duration,
    /// Interval between regulation mode reads. Coarser than the measurement
    /// interval because mode changes are rare.
    #[serde(with = "humantime_serde", default = "defaults::mode_interval")]
    pub mode_interval: Duration,
}

mod defaults {
    use std::time::Duration;

    pub(super) fn log_level() -> String {
        "info".to_string()
    }

    pub(super) fn address() -> String {
        "USB0::0x1AB1::0x0E11::DP8C193604338::INSTR".to_string()
    }

    pub(super) fn baud_rate() -> u32 {
        9600
    }

    pub(super) fn connect_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub(super) fn reconnect_delay() -> Duration {
        Duration::from_secs(2)
    }

    pub(super) fn settle_time() -> Duration {
        Duration::from_secs(1)
    }

    pub(super) fn read_timeout() -> Duration {
        Duration::from_secs(1)
    }

    pub(super) fn measure_interval() -> Duration {
        Duration::from_millis(300)
    }

    pub(super) fn mode_interval() -> Duration {
        Duration::from_millis(2000)
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            address: defaults::address(),
            baud_rate: defaults::baud_rate(),
            connect_timeout: defaults::connect_timeout(),
            reconnect_delay: defaults::reconnect_delay(),
            settle_time: defaults::settle_time(),
            read_timeout: defaults::read_timeout(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            measure_interval: defaults::measure_interval(),
            mode_interval: defaults::mode_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            instrument: InstrumentSettings::default(),
            polling: PollingSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `config/<name>.toml`, falling back to
    /// `config/default.toml` when no name is given.
    pub fn new(config_name: Option<&str>) -> PsuResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(PsuError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(PsuError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that parse correctly but are logically unusable.
    pub fn validate(&self) -> PsuResult<()> {
        if self.polling.measure_interval.is_zero() {
            return Err(PsuError::Configuration(
                "polling.measure_interval must be greater than zero".into(),
            ));
        }
        if self.polling.mode_interval.is_zero() {
            return Err(PsuError::Configuration(
                "polling.mode_interval must be greater than zero".into(),
            ));
        }
        if self.instrument.connect_timeout.is_zero() {
            return Err(PsuError::Configuration(
                "instrument.connect_timeout must be greater than zero".into(),
            ));
        }
        if self.instrument.reconnect_delay.is_zero() {
            return Err(PsuError::Configuration(
                "instrument.reconnect_delay must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> PsuResult<Settings> {
        let s = Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .map_err(PsuError::Config)?;
        let settings: Settings = s.try_deserialize().map_err(PsuError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.polling.measure_interval, Duration::from_millis(300));
        assert_eq!(settings.polling.mode_interval, Duration::from_millis(2000));
        assert_eq!(settings.instrument.settle_time, Duration::from_secs(1));
        assert_eq!(settings.instrument.baud_rate, 9600);
        settings.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let settings = from_toml(
            r#"
            log_level = "debug"

            [instrument]
            address = "/dev/ttyUSB0"
            baud_rate = 115200
            connect_timeout = "5s"
            reconnect_delay = "500ms"
            settle_time = "1s"
            read_timeout = "2s"

            [polling]
            measure_interval = "250ms"
            mode_interval = "3s"
            "#,
        )
        .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.instrument.address, "/dev/ttyUSB0");
        assert_eq!(settings.instrument.baud_rate, 115200);
        assert_eq!(settings.polling.measure_interval, Duration::from_millis(250));
        assert_eq!(settings.polling.mode_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let settings = from_toml(
            r#"
            [instrument]
            address = "/dev/ttyUSB1"
            "#,
        )
        .unwrap();
        assert_eq!(settings.instrument.address, "/dev/ttyUSB1");
        assert_eq!(settings.polling.measure_interval, Duration::from_millis(300));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = from_toml(
            r#"
            [polling]
            measure_interval = "0s"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("measure_interval"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("default.toml"),
            "log_level = \"warn\"\n",
        )
        .unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = Settings::new(None);
        std::env::set_current_dir(previous).unwrap();

        assert_eq!(result.unwrap().log_level, "warn");
    }
}
