use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub radio: RadioConfig,
    pub stream: StreamConfig,
    pub output: OutputConfig,
    pub sim: SimConfig,
}

/// Radio front-end parameters applied when a session is configured
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioConfig {
    pub sample_rate_hz: f64,
    pub oversampling: u32,
    pub lo_frequency_hz: f64,
    pub lowpass_bandwidth_hz: f64,
    pub tx_gain_db: u32,
    pub rx_gain_db: u32,
    pub antenna_port: usize,
    /// Run TX/RX calibration at the configured bandwidth after setup.
    pub calibrate: bool,
}

/// Streaming parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub channels: usize,
    pub io_timeout_ms: u64,
    pub tx_fifo_size: usize,
    pub rx_fifo_size: usize,
    pub throughput_vs_latency: f32,
    pub continuous: bool,
    pub modulation: String,
}

/// Results and dump output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    pub dump_format: DumpFormat,
}

/// File format used by the dump-tx / dump-rx commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// One `I, Q` line per symbol
    #[default]
    Text,
    /// 2-channel 16-bit WAV, I on the left channel, Q on the right
    Wav,
}

/// Simulated radio roster used by the binary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Number of loopback endpoints sharing one medium.
    pub endpoints: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: defaults::SAMPLE_RATE_HZ,
            oversampling: defaults::OVERSAMPLING,
            lo_frequency_hz: defaults::LO_FREQUENCY_HZ,
            lowpass_bandwidth_hz: defaults::LOWPASS_BANDWIDTH_HZ,
            tx_gain_db: defaults::TX_GAIN_DB,
            rx_gain_db: defaults::RX_GAIN_DB,
            antenna_port: defaults::ANTENNA_PORT,
            calibrate: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: defaults::NUM_CHANNELS,
            io_timeout_ms: defaults::IO_TIMEOUT_MS,
            tx_fifo_size: defaults::TX_FIFO_SIZE,
            rx_fifo_size: defaults::RX_FIFO_SIZE,
            throughput_vs_latency: defaults::THROUGHPUT_VS_LATENCY,
            continuous: false,
            modulation: defaults::DEFAULT_MODULATION.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(defaults::RESULTS_DIR),
            dump_format: DumpFormat::Text,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { endpoints: 1 }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - IQLINK_MODULATION → stream.modulation
    /// - IQLINK_RESULTS_DIR → output.results_dir
    /// - IQLINK_CONTINUOUS → stream.continuous ("1"/"true"/"yes" enable it)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(modulation) = std::env::var("IQLINK_MODULATION")
            && !modulation.is_empty()
        {
            self.stream.modulation = modulation;
        }

        if let Ok(dir) = std::env::var("IQLINK_RESULTS_DIR")
            && !dir.is_empty()
        {
            self.output.results_dir = PathBuf::from(dir);
        }

        if let Ok(continuous) = std::env::var("IQLINK_CONTINUOUS")
            && !continuous.is_empty()
        {
            self.stream.continuous = matches!(
                continuous.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/iqlink/config.toml on Linux, or a relative
    /// `iqlink/config.toml` when no config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iqlink")
            .join("config.toml")
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_iqlink_env() {
        remove_env("IQLINK_MODULATION");
        remove_env("IQLINK_RESULTS_DIR");
        remove_env("IQLINK_CONTINUOUS");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.radio.sample_rate_hz, 1e6);
        assert_eq!(config.radio.oversampling, 4);
        assert_eq!(config.radio.lo_frequency_hz, 2450e6);
        assert_eq!(config.radio.lowpass_bandwidth_hz, 5e6);
        assert_eq!(config.radio.tx_gain_db, 40);
        assert_eq!(config.radio.antenna_port, 1);
        assert!(!config.radio.calibrate);

        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.stream.io_timeout_ms, 100);
        assert_eq!(config.stream.tx_fifo_size, 2048);
        assert_eq!(config.stream.rx_fifo_size, 10240);
        assert!(!config.stream.continuous);
        assert_eq!(config.stream.modulation, "bpsk");

        assert_eq!(config.output.results_dir, PathBuf::from("results"));
        assert_eq!(config.output.dump_format, DumpFormat::Text);
        assert_eq!(config.sim.endpoints, 1);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [radio]
            sample_rate_hz = 2e6
            lo_frequency_hz = 915e6
            tx_gain_db = 10
            calibrate = true

            [stream]
            continuous = true
            modulation = "qpsk"
            io_timeout_ms = 250

            [output]
            results_dir = "/tmp/iq"
            dump_format = "wav"

            [sim]
            endpoints = 2
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.radio.sample_rate_hz, 2e6);
        assert_eq!(config.radio.lo_frequency_hz, 915e6);
        assert_eq!(config.radio.tx_gain_db, 10);
        assert!(config.radio.calibrate);
        assert!(config.stream.continuous);
        assert_eq!(config.stream.modulation, "qpsk");
        assert_eq!(config.stream.io_timeout_ms, 250);
        assert_eq!(config.output.results_dir, PathBuf::from("/tmp/iq"));
        assert_eq!(config.output.dump_format, DumpFormat::Wav);
        assert_eq!(config.sim.endpoints, 2);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [stream]
            modulation = "qpsk"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.stream.modulation, "qpsk");
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.radio, RadioConfig::default());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_env_override_modulation() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_iqlink_env();

        set_env("IQLINK_MODULATION", "qpsk");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stream.modulation, "qpsk");
        assert!(!config.stream.continuous); // Not overridden

        clear_iqlink_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_iqlink_env();

        set_env("IQLINK_MODULATION", "qpsk");
        set_env("IQLINK_RESULTS_DIR", "/var/tmp/iq");
        set_env("IQLINK_CONTINUOUS", "true");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.stream.modulation, "qpsk");
        assert_eq!(config.output.results_dir, PathBuf::from("/var/tmp/iq"));
        assert!(config.stream.continuous);

        clear_iqlink_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_iqlink_env();

        set_env("IQLINK_MODULATION", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stream.modulation, "bpsk");

        clear_iqlink_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [radio
            tx_gain_db = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_ends_with_iqlink_config() {
        let path = Config::default_path();
        assert!(path.ends_with("iqlink/config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_iqlink_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_to_toml_round_trips_through_load() {
        let mut config = Config::default();
        config.output.dump_format = DumpFormat::Wav;
        config.stream.continuous = true;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(config.to_toml().unwrap().as_bytes())
            .unwrap();

        assert_eq!(Config::load(temp_file.path()).unwrap(), config);
    }
}
