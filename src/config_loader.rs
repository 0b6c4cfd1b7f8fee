use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_REMOTE_TTS_URL: &str = "https://translate.google.com/translate_tts";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Online synthesis
    pub remote_enabled: bool,
    pub remote_tts_url: String,
    pub remote_timeout_secs: u64,
    // Reachability probe
    pub probe_address: String,
    pub probe_timeout_ms: u64,
    // Offline synthesis
    pub espeak_binary: String,
    pub espeak_timeout_secs: u64,
    // Playback loop
    pub poll_interval_ms: u64,
    pub default_speed: f32,  // 0.5 - 2.0
    pub default_volume: f32, // 0.0 - 1.0
    // Used when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            remote_tts_url: DEFAULT_REMOTE_TTS_URL.to_string(),
            remote_timeout_secs: 10,
            probe_address: "8.8.8.8:53".to_string(),
            probe_timeout_ms: 2000,
            espeak_binary: "espeak-ng".to_string(),
            espeak_timeout_secs: 120,
            poll_interval_ms: 100,
            default_speed: 1.0,
            default_volume: 0.8,
            log_filter: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("remote_enabled", defaults.remote_enabled)?
            .set_default("remote_tts_url", defaults.remote_tts_url)?
            .set_default("remote_timeout_secs", defaults.remote_timeout_secs)?
            .set_default("probe_address", defaults.probe_address)?
            .set_default("probe_timeout_ms", defaults.probe_timeout_ms)?
            .set_default("espeak_binary", defaults.espeak_binary)?
            .set_default("espeak_timeout_secs", defaults.espeak_timeout_secs)?
            .set_default("poll_interval_ms", defaults.poll_interval_ms)?
            .set_default("default_speed", f64::from(defaults.default_speed))?
            .set_default("default_volume", f64::from(defaults.default_volume))?
            .set_default("log_filter", defaults.log_filter)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("ReadAloud").required(false));

        if let Some(config_dir) = dirs::config_dir() {
            let user_file = config_dir.join("readaloud").join("ReadAloud");
            builder = builder.add_source(
                File::with_name(&user_file.to_string_lossy()).required(false),
            );
        }

        // Merge with environment variables (e.g. READALOUD_POLL_INTERVAL_MS)
        let settings: Settings = builder
            .add_source(Environment::with_prefix("READALOUD").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(config::ConfigError::Message(format!(
                "Invalid default_volume: {}. Must be between 0.0 and 1.0",
                self.default_volume
            )));
        }
        if !(0.5..=2.0).contains(&self.default_speed) {
            return Err(config::ConfigError::Message(format!(
                "Invalid default_speed: {}. Must be between 0.5 and 2.0",
                self.default_speed
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 || self.remote_timeout_secs == 0 || self.espeak_timeout_secs == 0
        {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn espeak_timeout(&self) -> Duration {
        Duration::from_secs(self.espeak_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(settings.poll_interval_ms > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("READALOUD_POLL_INTERVAL_MS", "40");
        std::env::set_var("READALOUD_REMOTE_ENABLED", "false");
        let settings = Settings::new();
        std::env::remove_var("READALOUD_POLL_INTERVAL_MS");
        std::env::remove_var("READALOUD_REMOTE_ENABLED");

        let settings = settings.expect("Failed to load settings");
        assert_eq!(settings.poll_interval_ms, 40);
        assert!(!settings.remote_enabled);
        assert_eq!(settings.poll_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut settings = Settings::default();
        settings.default_volume = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.default_speed = 3.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.poll_interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
