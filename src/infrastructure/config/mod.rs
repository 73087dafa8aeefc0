//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::application::services::{BotSettings, LoaderSettings};
use crate::domain::traits::ParseMode;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub telegram: TelegramConfig,
    pub session: SessionConfig,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub debug: bool,
    pub parse_mode: Option<ParseMode>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub poll_timeout_secs: u64,
    pub api_base: String,
}

/// Lifetimes of per-chat session state
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    pub layer_ttl_hours: u64,
    pub layer_sweep_minutes: u64,
    pub busy_stale_secs: u64,
    pub busy_sweep_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoaderConfig {
    pub tick_millis: u64,
    pub max_ticks: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "chatlayer".to_string(),
            debug: false,
            parse_mode: Some(ParseMode::Html),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll_timeout_secs: 60,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layer_ttl_hours: 24,
            layer_sweep_minutes: 10,
            busy_stale_secs: 60,
            busy_sweep_secs: 60,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            tick_millis: 2000,
            max_ticks: 20,
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Let `BOT_TOKEN` and `BOT_DEBUG` override the file
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.is_empty() {
                self.telegram.token = Some(token);
            }
        }

        if let Ok(debug) = std::env::var("BOT_DEBUG") {
            self.bot.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("session.layer-ttl-hours", self.session.layer_ttl_hours),
            ("session.layer-sweep-minutes", self.session.layer_sweep_minutes),
            ("session.busy-stale-secs", self.session.busy_stale_secs),
            ("session.busy-sweep-secs", self.session.busy_sweep_secs),
            ("loader.tick-millis", self.loader.tick_millis),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        if let Some((field, _)) = zero {
            return Err(ConfigError::InvalidValue(format!("{field} must be greater than zero")));
        }

        self.session.layer_ttl()?;
        self.session.layer_sweep_every()?;
        self.session.busy_stale_after()?;
        Ok(())
    }
}

fn out_of_range(field: &str) -> ConfigError {
    ConfigError::InvalidValue(format!("{field} is too large"))
}

impl SessionConfig {
    /// Layer lifetime; layers built now must still get a representable deadline
    fn layer_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        let ttl = i64::try_from(self.layer_ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| out_of_range("session.layer-ttl-hours"))?;
        chrono::Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| out_of_range("session.layer-ttl-hours"))?;
        Ok(ttl)
    }

    fn layer_sweep_every(&self) -> Result<Duration, ConfigError> {
        self.layer_sweep_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| out_of_range("session.layer-sweep-minutes"))
    }

    fn busy_stale_after(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.busy_stale_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| out_of_range("session.busy-stale-secs"))
    }
}

impl TryFrom<&Config> for BotSettings {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        config.validate()?;
        let session = &config.session;
        Ok(Self {
            debug: config.bot.debug,
            parse_mode: config.bot.parse_mode,
            layer_ttl: session.layer_ttl()?,
            layer_sweep_every: session.layer_sweep_every()?,
            busy_stale_after: session.busy_stale_after()?,
            busy_sweep_every: Duration::from_secs(session.busy_sweep_secs),
            loader: LoaderSettings {
                tick: Duration::from_millis(config.loader.tick_millis),
                max_ticks: config.loader.max_ticks,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_constants() {
        let config = Config::default();
        assert_eq!(config.session.layer_ttl_hours, 24);
        assert_eq!(config.session.layer_sweep_minutes, 10);
        assert_eq!(config.session.busy_stale_secs, 60);
        assert_eq!(config.loader.tick_millis, 2000);
        assert_eq!(config.loader.max_ticks, 20);
        assert_eq!(config.bot.parse_mode, Some(ParseMode::Html));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
bot:
  name: joke-bot
  debug: true
  parse-mode: MarkdownV2
session:
  layer-ttl-hours: 2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.bot.name, "joke-bot");
        assert!(config.bot.debug);
        assert_eq!(config.bot.parse_mode, Some(ParseMode::MarkdownV2));
        assert_eq!(config.session.layer_ttl_hours, 2);
        assert_eq!(config.session.layer_sweep_minutes, 10);
        assert_eq!(config.telegram.poll_timeout_secs, 60);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = Config::from_yaml("session:\n  busy-sweep-secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("busy-sweep-secs"));
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let err = Config::from_yaml("session:\n  layer-ttl-hours: 1000000000000\n").unwrap_err();
        assert!(err.to_string().contains("layer-ttl-hours"));

        let err = Config::from_yaml("session:\n  layer-ttl-hours: 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = Config::from_yaml("session:\n  busy-stale-secs: 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("busy-stale-secs"));

        let err = Config::from_yaml("session:\n  layer-sweep-minutes: 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("layer-sweep-minutes"));
    }

    #[test]
    fn test_settings_refuse_unvalidated_config() {
        let mut config = Config::default();
        config.session.layer_ttl_hours = 1_000_000_000_000;
        assert!(BotSettings::try_from(&config).is_err());
    }

    #[test]
    fn test_bot_settings_from_config() {
        let mut config = Config::default();
        config.bot.debug = true;
        config.session.layer_ttl_hours = 2;
        config.session.busy_stale_secs = 30;

        let settings = BotSettings::try_from(&config).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.layer_ttl, chrono::Duration::hours(2));
        assert_eq!(settings.layer_sweep_every, Duration::from_secs(600));
        assert_eq!(settings.busy_stale_after, chrono::Duration::seconds(30));
        assert_eq!(settings.loader.tick, Duration::from_millis(2000));
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = Config::default().to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.bot.name, "chatlayer");
        assert_eq!(parsed.telegram.api_base, "https://api.telegram.org");
    }
}
