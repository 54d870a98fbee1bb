use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cryptai_relay::{DEFAULT_MODEL, DEFAULT_RELAY_URL, RelayConfig};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::{ConversationConfig, DEFAULT_EXPLORER_BASE};

pub const SETTINGS_DIRECTORY_NAME: &str = "cryptai";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Environment variables with this prefix override the settings file.
/// Nested keys are split on `__`, e.g. `CRYPTAI_TIMINGS__CLEAR_DELAY_MS`.
pub const ENV_PREFIX: &str = "CRYPTAI_";

const DEFAULT_REVEAL_INTERVAL_MS: u64 = 10;
const DEFAULT_PROOF_POLL_INTERVAL_MS: u64 = 2_500;
const DEFAULT_PROOF_TIMEOUT_MS: u64 = 45_000;
const DEFAULT_CLEAR_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_explorer_base")]
    pub explorer_base: String,
    /// Per-request timeout for relay calls; unset means no client timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub timings: TimingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub reveal_interval_ms: u64,
    pub proof_poll_interval_ms: u64,
    pub proof_timeout_ms: u64,
    pub clear_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            model: default_model(),
            explorer_base: default_explorer_base(),
            request_timeout_secs: None,
            timings: TimingSettings::default(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            reveal_interval_ms: DEFAULT_REVEAL_INTERVAL_MS,
            proof_poll_interval_ms: DEFAULT_PROOF_POLL_INTERVAL_MS,
            proof_timeout_ms: DEFAULT_PROOF_TIMEOUT_MS,
            clear_delay_ms: DEFAULT_CLEAR_DELAY_MS,
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.relay_url = non_blank_or(self.relay_url, default_relay_url);
        self.model = non_blank_or(self.model, default_model);
        self.explorer_base = non_blank_or(self.explorer_base, default_explorer_base);
        self.request_timeout_secs = self.request_timeout_secs.filter(|secs| *secs > 0);
        self.timings = self.timings.normalized();
        self
    }

    pub fn relay_config(&self) -> RelayConfig {
        let config = RelayConfig::new(&self.relay_url);
        match self.request_timeout_secs {
            Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            model: self.model.clone(),
            explorer_base: self.explorer_base.clone(),
            reveal_interval: Duration::from_millis(self.timings.reveal_interval_ms),
            poll_interval: Duration::from_millis(self.timings.proof_poll_interval_ms),
            proof_timeout: Duration::from_millis(self.timings.proof_timeout_ms),
            clear_delay: Duration::from_millis(self.timings.clear_delay_ms),
        }
    }
}

impl TimingSettings {
    fn normalized(self) -> Self {
        let defaults = Self::default();
        let or_default = |value: u64, fallback: u64| if value == 0 { fallback } else { value };
        Self {
            reveal_interval_ms: or_default(self.reveal_interval_ms, defaults.reveal_interval_ms),
            proof_poll_interval_ms: or_default(
                self.proof_poll_interval_ms,
                defaults.proof_poll_interval_ms,
            ),
            proof_timeout_ms: or_default(self.proof_timeout_ms, defaults.proof_timeout_ms),
            // A zero delay is a valid choice: clear without the dissolve.
            clear_delay_ms: self.clear_delay_ms,
        }
    }
}

pub struct SettingsStore {
    settings: Arc<Settings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".cryptai"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    /// Writes a default settings file when none exists yet. Returns whether one was written.
    ///
    /// The loaded settings are left untouched, so environment overrides stay in effect.
    pub fn ensure_file(&self) -> Result<bool, SettingsError> {
        if self.config_path.exists() {
            return Ok(false);
        }
        self.persist(&Settings::default())?;
        Ok(true)
    }

    fn load_from_disk(path: &Path) -> Settings {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "failed to parse settings, using defaults"
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = %self.config_path.display(), "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_explorer_base() -> String {
    DEFAULT_EXPLORER_BASE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn store_in(jail: &Jail) -> SettingsStore {
        SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME))
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let store = store_in(jail);
            assert_eq!(*store.settings(), Settings::default());
            assert_eq!(store.settings().conversation_config(), ConversationConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_values_override_defaults_and_are_trimmed() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{
                    "relay_url": " https://relay.example/ ",
                    "request_timeout_secs": 30,
                    "timings": { "clear_delay_ms": 500 }
                }"#,
            )?;

            let settings = store_in(jail).settings();
            assert_eq!(settings.relay_url, "https://relay.example/");
            assert_eq!(settings.model, DEFAULT_MODEL);
            assert_eq!(settings.timings.clear_delay_ms, 500);
            assert_eq!(settings.timings.proof_timeout_ms, DEFAULT_PROOF_TIMEOUT_MS);

            let relay = settings.relay_config();
            assert_eq!(relay.base_url, "https://relay.example");
            assert_eq!(relay.request_timeout, Some(Duration::from_secs(30)));
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, r#"{ "model": "from-file" }"#)?;
            jail.set_env("CRYPTAI_MODEL", "from-env");
            jail.set_env("CRYPTAI_TIMINGS__PROOF_TIMEOUT_MS", "1000");

            let config = store_in(jail).settings().conversation_config();
            assert_eq!(config.model, "from-env");
            assert_eq!(config.proof_timeout, Duration::from_secs(1));
            assert_eq!(config.poll_interval, Duration::from_millis(2_500));
            Ok(())
        });
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, "{ not json")?;
            assert_eq!(*store_in(jail).settings(), Settings::default());
            Ok(())
        });
    }

    #[test]
    fn blank_and_zero_values_normalize_to_defaults() {
        let settings = Settings {
            relay_url: "   ".to_string(),
            model: String::new(),
            explorer_base: " https://scan.example/tx/ ".to_string(),
            request_timeout_secs: Some(0),
            timings: TimingSettings {
                reveal_interval_ms: 0,
                proof_poll_interval_ms: 0,
                proof_timeout_ms: 0,
                clear_delay_ms: 0,
            },
        }
        .normalized();

        assert_eq!(settings.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.explorer_base, "https://scan.example/tx/");
        assert_eq!(settings.request_timeout_secs, None);
        assert_eq!(settings.timings.reveal_interval_ms, DEFAULT_REVEAL_INTERVAL_MS);
        assert_eq!(settings.timings.clear_delay_ms, 0);
    }

    #[test]
    fn ensure_file_seeds_defaults_once() {
        Jail::expect_with(|jail| {
            jail.set_env("CRYPTAI_MODEL", "from-env");
            let path = jail.directory().join("nested").join(SETTINGS_FILE_NAME);
            let store = SettingsStore::new(path.clone());

            assert!(store.ensure_file().expect("settings file should be written"));
            assert!(path.exists());
            assert!(!path.with_extension("json.tmp").exists());
            assert_eq!(store.settings().model, "from-env");

            let written: Settings = serde_json::from_str(&std::fs::read_to_string(&path).unwrap())
                .expect("seeded file should parse");
            assert_eq!(written, Settings::default());

            assert!(!store.ensure_file().expect("existing file is left alone"));
            Ok(())
        });
    }
}
