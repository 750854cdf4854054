use std::fs;
use std::path::Path;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub waxpulse: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const WAXPULSE_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            waxpulse: Self::WAXPULSE_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.waxpulse.clone();
        self.waxpulse = self.waxpulse.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.waxpulse.as_str()) {
            eprintln!(
                "Config error: waxpulse log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::WAXPULSE_LEVEL
            );
            self.waxpulse = Self::WAXPULSE_LEVEL.to_owned();
        }
    }
}

/// Discogs credentials. The personal access token authenticates every
/// request; the username scopes collection and wantlist lookups.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RemoteConfig {
    pub username: String,
    pub token: String,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.token.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SyncConfig {
    threads: usize,
    batch_size: usize,
    staleness_hours: i64,
    batch_pause_secs: u64,
}

impl SyncConfig {
    // The Discogs rate limit is the bottleneck, not local compute
    pub const MAX_THREADS: usize = 16;

    const DEFAULT_THREADS: usize = 8;
    const DEFAULT_BATCH_SIZE: usize = 25;
    const DEFAULT_STALENESS_HOURS: i64 = 24;
    const DEFAULT_BATCH_PAUSE_SECS: u64 = 2;

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn staleness_hours(&self) -> i64 {
        self.staleness_hours
    }

    pub fn batch_pause_secs(&self) -> u64 {
        self.batch_pause_secs
    }

    fn default() -> Self {
        SyncConfig {
            threads: Self::DEFAULT_THREADS,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            staleness_hours: Self::DEFAULT_STALENESS_HOURS,
            batch_pause_secs: Self::DEFAULT_BATCH_PAUSE_SECS,
        }
    }

    fn ensure_valid(&mut self) {
        if self.threads == 0 || self.threads > Self::MAX_THREADS {
            eprintln!(
                "Config error: sync thread count of {} is invalid - using default of {}",
                self.threads,
                Self::DEFAULT_THREADS
            );
            self.threads = Self::DEFAULT_THREADS;
        }
        if self.batch_size == 0 {
            eprintln!(
                "Config error: batch size of 0 is invalid - using default of {}",
                Self::DEFAULT_BATCH_SIZE
            );
            self.batch_size = Self::DEFAULT_BATCH_SIZE;
        }
        if self.staleness_hours < 0 {
            eprintln!(
                "Config error: staleness of {} hours is invalid - using default of {}",
                self.staleness_hours,
                Self::DEFAULT_STALENESS_HOURS
            );
            self.staleness_hours = Self::DEFAULT_STALENESS_HOURS;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's data
    /// directory, merged over defaults and under `WAXPULSE_*` environment
    /// variables. If the file is missing, the defaults are written to disk
    /// so the user has something to edit.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = project_dirs.data_local_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Self {
        let default_config = Config::default();

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("WAXPULSE_").split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.sync.ensure_valid();
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        figment::Jail::expect_with(|_jail| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.toml");

            let config = Config::load_from(&path);
            assert_eq!(config.sync.threads(), SyncConfig::DEFAULT_THREADS);
            assert_eq!(config.sync.staleness_hours(), 24);
            assert!(!config.remote.is_configured());
            assert!(path.exists(), "default config should be written");
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|_jail| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.toml");
            fs::write(
                &path,
                r#"
[logging]
waxpulse = "debug"

[remote]
username = "collector"
token = "tok123"

[sync]
threads = 4
batch_size = 10
staleness_hours = 12
batch_pause_secs = 1
"#,
            )
            .unwrap();

            let config = Config::load_from(&path);
            assert_eq!(config.logging.waxpulse, "debug");
            assert_eq!(config.remote.username, "collector");
            assert!(config.remote.is_configured());
            assert_eq!(config.sync.threads(), 4);
            assert_eq!(config.sync.batch_size(), 10);
            assert_eq!(config.sync.staleness_hours(), 12);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.toml");
            fs::write(
                &path,
                r#"
[logging]
waxpulse = "verbose"

[sync]
threads = 99
"#,
            )
            .unwrap();

            let config = Config::load_from(&path);
            assert_eq!(config.logging.waxpulse, "info");
            assert_eq!(config.sync.threads(), SyncConfig::DEFAULT_THREADS);
            Ok(())
        });
    }
}
