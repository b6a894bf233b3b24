use crate::core::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use crate::error::{BlockchainError, Result};
use log::warn;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::load().unwrap_or_else(|e| {
        warn!("Ignoring configuration file: {e}");
        Config::new()
    })
});

const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
const DEFAULT_DB_PATH: &str = "./data/ledger";
const DEFAULT_LOG_LEVEL: &str = "info";

const CONFIG_FILE_ENV: &str = "LEDGER_CONFIG";

const DB_PATH_KEY: &str = "db_path";
const DIFFICULTY_KEY: &str = "difficulty";
const LOG_LEVEL_KEY: &str = "log_level";

// (config key, environment variable)
const ENV_OVERRIDES: [(&str, &str); 3] = [
    (DB_PATH_KEY, "LEDGER_DB_PATH"),
    (DIFFICULTY_KEY, "LEDGER_DIFFICULTY"),
    (LOG_LEVEL_KEY, "LEDGER_LOG_LEVEL"),
];

/// Typed snapshot of the configuration, consumed by `Blockchain::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub difficulty: u32,
    pub log_level: String,
}

impl Settings {
    pub fn new(db_path: impl Into<PathBuf>, difficulty: u32) -> Settings {
        Settings {
            db_path: db_path.into(),
            difficulty,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Layered key/value configuration: defaults, then an optional TOML file,
/// then `LEDGER_*` environment variables.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults overlaid with environment variables.
    pub fn new() -> Config {
        let mut map = Self::defaults();
        apply_env(&mut map);
        Config {
            inner: RwLock::new(map),
        }
    }

    /// Defaults, the file named by `LEDGER_CONFIG` (or `ledger.toml` when it
    /// exists), then environment variables.
    pub fn load() -> Result<Config> {
        let path = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::new()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let mut map = Self::defaults();
        apply_toml(&mut map, text)?;
        apply_env(&mut map);
        Ok(Config {
            inner: RwLock::new(map),
        })
    }

    fn defaults() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(DB_PATH_KEY.to_string(), DEFAULT_DB_PATH.to_string());
        map.insert(DIFFICULTY_KEY.to_string(), DEFAULT_DIFFICULTY.to_string());
        map.insert(LOG_LEVEL_KEY.to_string(), DEFAULT_LOG_LEVEL.to_string());
        map
    }

    fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key.to_string(), value);
    }

    pub fn get_db_path(&self) -> PathBuf {
        PathBuf::from(self.get(DB_PATH_KEY).unwrap_or_else(|| DEFAULT_DB_PATH.to_string()))
    }

    pub fn set_db_path(&self, path: &Path) {
        self.set(DB_PATH_KEY, path.to_string_lossy().to_string());
    }

    pub fn get_difficulty(&self) -> Result<u32> {
        let raw = self
            .get(DIFFICULTY_KEY)
            .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string());
        let difficulty = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| BlockchainError::Config(format!("Invalid difficulty: {raw:?}")))?;
        if !(1..=MAX_DIFFICULTY).contains(&difficulty) {
            return Err(BlockchainError::Config(format!(
                "Difficulty must be between 1 and {MAX_DIFFICULTY}, got {difficulty}"
            )));
        }
        Ok(difficulty)
    }

    pub fn set_difficulty(&self, difficulty: u32) {
        self.set(DIFFICULTY_KEY, difficulty.to_string());
    }

    pub fn get_log_level(&self) -> String {
        self.get(LOG_LEVEL_KEY)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            db_path: self.get_db_path(),
            difficulty: self.get_difficulty()?,
            log_level: self.get_log_level(),
        })
    }
}

fn apply_toml(map: &mut HashMap<String, String>, text: &str) -> Result<()> {
    let table = text
        .parse::<toml::Table>()
        .map_err(|e| BlockchainError::Config(format!("Invalid configuration file: {e}")))?;

    for (key, value) in table {
        if !ENV_OVERRIDES.iter().any(|(known, _)| *known == key) {
            warn!("Unknown configuration key {key:?}");
            continue;
        }
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            other => {
                return Err(BlockchainError::Config(format!(
                    "Unsupported value for {key}: {other}"
                )))
            }
        };
        map.insert(key, value);
    }
    Ok(())
}

fn apply_env(map: &mut HashMap<String, String>) {
    for (key, var) in ENV_OVERRIDES {
        if let Ok(value) = env::var(var) {
            map.insert(key.to_string(), value);
        }
    }
}
