use crate::error::MetricsError;
use crate::ingest::timestamp::TimestampParser;
use crate::query::aggregate::{MetricsOptions, DEFAULT_ROUND_DECIMALS};
use crate::query::engine::{InMemoryEngine, SessionMetricsEngine};
use crate::query::sessions::DuckDbEngine;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Which engine runs the aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    InMemory,
    Duckdb,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in_memory" | "in-memory" | "memory" => Ok(Self::InMemory),
            "duckdb" => Ok(Self::Duckdb),
            other => Err(format!("unknown engine: {other}")),
        }
    }
}

/// Library configuration loaded from a TOML file and environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_round_decimals")]
    pub round_decimals: u32,
    /// Extra `chrono` layouts tried after the built-in ones.
    #[serde(default)]
    pub timestamp_formats: Vec<String>,
    #[serde(default)]
    pub engine: EngineKind,
}

const fn default_round_decimals() -> u32 {
    DEFAULT_ROUND_DECIMALS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            round_decimals: default_round_decimals(),
            timestamp_formats: Vec::new(),
            engine: EngineKind::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `SESSION_METRICS_ROUND_DECIMALS` → round_decimals
    /// - `SESSION_METRICS_TIMESTAMP_FORMATS` → timestamp_formats (comma-separated)
    /// - `SESSION_METRICS_ENGINE` → engine (`in_memory` or `duckdb`)
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        if let Ok(val) = std::env::var("SESSION_METRICS_ROUND_DECIMALS") {
            if let Ok(d) = val.parse() {
                config.round_decimals = d;
            }
        }
        if let Ok(val) = std::env::var("SESSION_METRICS_TIMESTAMP_FORMATS") {
            config.timestamp_formats = val
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("SESSION_METRICS_ENGINE") {
            match val.parse() {
                Ok(engine) => config.engine = engine,
                Err(e) => tracing::warn!("Ignoring SESSION_METRICS_ENGINE: {e}"),
            }
        }

        config
    }

    pub fn options(&self) -> MetricsOptions {
        MetricsOptions {
            round_decimals: self.round_decimals,
            parser: TimestampParser::new(self.timestamp_formats.clone()),
        }
    }

    /// Build the configured engine.
    pub fn build_engine(&self) -> Result<Box<dyn SessionMetricsEngine>, MetricsError> {
        let options = self.options();
        Ok(match self.engine {
            EngineKind::InMemory => Box::new(InMemoryEngine::new(options)),
            EngineKind::Duckdb => Box::new(DuckDbEngine::open_in_memory(options)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that call `Config::load`, which reads environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.round_decimals, 2);
        assert!(config.timestamp_formats.is_empty());
        assert_eq!(config.engine, EngineKind::InMemory);
    }

    #[test]
    fn test_load_from_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(
            file,
            r#"
round_decimals = 3
timestamp_formats = ["%d/%m/%Y %H:%M:%S"]
engine = "duckdb"
"#
        )
        .unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config.round_decimals, 3);
        assert_eq!(config.timestamp_formats, vec!["%d/%m/%Y %H:%M:%S"]);
        assert_eq!(config.engine, EngineKind::Duckdb);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "engine = \"in_memory\"\n").unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.round_decimals, 2);
    }

    #[test]
    fn test_load_no_path_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load(None);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "this is not valid toml {{{").unwrap();

        let config = Config::load(Some(&config_path));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_var_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var("SESSION_METRICS_ROUND_DECIMALS", "4");
        std::env::set_var("SESSION_METRICS_TIMESTAMP_FORMATS", "%d/%m/%Y, %Y%m%d%H%M%S");
        std::env::set_var("SESSION_METRICS_ENGINE", "duckdb");
        let config = Config::load(None);
        std::env::remove_var("SESSION_METRICS_ROUND_DECIMALS");
        std::env::remove_var("SESSION_METRICS_TIMESTAMP_FORMATS");
        std::env::remove_var("SESSION_METRICS_ENGINE");

        assert_eq!(config.round_decimals, 4);
        assert_eq!(config.timestamp_formats, vec!["%d/%m/%Y", "%Y%m%d%H%M%S"]);
        assert_eq!(config.engine, EngineKind::Duckdb);
    }

    #[test]
    fn test_bad_engine_env_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SESSION_METRICS_ENGINE", "spark");
        let config = Config::load(None);
        std::env::remove_var("SESSION_METRICS_ENGINE");
        assert_eq!(config.engine, EngineKind::InMemory);
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("DuckDB".parse::<EngineKind>(), Ok(EngineKind::Duckdb));
        assert_eq!("in-memory".parse::<EngineKind>(), Ok(EngineKind::InMemory));
        assert!("spark".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_options_carry_formats() {
        let config = Config {
            round_decimals: 1,
            timestamp_formats: vec!["%d.%m.%Y".to_string()],
            engine: EngineKind::InMemory,
        };
        let options = config.options();
        assert_eq!(options.round_decimals, 1);
        assert_eq!(options.parser.extra_formats(), ["%d.%m.%Y".to_string()]);
    }

    #[test]
    fn test_build_engine_each_kind() {
        for engine in [EngineKind::InMemory, EngineKind::Duckdb] {
            let config = Config {
                engine,
                ..Config::default()
            };
            let engine = config.build_engine().unwrap();
            let table = crate::ingest::table::InteractionTable::from_records(&[]);
            assert!(engine.compute(&table, 1).unwrap().is_empty());
        }
    }
}
