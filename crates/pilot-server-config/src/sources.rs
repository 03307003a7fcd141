// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML files and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::FlagsConfigLayer;
use crate::sections::{CacheConfigLayer, DatabaseConfigLayer, LoggingConfigLayer};

/// Default location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/pilot/flags.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<FlagsConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<FlagsConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(FlagsConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<FlagsConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(FlagsConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: FlagsConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: PILOT_FLAGS_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<FlagsConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(FlagsConfigLayer {
			database: Some(load_database_from_env()?),
			cache: Some(load_cache_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("'{v}': {e}"),
		}),
		None => Ok(None),
	}
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("PILOT_FLAGS_DATABASE_URL"),
		max_connections: env_parse("PILOT_FLAGS_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_cache_from_env() -> Result<CacheConfigLayer, ConfigError> {
	Ok(CacheConfigLayer {
		backend: env_parse("PILOT_FLAGS_CACHE_BACKEND")?,
		redis_url: env_var("PILOT_FLAGS_REDIS_URL"),
		ttl_secs: env_parse("PILOT_FLAGS_CACHE_TTL_SECS")?,
		operation_timeout_ms: env_parse("PILOT_FLAGS_CACHE_OPERATION_TIMEOUT_MS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("PILOT_FLAGS_LOG_LEVEL"),
		format: env_parse("PILOT_FLAGS_LOG_FORMAT")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sections::CacheBackendKind;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.cache.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/flags.toml").load().unwrap();
		assert!(layer.cache.is_none());
	}

	#[test]
	fn test_toml_source_reads_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[database]
url = "sqlite:/tmp/flags.db"

[cache]
backend = "redis"
redis_url = "redis://127.0.0.1:6379"
ttl_secs = 600
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("sqlite:/tmp/flags.db")
		);
		let cache = layer.cache.unwrap();
		assert_eq!(cache.backend, Some(CacheBackendKind::Redis));
		assert_eq!(cache.ttl_secs, Some(600));
		assert!(layer.logging.is_none());
	}

	#[test]
	fn test_toml_source_parse_error_names_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[cache]\nttl_secs = \"soon\"").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_parse_reports_key() {
		std::env::set_var("PILOT_FLAGS_TEST_ENV_PARSE_BAD", "many");
		let err = env_parse::<u32>("PILOT_FLAGS_TEST_ENV_PARSE_BAD").unwrap_err();
		assert!(err.to_string().contains("PILOT_FLAGS_TEST_ENV_PARSE_BAD"));

		std::env::set_var("PILOT_FLAGS_TEST_ENV_PARSE_GOOD", "42");
		assert_eq!(
			env_parse::<u32>("PILOT_FLAGS_TEST_ENV_PARSE_GOOD").unwrap(),
			Some(42)
		);
		assert_eq!(env_parse::<u32>("PILOT_FLAGS_TEST_ENV_PARSE_UNSET").unwrap(), None);
	}
}
