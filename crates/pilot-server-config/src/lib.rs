// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the pilot flags service.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of cross-field rules before anything is opened
//! - Consistent environment variable naming (`PILOT_FLAGS_*`)
//!
//! # Usage
//!
//! ```ignore
//! use pilot_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("cache backend: {}", config.cache.backend);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::FlagsConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagsConfig {
	pub database: DatabaseConfig,
	pub cache: CacheConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`PILOT_FLAGS_*`)
/// 2. Config file (`/etc/pilot/flags.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<FlagsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<FlagsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<FlagsConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Merge the given sources in precedence order and finalize.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<FlagsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = FlagsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: FlagsConfigLayer) -> Result<FlagsConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let cache = layer.cache.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	if database.max_connections == 0 {
		return Err(ConfigError::Validation(
			"database.max_connections must be at least 1".to_string(),
		));
	}

	info!(
		database = %database.url,
		cache_backend = %cache.backend,
		cache_ttl_secs = cache.ttl.as_secs(),
		log_format = ?logging.format,
		"configuration loaded"
	);

	Ok(FlagsConfig {
		database,
		cache,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	/// Fixed layer standing in for the environment.
	struct StaticSource(FlagsConfigLayer);

	impl ConfigSource for StaticSource {
		fn name(&self) -> &'static str {
			"static"
		}

		fn precedence(&self) -> Precedence {
			Precedence::Environment
		}

		fn load(&self) -> Result<FlagsConfigLayer, ConfigError> {
			Ok(self.0.clone())
		}
	}

	fn write_config(content: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[test]
	fn test_defaults_only() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config, FlagsConfig::default());
	}

	#[test]
	fn test_file_overrides_defaults() {
		let file = write_config(
			"[cache]\nbackend = \"none\"\nttl_secs = 90\n\n[logging]\nformat = \"json\"\n",
		);
		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();

		assert_eq!(config.cache.backend, CacheBackendKind::None);
		assert_eq!(config.cache.ttl.as_secs(), 90);
		assert_eq!(config.logging.format, LogFormat::Json);
		assert_eq!(config.database.url, "sqlite:./pilot-flags.db");
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let file = write_config("[database]\nurl = \"sqlite:/from-file.db\"\nmax_connections = 3\n");
		let env = StaticSource(FlagsConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite:/from-env.db".to_string()),
				max_connections: None,
			}),
			..Default::default()
		});

		let config = load_from_sources(vec![
			Box::new(env),
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.database.url, "sqlite:/from-env.db");
		assert_eq!(config.database.max_connections, 3);
	}

	#[test]
	fn test_redis_without_url_fails_validation() {
		let file = write_config("[cache]\nbackend = \"redis\"\n");
		let err = load_from_sources(vec![Box::new(TomlSource::new(file.path()))]).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_zero_connections_rejected() {
		let file = write_config("[database]\nmax_connections = 0\n");
		let err = load_from_sources(vec![Box::new(TomlSource::new(file.path()))]).unwrap_err();
		assert!(err.to_string().contains("max_connections"));
	}
}
