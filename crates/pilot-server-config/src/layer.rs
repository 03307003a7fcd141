// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration, as read from one source.

use serde::Deserialize;

use crate::sections::{CacheConfigLayer, DatabaseConfigLayer, LoggingConfigLayer};

/// One source's view of the configuration. Unset sections and fields defer to lower
/// precedence sources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagsConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl FlagsConfigLayer {
	pub fn merge(&mut self, other: FlagsConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.cache, other.cache, CacheConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sections::CacheBackendKind;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = FlagsConfigLayer::default();
		base.merge(FlagsConfigLayer {
			cache: Some(CacheConfigLayer {
				ttl_secs: Some(60),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.cache.unwrap().ttl_secs, Some(60));
	}

	#[test]
	fn test_merge_is_field_wise() {
		let mut base = FlagsConfigLayer {
			cache: Some(CacheConfigLayer {
				backend: Some(CacheBackendKind::Redis),
				redis_url: Some("redis://cache:6379".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(FlagsConfigLayer {
			cache: Some(CacheConfigLayer {
				ttl_secs: Some(120),
				..Default::default()
			}),
			..Default::default()
		});

		let cache = base.cache.unwrap();
		assert_eq!(cache.backend, Some(CacheBackendKind::Redis));
		assert_eq!(cache.redis_url.as_deref(), Some("redis://cache:6379"));
		assert_eq!(cache.ttl_secs, Some(120));
	}

	#[test]
	fn test_unknown_section_rejected() {
		let result: Result<FlagsConfigLayer, _> = toml::from_str("[http]\nport = 80\n");
		assert!(result.is_err());
	}
}
