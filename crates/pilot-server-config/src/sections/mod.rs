// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod cache;
mod database;
mod logging;

pub use cache::{CacheBackendKind, CacheConfig, CacheConfigLayer, MAX_TTL_SECS, MIN_TTL_SECS};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
