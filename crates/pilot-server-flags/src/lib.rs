// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pilot feature flags server implementation.
//!
//! This crate provides flag persistence, the read-through cache, the evaluation engine
//! and the management operations that keep the cache consistent with writes.
//!
//! # Architecture
//!
//! - `repository` - `FlagStore` trait and its SQLite implementation
//! - `cache` - Cache backends and the non-raising cache-aside layer
//! - `evaluation` - Pilot decision rules and the engine that resolves snapshots
//! - `invalidation` - Purges both cache namespaces after a mutation
//! - `service` - Flag and whitelist management, cache refresh
//! - `seed` - Demo flags
//!
//! # Example
//!
//! ```ignore
//! use pilot_server_flags::{FlagCache, FlagsService, SqliteFlagStore, CheckRequest};
//!
//! let pool = pilot_server_flags::db::create_pool("sqlite:./pilot-flags.db", 5).await?;
//! pilot_server_flags::db::run_migrations(&pool).await?;
//!
//! let service = FlagsService::new(Arc::new(SqliteFlagStore::new(pool)), FlagCache::in_memory());
//! let result = service
//! 	.check_flag(&CheckRequest::new("OpenBankingPilot", "CUST001").with_app_version("1.2.0"))
//! 	.await;
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod invalidation;
pub mod repository;
pub mod seed;
pub mod service;

pub use cache::{CacheBackend, CacheError, FlagCache, FlagCacheConfig, InMemoryCache, NoopCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use error::{FlagsServerError, Result};
pub use evaluation::{evaluate_pilot, EvaluationEngine};
pub use invalidation::InvalidationCoordinator;
pub use repository::{FlagStore, SqliteFlagStore};
pub use seed::seed_demo_flags;
pub use service::FlagsService;

// Re-export core types for convenience
pub use pilot_flags_core::*;
