// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for pilot feature flags.
//!
//! This crate provides the shared data shapes for feature flags and their pilot
//! whitelists, the check request/result contract, and the dotted-version comparator
//! used for minimum-version gating. It performs no I/O; persistence, caching and
//! evaluation live in `pilot-server-flags`.
//!
//! # Overview
//!
//! - A [`FeatureFlag`] is a named boolean toggle that owns its [`PilotWhitelistEntry`]
//!   records by value
//! - A whitelist entry admits one subject, optionally constrained by user type,
//!   minimum app version and expiry
//! - A [`CheckResult`] always carries a [`CheckReason`]
//!
//! # Example
//!
//! ```
//! use pilot_flags_core::{is_at_least, CheckReason, CheckRequest};
//!
//! let request = CheckRequest::new("OpenBankingPilot", "CUST001").with_app_version("1.2.0");
//! assert!(request.has_required_fields());
//! assert!(is_at_least("1.2", "1.2.0"));
//! assert_eq!(CheckReason::PilotUser.to_string(), "pilot user");
//! ```

pub mod check;
pub mod error;
pub mod flag;
pub mod version;
pub mod whitelist;

pub use check::{CheckReason, CheckRequest, CheckResult};
pub use error::{FlagsError, Result};
pub use flag::{CreateFlagRequest, FeatureFlag, FlagId, UpdateFlagRequest};
pub use version::{is_at_least, AppVersion};
pub use whitelist::{CreateWhitelistEntryRequest, PilotWhitelistEntry, WhitelistEntryId};
