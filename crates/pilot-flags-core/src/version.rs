// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dotted numeric application versions.
//!
//! A version is one to four dot-separated components of ASCII digits, e.g. `"1"`, `"1.2"`,
//! `"1.2.0"` or `"1.2.0.7"`. Missing trailing components compare as zero, so `"1.2"` and
//! `"1.2.0"` are equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::FlagsError;

/// Maximum number of dotted components.
pub const MAX_COMPONENTS: usize = 4;

/// A parsed dotted version.
#[derive(Debug, Clone, Copy)]
pub struct AppVersion {
	parts: [u32; MAX_COMPONENTS],
	len: usize,
}

impl AppVersion {
	/// Parses a dotted version string.
	pub fn parse(input: &str) -> Result<Self, FlagsError> {
		let trimmed = input.trim();
		let invalid = || FlagsError::InvalidVersion(input.to_string());

		if trimmed.is_empty() {
			return Err(invalid());
		}

		let mut parts = [0u32; MAX_COMPONENTS];
		let mut len = 0;

		for component in trimmed.split('.') {
			if len == MAX_COMPONENTS {
				return Err(invalid());
			}
			if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
				return Err(invalid());
			}
			parts[len] = component.parse().map_err(|_| invalid())?;
			len += 1;
		}

		Ok(Self { parts, len })
	}

	/// The explicitly written components.
	pub fn components(&self) -> &[u32] {
		&self.parts[..self.len]
	}
}

impl FromStr for AppVersion {
	type Err = FlagsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

// Unwritten components are stored as zero, so comparing the padded arrays gives the
// "missing trailing component is zero" rule.
impl PartialEq for AppVersion {
	fn eq(&self, other: &Self) -> bool {
		self.parts == other.parts
	}
}

impl Eq for AppVersion {}

impl PartialOrd for AppVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AppVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		self.parts.cmp(&other.parts)
	}
}

impl fmt::Display for AppVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for part in self.components() {
			if !first {
				f.write_str(".")?;
			}
			write!(f, "{part}")?;
			first = false;
		}
		Ok(())
	}
}

/// Returns true if `current` is greater than or equal to `minimum`.
///
/// Fails closed: if either string does not parse, the result is `false`.
pub fn is_at_least(current: &str, minimum: &str) -> bool {
	match (AppVersion::parse(current), AppVersion::parse(minimum)) {
		(Ok(current), Ok(minimum)) => current >= minimum,
		_ => false,
	}
}
