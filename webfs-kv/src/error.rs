//! The two failure modes a KV transaction can surface to its caller.
//!
//! "Not found" is deliberately *not* a variant here: a missing value is a
//! normal `Ok(None)` result, not an error (spec §4.1). Only an aborted
//! transaction or an infrastructure failure (the database could not be
//! opened, a schema upgrade failed, a callback across the IndexedDB
//! boundary panicked) are errors.

use std::fmt;

/// Why a transaction was aborted.
///
/// Threading an explicit cause out of the abort call (rather than having
/// every caller assume "any abort means the parent was missing") is the
/// conservative reading of the open question in spec.md §9: the record
/// store only rewrites `ParentRequired` into `NotDir`; every other cause
/// is surfaced to the caller verbatim as `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
	/// The parent-required probe found a missing or non-directory parent.
	ParentRequired,
	/// Some other listener or op-builder called `abort()` with a reason
	/// of its own.
	Explicit(String),
}

impl fmt::Display for AbortReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AbortReason::ParentRequired => write!(f, "parent directory is missing or not a directory"),
			AbortReason::Explicit(reason) => write!(f, "{reason}"),
		}
	}
}

/// Failure surfaced by the KV transaction layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// The transaction ended via `abort()` rather than `commit()`.
	Aborted(AbortReason),
	/// The database couldn't be opened, a schema upgrade failed, or a
	/// runtime call on the other side of the storage boundary panicked.
	Infrastructure(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Aborted(reason) => write!(f, "transaction aborted: {reason}"),
			Error::Infrastructure(msg) => write!(f, "infrastructure error: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
