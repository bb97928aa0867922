//! Error taxonomy shared by every layer of the webfs storage stack.
//!
//! Kept as its own crate so `webfs-kv`, `webfs-store` and `webfs-fs` all
//! speak the same error vocabulary instead of each inventing local
//! `io::Error`-alikes that need translating at every boundary.

/// The kinds of failure a caller of the filesystem API can observe.
///
/// Errors are values, never panics: a runtime-thrown value crossing an
/// IndexedDB callback boundary is caught and converted to
/// [`Error::Infrastructure`] at the one place (`webfs-kv`'s request
/// plumbing) that talks to the browser, and never allowed to propagate
/// as an actual panic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	/// `path` has no info record.
	#[error("{0}: no such file or directory")]
	NotExist(String),

	/// A path operation required a directory parent that is absent or
	/// not a directory. This is also the translation target for a
	/// writeback transaction aborted by the parent-required probe.
	#[error("{0}: not a directory")]
	NotDir(String),

	/// A mount already exists at `path`, or `path` is the root.
	#[error("{0}: already exists")]
	Exist(String),

	/// A directory rename was attempted across two different mounts.
	#[error("cross-device link")]
	CrossDevice,

	/// The operation is not supported: deleting a mount root, or the
	/// filesystem root.
	#[error("{0}: operation not supported")]
	NotSupported(String),

	/// A transaction was aborted for a reason other than the
	/// parent-required probe. Surfaced to the caller verbatim.
	#[error("transaction aborted: {0}")]
	Aborted(String),

	/// The database could not be opened, a schema upgrade failed, or a
	/// runtime call on the other side of the storage boundary panicked.
	#[error("storage infrastructure error: {0}")]
	Infrastructure(String),
}

impl Error {
	/// Whether this error is the [`Error::NotExist`] variant, a common
	/// check at call sites that treat "missing" as non-fatal.
	pub fn is_not_exist(&self) -> bool {
		matches!(self, Error::NotExist(_))
	}
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_not_exist_only_matches_that_variant() {
		assert!(Error::NotExist("/a".into()).is_not_exist());
		assert!(!Error::NotDir("/a".into()).is_not_exist());
		assert!(!Error::CrossDevice.is_not_exist());
	}

	#[test]
	fn display_messages_are_human_readable() {
		assert_eq!(Error::NotExist("/a/b".into()).to_string(), "/a/b: no such file or directory");
		assert_eq!(Error::NotDir("/a".into()).to_string(), "/a: not a directory");
		assert_eq!(Error::CrossDevice.to_string(), "cross-device link");
	}
}
