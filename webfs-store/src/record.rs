//! The in-memory `FileRecord` working form and the persisted `info` shape
//! it's extracted from (spec.md §3).
//!
//! The directory bit is Go's `os.ModeDir` (`1<<31`), not the Unix
//! `S_IFDIR` octal constant, because the original implementation stores
//! `uint32(os.FileMode)` verbatim -- matching it means an existing
//! database written by that original code stays readable bit-for-bit.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use webfs_error::{Error, Result};

/// Directory bit within `FileRecord::mode` / the persisted `Mode` field.
pub const MODE_DIR: u32 = 1 << 31;

pub fn is_dir(mode: u32) -> bool {
	mode & MODE_DIR != 0
}

/// The `info` object store's on-disk value shape (spec.md §3/§6),
/// serialized with `rmp-serde` before being handed to `webfs-kv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRaw {
	pub mode: u32,
	pub mod_time: i64,
	pub size: i64,
	/// Absent only for the root (invariant 2 of spec.md §3).
	pub parent: Option<String>,
}

impl InfoRaw {
	pub fn encode(&self) -> Vec<u8> {
		rmp_serde::to_vec(self).expect("InfoRaw always serializes")
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		rmp_serde::from_slice(bytes).map_err(|e| Error::Infrastructure(format!("corrupt info record: {e}")))
	}
}

/// What a caller hands the record store to create or update an entry.
/// `data` is ignored for directories.
#[derive(Debug, Clone)]
pub struct SetRecord {
	pub mode: u32,
	pub mtime: i64,
	pub data: Vec<u8>,
}

impl SetRecord {
	pub fn is_dir(&self) -> bool {
		is_dir(self.mode)
	}
}

/// The record store's in-memory working form of a path's info record
/// (spec.md §3). `data()` and `dir_names()` are lazy: they don't touch the
/// database until called, so a caller that only wants `mode`/`size`/`mtime`
/// never pays for a contents or index fetch.
pub struct FileRecord {
	pub mode: u32,
	pub size: i64,
	pub mtime: i64,
	data: Box<dyn Fn() -> LocalBoxFuture<'static, Result<Vec<u8>>>>,
	dir_names: Box<dyn Fn() -> LocalBoxFuture<'static, Result<Vec<String>>>>,
}

impl FileRecord {
	pub(crate) fn new(
		mode: u32,
		size: i64,
		mtime: i64,
		data: Box<dyn Fn() -> LocalBoxFuture<'static, Result<Vec<u8>>>>,
		dir_names: Box<dyn Fn() -> LocalBoxFuture<'static, Result<Vec<String>>>>,
	) -> Self {
		FileRecord { mode, size, mtime, data, dir_names }
	}

	pub fn is_dir(&self) -> bool {
		is_dir(self.mode)
	}

	pub async fn data(&self) -> Result<Vec<u8>> {
		(self.data)().await
	}

	pub async fn dir_names(&self) -> Result<Vec<String>> {
		(self.dir_names)().await
	}
}

impl std::fmt::Debug for FileRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FileRecord").field("mode", &self.mode).field("size", &self.size).field("mtime", &self.mtime).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mode_dir_bit_round_trips_through_encoding() {
		let info = InfoRaw { mode: MODE_DIR, mod_time: 1000, size: 0, parent: Some("/".into()) };
		let decoded = InfoRaw::decode(&info.encode()).unwrap();
		assert!(is_dir(decoded.mode));
		assert_eq!(decoded.parent.as_deref(), Some("/"));
	}

	#[test]
	fn root_has_no_parent() {
		let info = InfoRaw { mode: MODE_DIR, mod_time: 0, size: 0, parent: None };
		assert_eq!(InfoRaw::decode(&info.encode()).unwrap().parent, None);
	}
}
