//! The path-addressed filesystem façade (spec.md §4.4): thin by design --
//! everything interesting already lives in `webfs-store::RecordStore`.
//! This module's job is POSIX-shaped ergonomics (`open`/`mkdir`/`rename`/
//! `stat`, an fd-like `File` handle with cursor semantics) on top of it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{FutureExt, LocalBoxFuture};

use webfs_error::{Error, Result};
use webfs_store::{RecordStore, SetRecord};

use crate::clock::now_seconds;

/// `openFile` flags (spec.md §6's `openFile(flags, mode)`). Values follow
/// POSIX `open(2)` bit positions; there is no bitflags dependency in the
/// stack this crate is grounded on, so these are plain `u32` constants.
pub mod flags {
	pub const RDONLY: u32 = 0;
	pub const WRONLY: u32 = 1 << 0;
	pub const RDWR: u32 = 1 << 1;
	pub const CREATE: u32 = 1 << 2;
	pub const TRUNC: u32 = 1 << 3;
	pub const APPEND: u32 = 1 << 4;

	pub fn writable(flags: u32) -> bool {
		flags & (WRONLY | RDWR) != 0
	}
}

/// The result of `stat`/`lstat_if_possible`: the POSIX-visible subset of a
/// `webfs_store::FileRecord`, plus the base name the caller asked for.
#[derive(Debug, Clone)]
pub struct Stat {
	pub name: String,
	pub mode: u32,
	pub size: i64,
	pub mtime: i64,
}

impl Stat {
	pub fn is_dir(&self) -> bool {
		webfs_store::is_dir(self.mode)
	}
}

/// An open file handle. A full file-descriptor table is out of scope
/// (spec.md §1); this is the minimal capability every mount backend's
/// handle shares, including the `/dev` devices (`webfs-fs::devices`),
/// which is why it's a trait rather than a single concrete struct.
#[async_trait(?Send)]
pub trait File {
	/// `position = None` advances this handle's own cursor; `Some(offset)`
	/// reads at an absolute offset without touching the cursor. EOF is
	/// zero bytes, no error, in both cases (spec.md §4.4).
	async fn read(&self, buf: &mut [u8], position: Option<u64>) -> Result<usize>;

	fn write(&self, buf: &[u8]) -> Result<usize>;

	/// Commits any buffered writes. A no-op for a read-only handle.
	async fn close(&self) -> Result<()>;
}

/// A stand-in for a full file-descriptor table entry (out of scope per
/// spec.md §1): owns its own read cursor and, if opened writable, a
/// staged copy of the whole blob that `close` commits in one
/// `set_file_record` call.
pub struct RecordFile {
	store: Rc<RecordStore>,
	path: String,
	writable: bool,
	append: bool,
	mode: Cell<u32>,
	cursor: Cell<u64>,
	pending: RefCell<Option<Vec<u8>>>,
}

impl RecordFile {
	fn new(store: Rc<RecordStore>, path: String, writable: bool, append: bool, mode: u32, pending: Option<Vec<u8>>) -> Rc<Self> {
		Rc::new(RecordFile { store, path, writable, append, mode: Cell::new(mode), cursor: Cell::new(0), pending: RefCell::new(pending) })
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}

#[async_trait(?Send)]
impl File for RecordFile {
	async fn read(&self, buf: &mut [u8], position: Option<u64>) -> Result<usize> {
		let record = self.store.get_file_record(&self.path).await?;
		let data = record.data().await?;
		let offset = position.unwrap_or_else(|| self.cursor.get()) as usize;
		if offset >= data.len() {
			return Ok(0);
		}
		let n = (data.len() - offset).min(buf.len());
		buf[..n].copy_from_slice(&data[offset..offset + n]);
		if position.is_none() {
			self.cursor.set(self.cursor.get() + n as u64);
		}
		Ok(n)
	}

	/// Buffers `buf` into the whole-blob staging area; nothing reaches the
	/// record store until `close`.
	fn write(&self, buf: &[u8]) -> Result<usize> {
		if !self.writable {
			return Err(Error::NotSupported(self.path.clone()));
		}
		let mut pending = self.pending.borrow_mut();
		let data = pending.get_or_insert_with(Vec::new);
		if self.append {
			data.extend_from_slice(buf);
		} else {
			let at = self.cursor.get() as usize;
			let end = at + buf.len();
			if data.len() < end {
				data.resize(end, 0);
			}
			data[at..end].copy_from_slice(buf);
			self.cursor.set(end as u64);
		}
		Ok(buf.len())
	}

	async fn close(&self) -> Result<()> {
		let pending = self.pending.borrow_mut().take();
		let Some(data) = pending else { return Ok(()) };
		let record = SetRecord { mode: self.mode.get(), mtime: now_seconds(), data };
		self.store.set_file_record(&self.path, Some(record)).await
	}
}

/// The POSIX-shaped surface a mount backend exposes (spec.md §4.4/§6).
/// `clear` is the "clearable" capability probe §4.5's `destroy` needs:
/// the default `None` means "not clearable".
#[async_trait(?Send)]
pub trait Filesystem {
	fn name(&self) -> &str;

	async fn create(&self, path: &str) -> Result<Rc<dyn File>>;
	async fn open(&self, path: &str) -> Result<Rc<dyn File>>;
	async fn open_file(&self, path: &str, flags: u32, mode: u32) -> Result<Rc<dyn File>>;
	async fn mkdir(&self, path: &str, mode: u32) -> Result<()>;
	async fn mkdir_all(&self, path: &str, mode: u32) -> Result<()>;
	async fn remove(&self, path: &str) -> Result<()>;
	async fn remove_all(&self, path: &str) -> Result<()>;
	async fn rename(&self, old: &str, new: &str) -> Result<()>;
	async fn stat(&self, path: &str) -> Result<Stat>;
	async fn lstat_if_possible(&self, path: &str) -> Result<(Stat, bool)>;
	async fn chmod(&self, path: &str, mode: u32) -> Result<()>;
	async fn chtimes(&self, path: &str, mtime: i64) -> Result<()>;

	async fn clear(&self) -> Option<Result<()>> {
		None
	}

	/// Child names of a directory, unqualified. Backends with no real
	/// directory hierarchy (`DevFs`) keep the default `NotSupported`.
	async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
		Err(Error::NotSupported(path.to_string()))
	}
}

/// The façade's one real implementation: a `Filesystem` backed directly by
/// a `webfs-store::RecordStore`.
pub struct IdbFilesystem {
	name: String,
	store: Rc<RecordStore>,
}

impl IdbFilesystem {
	pub fn new(name: impl Into<String>, store: Rc<RecordStore>) -> Rc<Self> {
		Rc::new(IdbFilesystem { name: name.into(), store })
	}

	pub fn store(&self) -> &Rc<RecordStore> {
		&self.store
	}

	fn remove_recursive(&self, path: String) -> LocalBoxFuture<'_, Result<()>> {
		async move {
			let record = self.store.get_file_record(&path).await?;
			if record.is_dir() {
				for name in record.dir_names().await? {
					self.remove_recursive(child_path(&path, &name)).await?;
				}
			}
			self.store.set_file_record(&path, None).await
		}
		.boxed_local()
	}

	/// Not grounded in `original_source` (its `Rename` lives outside the
	/// files retrieved into this pack) -- built directly from the record
	/// store's contract: a directory rename re-parents every descendant
	/// path one at a time, since each path is its own independent key.
	fn rename_recursive(&self, old: String, new: String) -> LocalBoxFuture<'_, Result<()>> {
		async move {
			let record = self.store.get_file_record(&old).await?;
			let mode = record.mode;
			let mtime = record.mtime;
			if record.is_dir() {
				let children = record.dir_names().await?;
				self.store.set_file_record(&new, Some(SetRecord { mode, mtime, data: Vec::new() })).await?;
				for name in children {
					self.rename_recursive(child_path(&old, &name), child_path(&new, &name)).await?;
				}
				self.store.set_file_record(&old, None).await
			} else {
				let data = record.data().await?;
				self.store.set_file_record(&new, Some(SetRecord { mode, mtime, data })).await?;
				self.store.set_file_record(&old, None).await
			}
		}
		.boxed_local()
	}
}

fn child_path(dir: &str, name: &str) -> String {
	if dir == "/" {
		format!("/{name}")
	} else {
		format!("{dir}/{name}")
	}
}

#[async_trait(?Send)]
impl Filesystem for IdbFilesystem {
	fn name(&self) -> &str {
		&self.name
	}

	async fn create(&self, path: &str) -> Result<Rc<dyn File>> {
		self.open_file(path, flags::WRONLY | flags::CREATE | flags::TRUNC, 0o666).await
	}

	async fn open(&self, path: &str) -> Result<Rc<dyn File>> {
		self.open_file(path, flags::RDONLY, 0).await
	}

	async fn open_file(&self, path: &str, open_flags: u32, mode: u32) -> Result<Rc<dyn File>> {
		let path = webfs_store::path::normalize(path);
		let create = open_flags & flags::CREATE != 0;
		let truncate = open_flags & flags::TRUNC != 0;
		let writable = flags::writable(open_flags);
		let append = open_flags & flags::APPEND != 0;

		let existing = self.store.get_file_record(&path).await;
		let (mode_to_use, is_directory) = match &existing {
			Ok(record) => (record.mode, record.is_dir()),
			Err(err) if err.is_not_exist() && create => (mode, false),
			Err(err) => return Err(err.clone()),
		};
		if writable && is_directory {
			return Err(Error::NotSupported(path));
		}

		let pending = if !writable {
			None
		} else if truncate || existing.is_err() {
			Some(Vec::new())
		} else {
			Some(existing.expect("checked Ok above").data().await?)
		};

		Ok(RecordFile::new(Rc::clone(&self.store), path, writable, append, mode_to_use, pending))
	}

	async fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		let record = SetRecord { mode: mode | webfs_store::MODE_DIR, mtime: now_seconds(), data: Vec::new() };
		self.store.set_file_record(&path, Some(record)).await
	}

	async fn mkdir_all(&self, path: &str, mode: u32) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		let mut prefix = String::new();
		for segment in path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()) {
			prefix.push('/');
			prefix.push_str(segment);
			match self.store.get_file_record(&prefix).await {
				Ok(record) if record.is_dir() => continue,
				Ok(_) => return Err(Error::NotDir(prefix)),
				Err(err) if err.is_not_exist() => self.mkdir(&prefix, mode).await?,
				Err(err) => return Err(err),
			}
		}
		Ok(())
	}

	async fn remove(&self, path: &str) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		if webfs_store::path::is_root(&path) {
			return Err(Error::NotSupported(path));
		}
		let record = self.store.get_file_record(&path).await?;
		if record.is_dir() && !record.dir_names().await?.is_empty() {
			return Err(Error::NotSupported(path));
		}
		self.store.set_file_record(&path, None).await
	}

	async fn remove_all(&self, path: &str) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		if webfs_store::path::is_root(&path) {
			return Err(Error::NotSupported(path));
		}
		self.remove_recursive(path).await
	}

	async fn rename(&self, old: &str, new: &str) -> Result<()> {
		let old = webfs_store::path::normalize(old);
		let new = webfs_store::path::normalize(new);
		self.rename_recursive(old, new).await
	}

	async fn stat(&self, path: &str) -> Result<Stat> {
		let path = webfs_store::path::normalize(path);
		let record = self.store.get_file_record(&path).await?;
		Ok(Stat { name: webfs_store::path::base(&path), mode: record.mode, size: record.size, mtime: record.mtime })
	}

	async fn lstat_if_possible(&self, path: &str) -> Result<(Stat, bool)> {
		Ok((self.stat(path).await?, false))
	}

	async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		let record = self.store.get_file_record(&path).await?;
		let data = record.data().await?;
		let dir_bit = record.mode & webfs_store::MODE_DIR;
		self.store.set_file_record(&path, Some(SetRecord { mode: (mode & !webfs_store::MODE_DIR) | dir_bit, mtime: record.mtime, data })).await
	}

	async fn chtimes(&self, path: &str, mtime: i64) -> Result<()> {
		let path = webfs_store::path::normalize(path);
		let record = self.store.get_file_record(&path).await?;
		let data = record.data().await?;
		let mode = record.mode;
		self.store.set_file_record(&path, Some(SetRecord { mode, mtime, data })).await
	}

	async fn clear(&self) -> Option<Result<()>> {
		Some(self.store.clear().await)
	}

	async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
		let path = webfs_store::path::normalize(path);
		let record = self.store.get_file_record(&path).await?;
		if !record.is_dir() {
			return Err(Error::NotDir(path));
		}
		record.dir_names().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;
	use webfs_store::cache_everything;

	fn fs() -> Rc<IdbFilesystem> {
		let db = webfs_kv::memory::open("facade-test", 1, &webfs_store::SCHEMA);
		let store = Rc::new(RecordStore::new(db, cache_everything(), 64));
		IdbFilesystem::new("test", store)
	}

	#[test]
	fn create_write_close_then_read_round_trips() {
		block_on(async {
			let fs = fs();
			fs.mkdir("/a", 0o755).await.unwrap();
			let file = fs.create("/a/b").await.unwrap();
			file.write(b"hello").unwrap();
			file.close().await.unwrap();

			let file = fs.open("/a/b").await.unwrap();
			let mut buf = [0u8; 5];
			let n = file.read(&mut buf, None).await.unwrap();
			assert_eq!(n, 5);
			assert_eq!(&buf, b"hello");
			assert_eq!(file.read(&mut buf, None).await.unwrap(), 0);
		});
	}

	#[test]
	fn absolute_offset_read_does_not_move_cursor() {
		block_on(async {
			let fs = fs();
			let file = fs.create("/f").await.unwrap();
			file.write(b"0123456789").unwrap();
			file.close().await.unwrap();

			let file = fs.open("/f").await.unwrap();
			let mut buf = [0u8; 2];
			assert_eq!(file.read(&mut buf, Some(4)).await.unwrap(), 2);
			assert_eq!(&buf, b"45");
			// cursor untouched by the absolute read; sequential read starts at 0
			assert_eq!(file.read(&mut buf, None).await.unwrap(), 2);
			assert_eq!(&buf, b"01");
		});
	}

	#[test]
	fn mkdir_all_creates_every_missing_segment() {
		block_on(async {
			let fs = fs();
			fs.mkdir_all("/a/b/c", 0o755).await.unwrap();
			assert!(fs.stat("/a").await.unwrap().is_dir());
			assert!(fs.stat("/a/b").await.unwrap().is_dir());
			assert!(fs.stat("/a/b/c").await.unwrap().is_dir());
		});
	}

	#[test]
	fn remove_non_empty_directory_fails() {
		block_on(async {
			let fs = fs();
			fs.mkdir("/a", 0o755).await.unwrap();
			let file = fs.create("/a/b").await.unwrap();
			file.close().await.unwrap();
			assert!(fs.remove("/a").await.is_err());
			fs.remove_all("/a").await.unwrap();
			assert!(fs.stat("/a").await.unwrap_err().is_not_exist());
			assert!(fs.stat("/a/b").await.unwrap_err().is_not_exist());
		});
	}

	#[test]
	fn rename_directory_moves_every_descendant() {
		block_on(async {
			let fs = fs();
			fs.mkdir("/a", 0o755).await.unwrap();
			let file = fs.create("/a/b").await.unwrap();
			file.write(b"x").unwrap();
			file.close().await.unwrap();

			fs.rename("/a", "/z").await.unwrap();
			assert!(fs.stat("/a").await.unwrap_err().is_not_exist());
			assert!(fs.stat("/z").await.unwrap().is_dir());
			let moved = fs.open("/z/b").await.unwrap();
			let mut buf = [0u8; 1];
			assert_eq!(moved.read(&mut buf, None).await.unwrap(), 1);
			assert_eq!(&buf, b"x");
		});
	}

	#[test]
	fn read_dir_lists_children_and_rejects_files() {
		block_on(async {
			let fs = fs();
			fs.mkdir("/a", 0o755).await.unwrap();
			let file = fs.create("/a/b").await.unwrap();
			file.close().await.unwrap();
			fs.mkdir("/a/c", 0o755).await.unwrap();

			let mut names = fs.read_dir("/a").await.unwrap();
			names.sort();
			assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
			assert!(fs.read_dir("/a/b").await.is_err());
		});
	}
}
