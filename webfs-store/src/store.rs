//! The record store (spec.md §4.3): translates normalized paths into
//! two-store writes through the batch queue, enforcing the
//! parent-is-directory invariant via a probe piggybacked on the same
//! writeback transaction.

use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use log::warn;

use webfs_error::{Error, Result};
use webfs_kv::{AbortReason, Database, IndexSpec, Mode, Schema, Transaction};
use webfs_queue::{OpBuilder, Queue};

use crate::cache::{InfoCache, ShouldCache};
use crate::path;
use crate::record::{is_dir, FileRecord, InfoRaw, SetRecord};

pub const INFO_STORE: &str = "info";
pub const CONTENTS_STORE: &str = "contents";
pub const PARENT_INDEX: &str = "parent";

/// The schema every `webfs-kv::Database` behind a `RecordStore` must be
/// opened with (spec.md §6).
pub const SCHEMA: Schema =
	Schema { stores: &[INFO_STORE, CONTENTS_STORE], indexes: &[IndexSpec { store: INFO_STORE, name: PARENT_INDEX }] };

/// Maps a KV-layer failure onto the caller-facing taxonomy (spec.md §9's
/// open question, resolved conservatively): only an abort whose cause is
/// the parent-required probe becomes `NotDir`; every other abort is
/// surfaced verbatim.
fn translate_kv_error(path: &str, err: webfs_kv::Error) -> Error {
	match err {
		webfs_kv::Error::Aborted(AbortReason::ParentRequired) => Error::NotDir(path.to_string()),
		webfs_kv::Error::Aborted(AbortReason::Explicit(reason)) => Error::Aborted(reason),
		webfs_kv::Error::Infrastructure(msg) => Error::Infrastructure(msg),
	}
}

pub struct RecordStore {
	db: Rc<dyn Database>,
	cache: InfoCache,
	async_queue: Rc<Queue>,
}

impl RecordStore {
	pub fn new(db: Rc<dyn Database>, should_cache: ShouldCache, max_async_queue: usize) -> Self {
		RecordStore { db, cache: InfoCache::new(should_cache), async_queue: Queue::new(max_async_queue) }
	}

	pub fn database(&self) -> &Rc<dyn Database> {
		&self.db
	}

	/// The long-lived queue `queue_set_file_record` pushes into. Exposed
	/// so an embedder can call `Queue::start_async` on it (browser-only)
	/// or, in tests, flush it manually.
	pub fn async_queue(&self) -> &Rc<Queue> {
		&self.async_queue
	}

	/// Drains and commits whatever's pending on the async queue. Stands
	/// in for the browser's periodic `start_async` tick in tests.
	pub async fn flush_async(&self) -> Option<Error> {
		let (_, err) = self.async_queue.do_flush(self.db.as_ref()).await;
		err.map(|e| translate_kv_error("", e))
	}

	pub async fn get_file_record(&self, path: &str) -> Result<FileRecord> {
		let mut results = self.get_file_records(std::slice::from_ref(&path.to_string())).await;
		results.pop().expect("get_file_records returns one result per input path")
	}

	/// Fetches many records at once, consulting the cache first and
	/// batching misses through a one-shot queue sized to the miss count.
	///
	/// Panics if called with mismatched lengths internally would be the
	/// original contract ("programmer error, fatal") -- there is no
	/// `dest` slice to mismatch against in this API, so that invariant
	/// doesn't apply here; the result vector always matches `paths`.
	pub async fn get_file_records(&self, paths: &[String]) -> Vec<Result<FileRecord>> {
		let normalized: Vec<String> = paths.iter().map(|p| path::normalize(p)).collect();
		let mut results: Vec<Option<Result<FileRecord>>> = normalized.iter().map(|_| None).collect();
		let mut misses = Vec::new();

		for (i, p) in normalized.iter().enumerate() {
			if self.cache.enabled_for(p) {
				if let Some(info) = self.cache.get(p) {
					results[i] = Some(Ok(Self::build_record(Rc::clone(&self.db), p.clone(), info)));
					continue;
				}
			}
			misses.push(i);
		}
		if misses.is_empty() {
			return results.into_iter().map(|r| r.expect("every slot filled")).collect();
		}

		let queue = Queue::new(misses.len());
		let receivers: Vec<_> = misses
			.iter()
			.map(|&i| {
				let key = normalized[i].clone().into_bytes();
				queue.push(
					Mode::ReadOnly,
					&[INFO_STORE],
					Box::new(move |txn: &dyn Transaction| {
						let store = txn.object_store(INFO_STORE);
						async move { store.get(&key).await }.boxed_local()
					}),
				)
			})
			.collect();
		let (_, flush_err) = queue.do_flush(self.db.as_ref()).await;
		if let Some(err) = flush_err {
			warn!("get_file_records: batch transaction failed: {err}");
		}

		for (&slot, rx) in misses.iter().zip(receivers) {
			let path = normalized[slot].clone();
			let outcome = match rx.await {
				Ok(Ok(None)) => Err(Error::NotExist(path.clone())),
				Ok(Ok(Some(bytes))) => match InfoRaw::decode(&bytes) {
					Ok(info) => {
						self.cache.insert(path.clone(), info.clone());
						Ok(Self::build_record(Rc::clone(&self.db), path.clone(), info))
					}
					Err(err) => Err(err),
				},
				Ok(Err(err)) => Err(translate_kv_error(&path, err)),
				Err(_) => Err(Error::Infrastructure("get request dropped before completing".into())),
			};
			results[slot] = Some(outcome);
		}
		results.into_iter().map(|r| r.expect("every slot filled")).collect()
	}

	/// Synchronous writeback: builds a one-shot queue, pushes the
	/// writeback for `path`, and flushes immediately.
	pub async fn set_file_record(&self, path: &str, record: Option<SetRecord>) -> Result<()> {
		let path = path::normalize(path);
		if record.is_none() && path::is_root(&path) {
			return Err(Error::NotSupported(path));
		}
		self.cache.evict(&path);

		let ops = writeback_ops(&path, record);
		let queue = Queue::new(ops.len().max(1));
		for (mode, stores, builder) in ops {
			queue.push(mode, stores, builder);
		}
		let (_, err) = queue.do_flush(self.db.as_ref()).await;
		match err {
			None => Ok(()),
			Some(err) => Err(translate_kv_error(&path, err)),
		}
	}

	/// Same writeback, pushed into the long-lived async queue instead of
	/// a one-shot one. The returned future resolves once every pushed op
	/// in the writeback has completed (i.e. once some future flush of
	/// `async_queue` commits or aborts the transaction it landed in).
	pub fn queue_set_file_record(&self, path: &str, record: Option<SetRecord>) -> LocalBoxFuture<'static, Result<()>> {
		let path = path::normalize(path);
		if record.is_none() && path::is_root(&path) {
			return futures::future::ready(Err(Error::NotSupported(path))).boxed_local();
		}
		self.cache.evict(&path);

		let ops = writeback_ops(&path, record);
		let receivers: Vec<_> =
			ops.into_iter().map(|(mode, stores, builder)| self.async_queue.push(mode, stores, builder)).collect();

		async move {
			let mut first_err = None;
			for rx in receivers {
				match rx.await {
					Ok(Ok(_)) => {}
					Ok(Err(err)) => {
						first_err.get_or_insert(err);
					}
					Err(_) => {
						first_err.get_or_insert(webfs_kv::Error::Infrastructure("op dropped before completing".into()));
					}
				}
			}
			match first_err {
				None => Ok(()),
				Some(err) => Err(translate_kv_error(&path, err)),
			}
		}
		.boxed_local()
	}

	/// Clears both stores in one transaction. Leaves the cache untouched
	/// -- callers clear the cache by discarding the `RecordStore`.
	pub async fn clear(&self) -> Result<()> {
		let txn = self
			.db
			.transaction(&[INFO_STORE, CONTENTS_STORE], Mode::ReadWrite)
			.await
			.map_err(|e| translate_kv_error("/", e))?;
		txn.object_store(INFO_STORE).clear();
		txn.object_store(CONTENTS_STORE).clear();
		txn.commit().await.map_err(|e| translate_kv_error("/", e))
	}

	fn build_record(db: Rc<dyn Database>, path: String, info: InfoRaw) -> FileRecord {
		if is_dir(info.mode) {
			let dirnames_path = path.clone();
			FileRecord::new(
				info.mode,
				info.size,
				info.mod_time,
				Box::new(|| futures::future::ready(Ok(Vec::new())).boxed_local()),
				Box::new(move || fetch_dir_names(Rc::clone(&db), dirnames_path.clone()).boxed_local()),
			)
		} else {
			let data_path = path.clone();
			FileRecord::new(
				info.mode,
				info.size,
				info.mod_time,
				Box::new(move || fetch_contents(Rc::clone(&db), data_path.clone()).boxed_local()),
				Box::new(|| futures::future::ready(Ok(Vec::new())).boxed_local()),
			)
		}
	}
}

async fn fetch_contents(db: Rc<dyn Database>, path: String) -> Result<Vec<u8>> {
	let txn = db.transaction(&[CONTENTS_STORE], Mode::ReadOnly).await.map_err(|e| translate_kv_error(&path, e))?;
	let value = txn.object_store(CONTENTS_STORE).get(path.as_bytes()).await.map_err(|e| translate_kv_error(&path, e))?;
	value.ok_or_else(|| Error::NotExist(path.clone()))
}

async fn fetch_dir_names(db: Rc<dyn Database>, path: String) -> Result<Vec<String>> {
	let txn = db.transaction(&[INFO_STORE], Mode::ReadOnly).await.map_err(|e| translate_kv_error(&path, e))?;
	let index = txn.object_store(INFO_STORE).index(PARENT_INDEX);
	let keys = index.get_all_keys(path.as_bytes()).await.map_err(|e| translate_kv_error(&path, e))?;
	Ok(keys.into_iter().map(|key| path::base(&String::from_utf8_lossy(&key))).collect())
}

/// Builds the writeback for a single `set_file_record`/`queue_set_file_record`
/// call (spec.md §4.3 "Writeback composition"): contents delete-or-put,
/// info put, and -- unless the parent is the root -- a parent-required
/// probe sharing the same merged transaction.
fn writeback_ops(path: &str, record: Option<SetRecord>) -> Vec<(Mode, &'static [&'static str], OpBuilder)> {
	let mut ops: Vec<(Mode, &'static [&'static str], OpBuilder)> = Vec::new();

	match record {
		None => {
			let info_key = path.as_bytes().to_vec();
			let contents_key = info_key.clone();
			ops.push((
				Mode::ReadWrite,
				&[INFO_STORE],
				Box::new(move |txn: &dyn Transaction| {
					let store = txn.object_store(INFO_STORE);
					async move {
						store.delete(&info_key);
						Ok(None)
					}
					.boxed_local()
				}),
			));
			ops.push((
				Mode::ReadWrite,
				&[CONTENTS_STORE],
				Box::new(move |txn: &dyn Transaction| {
					let store = txn.object_store(CONTENTS_STORE);
					async move {
						store.delete(&contents_key);
						Ok(None)
					}
					.boxed_local()
				}),
			));
		}
		Some(record) => {
			if !record.is_dir() {
				let key = path.as_bytes().to_vec();
				let data = record.data.clone();
				ops.push((
					Mode::ReadWrite,
					&[CONTENTS_STORE],
					Box::new(move |txn: &dyn Transaction| {
						let store = txn.object_store(CONTENTS_STORE);
						async move {
							store.put(&key, &data, None);
							Ok(None)
						}
						.boxed_local()
					}),
				));
			}

			let parent = path::dir(path);
			let is_root = path::is_root(path);
			let info = InfoRaw {
				mode: record.mode,
				mod_time: record.mtime,
				size: if record.is_dir() { 0 } else { record.data.len() as i64 },
				parent: if is_root { None } else { Some(parent.clone()) },
			};
			let info_key = path.as_bytes().to_vec();
			let parent_index_key = info.parent.clone().map(String::into_bytes);
			let encoded = info.encode();
			ops.push((
				Mode::ReadWrite,
				&[INFO_STORE],
				Box::new(move |txn: &dyn Transaction| {
					let store = txn.object_store(INFO_STORE);
					async move {
						store.put(&info_key, &encoded, parent_index_key.as_deref());
						Ok(None)
					}
					.boxed_local()
				}),
			));

			if !parent.is_empty() && parent != "/" {
				let probe_key = parent.into_bytes();
				ops.push((
					Mode::ReadOnly,
					&[INFO_STORE],
					Box::new(move |txn: &dyn Transaction| {
						let store = txn.object_store(INFO_STORE);
						async move {
							store.get_with_listener(
								&probe_key,
								Box::new(move |value: &Option<Vec<u8>>| {
									let ok = value
										.as_deref()
										.and_then(|bytes| InfoRaw::decode(bytes).ok())
										.map(|info| is_dir(info.mode))
										.unwrap_or(false);
									if ok {
										None
									} else {
										Some(AbortReason::ParentRequired)
									}
								}),
							);
							Ok(None)
						}
						.boxed_local()
					}),
				));
			}
		}
	}

	ops
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::cache_everything;
	use futures::executor::block_on;

	fn store() -> RecordStore {
		let db = webfs_kv::memory::open("record-store-test", 1, &SCHEMA);
		RecordStore::new(db, cache_everything(), 64)
	}

	fn file(mtime: i64, data: &[u8]) -> SetRecord {
		SetRecord { mode: 0o644, mtime, data: data.to_vec() }
	}

	fn dir(mtime: i64) -> SetRecord {
		SetRecord { mode: crate::record::MODE_DIR | 0o755, mtime, data: Vec::new() }
	}

	#[test]
	fn write_then_read_round_trips() {
		block_on(async {
			let store = store();
			store.set_file_record("/a", Some(dir(1000))).await.unwrap();
			store.set_file_record("/a/b", Some(file(1001, b"hi"))).await.unwrap();

			let record = store.get_file_record("/a/b").await.unwrap();
			assert_eq!(record.mode, 0o644);
			assert_eq!(record.mtime, 1001);
			assert_eq!(record.data().await.unwrap(), b"hi");

			let dir_record = store.get_file_record("/a").await.unwrap();
			assert_eq!(dir_record.dir_names().await.unwrap(), vec!["b".to_string()]);
		});
	}

	#[test]
	fn missing_parent_fails_with_not_dir_and_leaves_no_record() {
		block_on(async {
			let store = store();
			let err = store.set_file_record("/x/y", Some(file(1000, b"z"))).await.unwrap_err();
			assert!(matches!(err, Error::NotDir(_)));
			assert!(store.get_file_record("/x/y").await.unwrap_err().is_not_exist());
			assert!(store.get_file_record("/x").await.unwrap_err().is_not_exist());
		});
	}

	#[test]
	fn delete_removes_info_and_contents() {
		block_on(async {
			let store = store();
			store.set_file_record("/f", Some(file(1000, b"one"))).await.unwrap();
			store.set_file_record("/f", None).await.unwrap();
			assert!(store.get_file_record("/f").await.unwrap_err().is_not_exist());
		});
	}

	#[test]
	fn deleting_root_is_not_supported() {
		block_on(async {
			let store = store();
			let err = store.set_file_record("/", None).await.unwrap_err();
			assert!(matches!(err, Error::NotSupported(_)));
		});
	}

	#[test]
	fn clear_removes_every_record() {
		block_on(async {
			let store = store();
			store.set_file_record("/a", Some(dir(1000))).await.unwrap();
			store.set_file_record("/a/b", Some(file(1000, b"x"))).await.unwrap();
			store.clear().await.unwrap();
			// the cache entry for "/a/b" is stale and untouched by clear(); fetch a
			// path that was never cached to observe the stores are actually empty.
			let fresh = RecordStore::new(Rc::clone(store.database()), cache_everything(), 64);
			assert!(fresh.get_file_record("/a/b").await.unwrap_err().is_not_exist());
		});
	}

	#[test]
	fn queued_writeback_resolves_after_manual_flush() {
		block_on(async {
			let store = store();
			store.set_file_record("/a", Some(dir(1000))).await.unwrap();
			let completion = store.queue_set_file_record("/a/b", Some(file(1000, b"hi")));
			store.flush_async().await;
			completion.await.unwrap();
			assert_eq!(store.get_file_record("/a/b").await.unwrap().data().await.unwrap(), b"hi");
		});
	}
}
