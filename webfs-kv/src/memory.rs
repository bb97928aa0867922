//! In-process reference implementation of the KV transaction layer.
//!
//! Plays the same role `kvdb-memorydb` plays for `kvdb-rocksdb`: a
//! dependency-free backend good enough to drive the real tests, and a
//! stand-in for any embedding that doesn't have a browser underneath it.
//! `webfs-kv::idb` is the real thing; this one is the reference.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::error::{AbortReason, Error, Result};
use crate::schema::Schema;
use crate::traits::{Database, Index, Listener, Mode, ObjectStore, Transaction};

struct Store {
	data: BTreeMap<Vec<u8>, Vec<u8>>,
	/// `index value -> set of primary keys`, rebuilt incrementally as
	/// indexed puts/deletes commit.
	index: BTreeMap<Vec<u8>, HashSet<Vec<u8>>>,
	/// `primary key -> index value`, kept so delete can find which index
	/// bucket to clean up without a second parameter at delete time.
	indexed_by: HashMap<Vec<u8>, Vec<u8>>,
}

impl Store {
	fn new() -> Self {
		Store { data: BTreeMap::new(), index: BTreeMap::new(), indexed_by: HashMap::new() }
	}

	fn put(&mut self, key: Vec<u8>, value: Vec<u8>, index_key: Option<Vec<u8>>) {
		if let Some(old_index) = self.indexed_by.remove(&key) {
			if let Some(set) = self.index.get_mut(&old_index) {
				set.remove(&key);
			}
		}
		if let Some(index_key) = index_key {
			self.index.entry(index_key.clone()).or_default().insert(key.clone());
			self.indexed_by.insert(key.clone(), index_key);
		}
		self.data.insert(key, value);
	}

	fn delete(&mut self, key: &[u8]) {
		self.data.remove(key);
		if let Some(old_index) = self.indexed_by.remove(key) {
			if let Some(set) = self.index.get_mut(&old_index) {
				set.remove(key);
			}
		}
	}

	fn clear(&mut self) {
		self.data.clear();
		self.index.clear();
		self.indexed_by.clear();
	}
}

struct MemoryState {
	version: u32,
	stores: HashMap<&'static str, Store>,
}

/// An in-memory database. Opening twice with the same backing `Rc` gives
/// you two handles onto the same state, approximating how two `Database`
/// handles onto the same named IndexedDB database behave.
pub struct MemoryDatabase {
	name: String,
	state: Rc<RefCell<MemoryState>>,
}

/// Opens (creating if necessary) an in-memory database at the declared
/// schema version. `schema` is applied immediately -- there's no
/// persisted prior version to diff against, so the "upgrade" always runs
/// exactly once, during this call.
pub fn open(name: &str, version: u32, schema: &Schema) -> Rc<dyn Database> {
	debug!("opening in-memory database '{name}' at schema version {version}");
	let mut stores = HashMap::new();
	for store_name in schema.stores {
		stores.insert(*store_name, Store::new());
	}
	Rc::new(MemoryDatabase { name: name.to_string(), state: Rc::new(RefCell::new(MemoryState { version, stores })) })
}

#[async_trait(?Send)]
impl Database for MemoryDatabase {
	fn name(&self) -> &str {
		&self.name
	}

	fn version(&self) -> u32 {
		self.state.borrow().version
	}

	async fn transaction(&self, stores: &[&'static str], mode: Mode) -> Result<Rc<dyn Transaction>> {
		trace!("opening {mode:?} transaction over {stores:?}");
		Ok(Rc::new(MemoryTransaction {
			state: Rc::clone(&self.state),
			store_names: stores.to_vec(),
			shared: Rc::new(TxnShared {
				overlay: RefCell::new(HashMap::new()),
				cleared: RefCell::new(HashSet::new()),
				aborted: RefCell::new(None),
			}),
			done: RefCell::new(false),
		}))
	}
}

enum OverlayEntry {
	Put(Vec<u8>, Option<Vec<u8>>),
	Delete,
}

/// State shared between a `MemoryTransaction` and the `MemoryObjectStore`
/// handles it hands out, so an object store handle can outlive a
/// particular borrow of its transaction without an unsafe back-pointer.
struct TxnShared {
	/// `store -> key -> pending write`, applied to `MemoryState` on commit.
	overlay: RefCell<HashMap<&'static str, BTreeMap<Vec<u8>, OverlayEntry>>>,
	cleared: RefCell<HashSet<&'static str>>,
	aborted: RefCell<Option<AbortReason>>,
}

impl TxnShared {
	fn read(&self, state: &Rc<RefCell<MemoryState>>, store: &'static str, key: &[u8]) -> Option<Vec<u8>> {
		if let Some(overlay) = self.overlay.borrow().get(store) {
			if let Some(entry) = overlay.get(key) {
				return match entry {
					OverlayEntry::Put(_, value) => value.clone(),
					OverlayEntry::Delete => None,
				};
			}
		}
		if self.cleared.borrow().contains(store) {
			return None;
		}
		state.borrow().stores.get(store).and_then(|s| s.data.get(key).cloned())
	}

	fn abort(&self, reason: AbortReason) {
		let mut aborted = self.aborted.borrow_mut();
		if aborted.is_none() {
			*aborted = Some(reason);
		}
	}
}

struct MemoryTransaction {
	state: Rc<RefCell<MemoryState>>,
	store_names: Vec<&'static str>,
	shared: Rc<TxnShared>,
	done: RefCell<bool>,
}

impl MemoryTransaction {
	fn check_store(&self, name: &'static str) {
		assert!(self.store_names.contains(&name), "store '{name}' not declared for this transaction");
	}

	fn done_result(&self) -> Result<()> {
		match self.shared.aborted.borrow().clone() {
			Some(reason) => Err(Error::Aborted(reason)),
			None => Ok(()),
		}
	}
}

#[async_trait(?Send)]
impl Transaction for MemoryTransaction {
	fn object_store(&self, name: &'static str) -> Rc<dyn ObjectStore> {
		self.check_store(name);
		Rc::new(MemoryObjectStore { shared: Rc::clone(&self.shared), state: Rc::clone(&self.state), name })
	}

	fn abort(&self, reason: AbortReason) {
		self.shared.abort(reason);
	}

	async fn commit(&self) -> Result<()> {
		if *self.done.borrow() {
			return self.done_result();
		}
		if let Some(reason) = self.shared.aborted.borrow().clone() {
			*self.done.borrow_mut() = true;
			return Err(Error::Aborted(reason));
		}
		let mut state = self.state.borrow_mut();
		for store_name in self.shared.cleared.borrow().iter() {
			if let Some(store) = state.stores.get_mut(store_name) {
				store.clear();
			}
		}
		for (store_name, overlay) in self.shared.overlay.borrow_mut().drain() {
			let Some(store) = state.stores.get_mut(store_name) else { continue };
			for (key, entry) in overlay {
				match entry {
					OverlayEntry::Put(index_key, Some(value)) => {
						let index_key = if index_key.is_empty() { None } else { Some(index_key) };
						store.put(key, value, index_key);
					}
					OverlayEntry::Put(_, None) | OverlayEntry::Delete => store.delete(&key),
				}
			}
		}
		*self.done.borrow_mut() = true;
		Ok(())
	}

	async fn done(&self) -> Result<()> {
		if !*self.done.borrow() {
			// Everything here is single-threaded and cooperative, so the
			// only way `done()` is reached before `commit()` is if the
			// caller simply never committed; treat that the same way a
			// real IndexedDB transaction would once its queued requests
			// run dry, by committing now.
			return self.commit().await;
		}
		self.done_result()
	}
}

struct MemoryObjectStore {
	shared: Rc<TxnShared>,
	state: Rc<RefCell<MemoryState>>,
	name: &'static str,
}

#[async_trait(?Send)]
impl ObjectStore for MemoryObjectStore {
	async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.shared.read(&self.state, self.name, key))
	}

	fn get_with_listener(&self, key: &[u8], listener: Listener) {
		let value = self.shared.read(&self.state, self.name, key);
		if let Some(reason) = listener(&value) {
			self.shared.abort(reason);
		}
	}

	fn put(&self, key: &[u8], value: &[u8], index_key: Option<&[u8]>) {
		let mut overlay = self.shared.overlay.borrow_mut();
		overlay.entry(self.name).or_default().insert(
			key.to_vec(),
			OverlayEntry::Put(index_key.map(|k| k.to_vec()).unwrap_or_default(), Some(value.to_vec())),
		);
	}

	fn delete(&self, key: &[u8]) {
		let mut overlay = self.shared.overlay.borrow_mut();
		overlay.entry(self.name).or_default().insert(key.to_vec(), OverlayEntry::Delete);
	}

	fn clear(&self) {
		self.shared.cleared.borrow_mut().insert(self.name);
		self.shared.overlay.borrow_mut().remove(self.name);
	}

	fn index(&self, name: &'static str) -> Rc<dyn Index> {
		Rc::new(MemoryIndex { state: Rc::clone(&self.state), store: self.name, _index_name: name })
	}
}

struct MemoryIndex {
	state: Rc<RefCell<MemoryState>>,
	store: &'static str,
	_index_name: &'static str,
}

#[async_trait(?Send)]
impl Index for MemoryIndex {
	async fn get_all_keys(&self, value: &[u8]) -> Result<Vec<Vec<u8>>> {
		let state = self.state.borrow();
		let Some(store) = state.stores.get(self.store) else { return Ok(Vec::new()) };
		Ok(store.index.get(value).map(|set| set.iter().cloned().collect()).unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;

	const SCHEMA: Schema = Schema { stores: &["info", "contents"], indexes: &[] };

	#[test]
	fn put_then_get_round_trips() {
		block_on(async {
			let db = open("test", 1, &SCHEMA);
			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.put(b"/a", b"hello", None);
			txn.commit().await.unwrap();

			let txn = db.transaction(&["info"], Mode::ReadOnly).await.unwrap();
			let store = txn.object_store("info");
			assert_eq!(store.get(b"/a").await.unwrap(), Some(b"hello".to_vec()));
		});
	}

	#[test]
	fn delete_removes_value() {
		block_on(async {
			let db = open("test", 1, &SCHEMA);
			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.put(b"/a", b"hello", None);
			txn.commit().await.unwrap();

			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.delete(b"/a");
			txn.commit().await.unwrap();

			let txn = db.transaction(&["info"], Mode::ReadOnly).await.unwrap();
			assert_eq!(txn.object_store("info").get(b"/a").await.unwrap(), None);
		});
	}

	#[test]
	fn abort_leaves_store_untouched() {
		block_on(async {
			let db = open("test", 1, &SCHEMA);
			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.put(b"/a", b"hello", None);
			txn.abort(AbortReason::Explicit("nope".into()));
			let err = txn.commit().await.unwrap_err();
			assert_eq!(err, Error::Aborted(AbortReason::Explicit("nope".into())));

			let txn = db.transaction(&["info"], Mode::ReadOnly).await.unwrap();
			assert_eq!(txn.object_store("info").get(b"/a").await.unwrap(), None);
		});
	}

	#[test]
	fn listener_can_abort_transaction() {
		block_on(async {
			let db = open("test", 1, &SCHEMA);
			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.get_with_listener(
				b"/missing-parent",
				Box::new(|value| if value.is_none() { Some(AbortReason::ParentRequired) } else { None }),
			);
			let err = txn.commit().await.unwrap_err();
			assert_eq!(err, Error::Aborted(AbortReason::ParentRequired));
		});
	}

	#[test]
	fn index_lookup_returns_matching_keys() {
		block_on(async {
			let schema = Schema { stores: &["info"], indexes: &[] };
			let db = open("test", 1, &schema);
			let txn = db.transaction(&["info"], Mode::ReadWrite).await.unwrap();
			let store = txn.object_store("info");
			store.put(b"/a/b", b"{}", Some(b"/a"));
			store.put(b"/a/c", b"{}", Some(b"/a"));
			store.put(b"/x/y", b"{}", Some(b"/x"));
			txn.commit().await.unwrap();

			let txn = db.transaction(&["info"], Mode::ReadOnly).await.unwrap();
			let index = txn.object_store("info").index("parent");
			let mut keys = index.get_all_keys(b"/a").await.unwrap();
			keys.sort();
			assert_eq!(keys, vec![b"/a/b".to_vec(), b"/a/c".to_vec()]);
		});
	}
}
