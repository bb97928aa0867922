//! Database schema declaration.
//!
//! A `Schema` is the Rust analogue of what a real IndexedDB
//! `onupgradeneeded` handler does: declare which object stores exist and
//! which of them carry a secondary index. `webfs-kv::memory::open` applies
//! it immediately; `webfs-kv::idb::open` drives an actual `IDBOpenDBRequest`
//! upgrade with it.

/// One secondary index declared on an object store.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
	/// The object store this index lives on.
	pub store: &'static str,
	/// The index's own name, passed back into `ObjectStore::index`.
	pub name: &'static str,
}

/// The set of object stores (and their indexes) a database is opened with.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
	pub stores: &'static [&'static str],
	pub indexes: &'static [IndexSpec],
}
