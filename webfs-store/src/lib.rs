//! Path-addressed record store: normalizes paths, caches `info` records,
//! and composes writebacks against `webfs-kv` through `webfs-queue`.

pub mod cache;
pub mod path;
pub mod record;
pub mod store;

pub use cache::{cache_everything, InfoCache, ShouldCache};
pub use record::{is_dir, FileRecord, InfoRaw, SetRecord, MODE_DIR};
pub use store::{RecordStore, CONTENTS_STORE, INFO_STORE, PARENT_INDEX, SCHEMA};
