//! In-process info cache (spec.md §3 invariant 5, §5 "shared state").
//!
//! Gated by a caller-supplied `should_cache` predicate -- the original
//! implementation's `ShouldCacher` plays the same role, letting the
//! embedder exclude hot, rarely-reread paths from the cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::record::InfoRaw;

pub type ShouldCache = Rc<dyn Fn(&str) -> bool>;

/// Always caches every path. The default when no predicate is supplied.
pub fn cache_everything() -> ShouldCache {
	Rc::new(|_: &str| true)
}

pub struct InfoCache {
	entries: RefCell<HashMap<String, InfoRaw>>,
	should_cache: ShouldCache,
}

impl InfoCache {
	pub fn new(should_cache: ShouldCache) -> Self {
		InfoCache { entries: RefCell::new(HashMap::new()), should_cache }
	}

	pub fn enabled_for(&self, path: &str) -> bool {
		(self.should_cache)(path)
	}

	pub fn get(&self, path: &str) -> Option<InfoRaw> {
		self.entries.borrow().get(path).cloned()
	}

	pub fn insert(&self, path: String, info: InfoRaw) {
		if self.enabled_for(&path) {
			self.entries.borrow_mut().insert(path, info);
		}
	}

	/// Evicted unconditionally, regardless of `should_cache` -- a path
	/// that was cacheable yesterday and isn't today must not leave a
	/// stale entry behind.
	pub fn evict(&self, path: &str) {
		self.entries.borrow_mut().remove(path);
	}

	pub fn clear(&self) {
		self.entries.borrow_mut().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn info() -> InfoRaw {
		InfoRaw { mode: 0, mod_time: 0, size: 0, parent: Some("/".into()) }
	}

	#[test]
	fn disabled_paths_are_never_stored() {
		let cache = InfoCache::new(Rc::new(|p: &str| p != "/skip"));
		cache.insert("/skip".into(), info());
		assert!(cache.get("/skip").is_none());
		cache.insert("/keep".into(), info());
		assert!(cache.get("/keep").is_some());
	}

	#[test]
	fn evict_removes_regardless_of_predicate() {
		let cache = InfoCache::new(cache_everything());
		cache.insert("/a".into(), info());
		cache.evict("/a");
		assert!(cache.get("/a").is_none());
	}
}
