//! Wall-clock seconds, the one piece of ambient state the façade needs
//! that the record store itself never touches (it only ever persists a
//! caller-supplied `mtime`).

#[cfg(target_arch = "wasm32")]
pub fn now_seconds() -> i64 {
	(js_sys::Date::now() / 1000.0) as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_seconds() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
