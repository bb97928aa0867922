//! `Window::set_timeout` as a future, for `devices`'s periodic flush tick.
//! Same bridge `kvdb-web::indexed_db::open` uses for its IndexedDB
//! callback, reused here for a JS timer callback instead.

use std::time::Duration;

use futures::channel::oneshot;
use wasm_bindgen::prelude::*;

pub async fn sleep(duration: Duration) {
	let (tx, rx) = oneshot::channel();
	let closure = Closure::once(move || {
		let _ = tx.send(());
	});
	let window = web_sys::window().expect("no global `window` exists");
	let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
		closure.as_ref().unchecked_ref(),
		duration.as_millis() as i32,
	);
	closure.forget();
	let _ = rx.await;
}
