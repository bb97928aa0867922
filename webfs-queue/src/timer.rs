//! A `sleep` future bridged off `Window::set_timeout`, the same
//! `Closure` + oneshot pattern `kvdb-web::indexed_db::open` uses to bridge
//! an `IDBOpenDBRequest` event into a future.

use std::time::Duration;

use futures::channel::oneshot;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

pub async fn sleep(duration: Duration) {
	let (tx, rx) = oneshot::channel::<()>();
	let window = web_sys::window().expect("queue timer requires a browser window");
	let on_fire = Closure::once(move || {
		let _ = tx.send(());
	});
	let millis = duration.as_millis().min(i32::MAX as u128) as i32;
	let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(on_fire.as_ref().unchecked_ref(), millis);
	on_fire.forget();
	let _ = rx.await;
}
