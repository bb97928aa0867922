//! The real backend: `Database`/`Transaction`/`ObjectStore`/`Index` bound
//! directly to `web_sys::IdbDatabase`.
//!
//! Grounded closely on `kvdb-web`'s `indexed_db` module: `Closure::once`
//! plus a oneshot channel to bridge a JS event into a Rust future, and
//! `try_create_object_stores` driven off `onupgradeneeded`. Two things
//! this module adds that `kvdb-web` didn't need: a secondary index (kept
//! as an envelope object `{v, p}` around every value, since the KV layer
//! only ever sees opaque bytes and can't declare a `keyPath` into a
//! serialized struct the way a real JS value could), and a
//! `get_with_listener` request that can abort its own transaction before
//! it commits.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use js_sys::{Object, Reflect, Uint8Array};
use log::{debug, warn};
use send_wrapper::SendWrapper;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
	Event, IdbDatabase, IdbIndex, IdbObjectStore, IdbOpenDbRequest, IdbRequest, IdbTransaction, IdbTransactionMode,
};

use crate::error::{AbortReason, Error, Result};
use crate::schema::Schema;
use crate::traits::{Database, Index, Listener, Mode, ObjectStore, Transaction};

fn js_err(context: &str, err: JsValue) -> Error {
	Error::Infrastructure(format!("{context}: {err:?}"))
}

fn bytes_to_js(bytes: &[u8]) -> Uint8Array {
	Uint8Array::from(bytes)
}

/// Every stored value is wrapped `{ v: <bytes>, p: <index value> }` so a
/// store can carry a secondary index without the KV layer needing to
/// understand the shape of what it's storing.
fn wrap_value(value: &[u8], index_key: Option<&[u8]>) -> JsValue {
	let obj = Object::new();
	let _ = Reflect::set(&obj, &JsValue::from_str("v"), &bytes_to_js(value));
	if let Some(index_key) = index_key {
		let _ = Reflect::set(&obj, &JsValue::from_str("p"), &bytes_to_js(index_key));
	}
	obj.into()
}

fn unwrap_value(js: JsValue) -> Option<Vec<u8>> {
	if js.is_undefined() || js.is_null() {
		return None;
	}
	let v = Reflect::get(&js, &JsValue::from_str("v")).ok()?;
	Some(Uint8Array::new(&v).to_vec())
}

fn idb_mode(mode: Mode) -> IdbTransactionMode {
	match mode {
		Mode::ReadOnly => IdbTransactionMode::Readonly,
		Mode::ReadWrite => IdbTransactionMode::Readwrite,
	}
}

fn event_request(event: &Event) -> IdbRequest {
	event
		.target()
		.expect("event has a target")
		.dyn_into::<IdbRequest>()
		.expect("event target is an IdbRequest")
}

/// Awaits a single `IdbRequest`'s `onsuccess`/`onerror`, yielding its
/// `result` on success.
async fn await_request(req: &IdbRequest, context: &'static str) -> Result<JsValue> {
	let (tx, rx) = oneshot::channel::<std::result::Result<JsValue, JsValue>>();
	let tx = Rc::new(RefCell::new(Some(tx)));

	let tx_ok = Rc::clone(&tx);
	let on_success = Closure::once(move |event: &Event| {
		let result = event_request(event).result().unwrap_or(JsValue::UNDEFINED);
		if let Some(tx) = tx_ok.borrow_mut().take() {
			let _ = tx.send(Ok(result));
		}
	});
	let tx_err = Rc::clone(&tx);
	let on_error = Closure::once(move |event: &Event| {
		let err = event_request(event).error().map(JsValue::from).unwrap_or(JsValue::UNDEFINED);
		if let Some(tx) = tx_err.borrow_mut().take() {
			let _ = tx.send(Err(err));
		}
	});
	req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
	req.set_onerror(Some(on_error.as_ref().unchecked_ref()));
	on_success.forget();
	on_error.forget();

	match rx.await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(err)) => Err(js_err(context, err)),
		Err(_) => Err(Error::Infrastructure(format!("{context}: request dropped before completing"))),
	}
}

fn try_create_object_stores(req: &IdbOpenDbRequest, schema: Schema) {
	let on_upgradeneeded = Closure::once(move |event: &Event| {
		debug!("running schema upgrade");
		let db: IdbDatabase = event_request(event).result().expect("request has a result").unchecked_into();
		let existing = db.object_store_names();
		for store_name in schema.stores {
			if (0..existing.length()).any(|i| existing.get(i).as_deref() == Some(*store_name)) {
				continue;
			}
			match db.create_object_store(store_name) {
				Ok(store) => {
					for index in schema.indexes.iter().filter(|i| i.store == *store_name) {
						if let Err(err) = store.create_index_with_str(index.name, "p") {
							warn!("error creating index '{}' on '{}': {err:?}", index.name, store_name);
						}
					}
				}
				Err(err) => warn!("error creating object store '{store_name}': {err:?}"),
			}
		}
	});
	req.set_onupgradeneeded(Some(on_upgradeneeded.as_ref().unchecked_ref()));
	on_upgradeneeded.forget();
}

/// Opens (creating or upgrading as needed) the IndexedDB database `name`
/// at schema version `version`.
pub async fn open(name: &str, version: u32, schema: Schema) -> Result<Rc<dyn Database>> {
	let window = web_sys::window().ok_or_else(|| Error::Infrastructure("not running in a browser".into()))?;
	let factory = window
		.indexed_db()
		.map_err(|e| js_err("window.indexedDB", e))?
		.ok_or_else(|| Error::Infrastructure("IndexedDB is not available in this browser".into()))?;
	let open_request =
		factory.open_with_u32(name, version).map_err(|e| js_err("indexedDB.open", e))?;
	try_create_object_stores(&open_request, schema);

	let (tx, rx) = oneshot::channel::<std::result::Result<IdbDatabase, JsValue>>();
	let tx = Rc::new(RefCell::new(Some(tx)));
	let tx_ok = Rc::clone(&tx);
	let on_success = Closure::once(move |event: &Event| {
		let db: IdbDatabase = event_request(event).result().expect("request has a result").unchecked_into();
		if let Some(tx) = tx_ok.borrow_mut().take() {
			let _ = tx.send(Ok(db));
		}
	});
	let tx_err = Rc::clone(&tx);
	let on_error = Closure::once(move |event: &Event| {
		let err = event_request(event).error().map(JsValue::from).unwrap_or(JsValue::UNDEFINED);
		if let Some(tx) = tx_err.borrow_mut().take() {
			let _ = tx.send(Err(err));
		}
	});
	open_request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
	open_request.set_onerror(Some(on_error.as_ref().unchecked_ref()));
	on_success.forget();
	on_error.forget();

	let db = match rx.await {
		Ok(Ok(db)) => db,
		Ok(Err(err)) => return Err(js_err("indexedDB.open", err)),
		Err(_) => return Err(Error::Infrastructure("open request dropped before completing".into())),
	};

	Ok(Rc::new(IdbWrapperDatabase { name: name.to_string(), version, db: SendWrapper::new(db) }))
}

struct IdbWrapperDatabase {
	name: String,
	version: u32,
	db: SendWrapper<IdbDatabase>,
}

#[async_trait(?Send)]
impl Database for IdbWrapperDatabase {
	fn name(&self) -> &str {
		&self.name
	}

	fn version(&self) -> u32 {
		self.version
	}

	async fn transaction(&self, stores: &[&'static str], mode: Mode) -> Result<Rc<dyn Transaction>> {
		let names = js_sys::Array::new();
		for store in stores {
			names.push(&JsValue::from_str(store));
		}
		let txn = self
			.db
			.transaction_with_str_sequence_and_mode(&names, idb_mode(mode))
			.map_err(|e| js_err("opening transaction", e))?;

		let (tx, rx) = oneshot::channel::<std::result::Result<(), Error>>();
		let tx = Rc::new(RefCell::new(Some(tx)));

		let tx_complete = Rc::clone(&tx);
		let on_complete = Closure::once(move || {
			if let Some(tx) = tx_complete.borrow_mut().take() {
				let _ = tx.send(Ok(()));
			}
		});
		let tx_abort = Rc::clone(&tx);
		let aborted_reason = Rc::new(RefCell::new(None));
		let on_abort = {
			let aborted_reason = Rc::clone(&aborted_reason);
			Closure::once(move |event: &Event| {
				if let Some(tx) = tx_abort.borrow_mut().take() {
					let reason = aborted_reason.borrow_mut().take().unwrap_or_else(|| {
						let target = event.target().and_then(|t| t.dyn_into::<IdbTransaction>().ok());
						let err = target.and_then(|t| t.error()).map(|e| format!("{e:?}"));
						AbortReason::Explicit(err.unwrap_or_else(|| "transaction aborted".into()))
					});
					let _ = tx.send(Err(Error::Aborted(reason)));
				}
			})
		};
		let tx_error = Rc::clone(&tx);
		let on_error = Closure::once(move |_event: &Event| {
			if let Some(tx) = tx_error.borrow_mut().take() {
				let _ = tx.send(Err(Error::Infrastructure("transaction error".into())));
			}
		});
		txn.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
		txn.set_onabort(Some(on_abort.as_ref().unchecked_ref()));
		txn.set_onerror(Some(on_error.as_ref().unchecked_ref()));
		on_complete.forget();
		on_abort.forget();
		on_error.forget();

		let completion: Shared<_> = rx
			.map(|r| r.unwrap_or(Err(Error::Infrastructure("transaction dropped before completing".into()))))
			.boxed_local()
			.shared();

		Ok(Rc::new(IdbTransactionWrapper {
			shared: Rc::new(IdbTxnShared { txn: SendWrapper::new(txn), completion, aborted_reason }),
			done: RefCell::new(false),
		}))
	}
}

struct IdbTxnShared {
	txn: SendWrapper<IdbTransaction>,
	completion: Shared<futures::future::LocalBoxFuture<'static, std::result::Result<(), Error>>>,
	/// Set before `txn.abort()` is called so `on_abort` can surface the
	/// real cause instead of the generic `DOMException` message -- the
	/// browser's abort event carries no payload of its own.
	aborted_reason: Rc<RefCell<Option<AbortReason>>>,
}

impl IdbTxnShared {
	fn abort(&self, reason: AbortReason) {
		*self.aborted_reason.borrow_mut() = Some(reason);
		let _ = self.txn.abort();
	}
}

struct IdbTransactionWrapper {
	shared: Rc<IdbTxnShared>,
	done: RefCell<bool>,
}

#[async_trait(?Send)]
impl Transaction for IdbTransactionWrapper {
	fn object_store(&self, name: &'static str) -> Rc<dyn ObjectStore> {
		let store = self.shared.txn.object_store(name).expect("store was declared for this transaction");
		Rc::new(IdbObjectStoreWrapper { shared: Rc::clone(&self.shared), store: SendWrapper::new(store), name })
	}

	fn abort(&self, reason: AbortReason) {
		self.shared.abort(reason);
	}

	async fn commit(&self) -> Result<()> {
		*self.done.borrow_mut() = true;
		self.shared.completion.clone().await
	}

	async fn done(&self) -> Result<()> {
		*self.done.borrow_mut() = true;
		self.shared.completion.clone().await
	}
}

struct IdbObjectStoreWrapper {
	shared: Rc<IdbTxnShared>,
	store: SendWrapper<IdbObjectStore>,
	name: &'static str,
}

#[async_trait(?Send)]
impl ObjectStore for IdbObjectStoreWrapper {
	async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		let req = self.store.get(&bytes_to_js(key)).map_err(|e| js_err("get", e))?;
		let result = await_request(&req, "get").await?;
		Ok(unwrap_value(result))
	}

	fn get_with_listener(&self, key: &[u8], listener: Listener) {
		let req = match self.store.get(&bytes_to_js(key)) {
			Ok(req) => req,
			Err(err) => {
				warn!("get_with_listener: {err:?}");
				return;
			}
		};
		let shared = Rc::clone(&self.shared);
		let listener = RefCell::new(Some(listener));
		let on_success = Closure::once(move |event: &Event| {
			let result = event_request(event).result().unwrap_or(JsValue::UNDEFINED);
			let value = unwrap_value(result);
			if let Some(listener) = listener.borrow_mut().take() {
				if let Some(reason) = listener(&value) {
					shared.abort(reason);
				}
			}
		});
		req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
		on_success.forget();
	}

	fn put(&self, key: &[u8], value: &[u8], index_key: Option<&[u8]>) {
		let wrapped = wrap_value(value, index_key);
		if let Err(err) = self.store.put_with_key(&wrapped, &bytes_to_js(key)) {
			warn!("put into '{}' failed: {err:?}", self.name);
		}
	}

	fn delete(&self, key: &[u8]) {
		if let Err(err) = self.store.delete(&bytes_to_js(key)) {
			warn!("delete from '{}' failed: {err:?}", self.name);
		}
	}

	fn clear(&self) {
		if let Err(err) = self.store.clear() {
			warn!("clear of '{}' failed: {err:?}", self.name);
		}
	}

	fn index(&self, name: &'static str) -> Rc<dyn Index> {
		let index = self.store.index(name).expect("index was declared in the schema");
		Rc::new(IdbIndexWrapper { index: SendWrapper::new(index) })
	}
}

struct IdbIndexWrapper {
	index: SendWrapper<IdbIndex>,
}

#[async_trait(?Send)]
impl Index for IdbIndexWrapper {
	async fn get_all_keys(&self, value: &[u8]) -> Result<Vec<Vec<u8>>> {
		let req = self.index.get_all_keys_with_key(&bytes_to_js(value)).map_err(|e| js_err("get_all_keys", e))?;
		let result = await_request(&req, "get_all_keys").await?;
		let array: js_sys::Array = result.unchecked_into();
		Ok(array
			.iter()
			.map(|key| {
				let buf: js_sys::ArrayBuffer = key.unchecked_into();
				Uint8Array::new(&buf).to_vec()
			})
			.collect())
	}
}
