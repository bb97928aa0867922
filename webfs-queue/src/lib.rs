//! Write-coalescing batch queue (spec.md §4.2).
//!
//! A `Queue` holds pending [`Operation`]s and folds them into as few KV
//! transactions as possible. `push` never suspends; `do_flush` awaits one
//! merged transaction and resolves every pushed operation's completion.
//!
//! The background worker (`start_async`) is only meaningful on `wasm32`:
//! it drives its tick off the browser event loop the same way
//! `kvdb-web::indexed_db::open` drives its oneshot off an IndexedDB
//! callback. `push`/`do_flush` themselves have no wasm dependency and are
//! exercised directly in this crate's tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use log::trace;

use webfs_kv::{Database, Error, Mode, Transaction};

#[cfg(target_arch = "wasm32")]
mod timer;

/// The outcome of a single queued request: the fetched value for a `get`,
/// or `None` for anything else, mirroring `ObjectStore::get`'s return type.
pub type OpResult = Result<Option<Vec<u8>>, Error>;

/// Issues one request against a live transaction. Must not borrow from the
/// transaction reference past its own call -- any store/index handle it
/// needs has to be obtained up front and moved into the returned future.
pub type OpBuilder = Box<dyn FnOnce(&dyn Transaction) -> LocalBoxFuture<'static, OpResult>>;

struct Operation {
	mode: Mode,
	stores: Vec<&'static str>,
	builder: OpBuilder,
	completion: oneshot::Sender<OpResult>,
}

/// Cancellation handle shared between a queue's background worker and
/// whoever started it, named after Go's `context.Context` per spec.md's
/// `start_async(ctx, interval, db)` signature.
#[derive(Clone, Default)]
pub struct Context {
	cancelled: Rc<std::cell::Cell<bool>>,
}

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	/// Terminates the worker this context was handed to. Idempotent.
	pub fn cancel(&self) {
		self.cancelled.set(true);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.get()
	}
}

pub struct Queue {
	max_queue: usize,
	pending: RefCell<VecDeque<Operation>>,
	ctx: RefCell<Option<Context>>,
	#[cfg(target_arch = "wasm32")]
	wake: RefCell<Option<futures::channel::mpsc::UnboundedSender<()>>>,
}

impl Queue {
	pub fn new(max_queue: usize) -> Rc<Self> {
		Rc::new(Queue {
			max_queue,
			pending: RefCell::new(VecDeque::new()),
			ctx: RefCell::new(None),
			#[cfg(target_arch = "wasm32")]
			wake: RefCell::new(None),
		})
	}

	pub fn len(&self) -> usize {
		self.pending.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Enqueues `builder` to run in a transaction opened with at least
	/// `mode` over at least `stores`. Never blocks; the returned receiver
	/// resolves once the operation's enclosing transaction terminates.
	pub fn push(&self, mode: Mode, stores: &[&'static str], builder: OpBuilder) -> oneshot::Receiver<OpResult> {
		let (tx, rx) = oneshot::channel();
		if self.ctx.borrow().as_ref().map(Context::is_cancelled).unwrap_or(false) {
			let _ = tx.send(Err(Error::Infrastructure("queue was cancelled".into())));
			return rx;
		}
		trace!("queue: push op over {stores:?} in {mode:?} mode");
		self.pending.borrow_mut().push_back(Operation { mode, stores: stores.to_vec(), builder, completion: tx });

		#[cfg(target_arch = "wasm32")]
		if self.pending.borrow().len() >= self.max_queue {
			if let Some(wake) = self.wake.borrow().as_ref() {
				let _ = wake.unbounded_send(());
			}
		}
		#[cfg(not(target_arch = "wasm32"))]
		{
			let _ = self.max_queue;
		}

		rx
	}

	/// Drains every pending operation into the minimum number of
	/// transactions the merge policy allows. This implementation always
	/// coarsens to a single transaction per `do_flush` call -- the
	/// simplest point in the range spec.md §9 permits ("implementations
	/// may coarsen; must not split an operation across transactions").
	pub async fn do_flush(&self, db: &dyn Database) -> (Vec<OpResult>, Option<Error>) {
		let ops: Vec<Operation> = self.pending.borrow_mut().drain(..).collect();
		if ops.is_empty() {
			return (Vec::new(), None);
		}

		let mut mode = Mode::ReadOnly;
		let mut stores: Vec<&'static str> = Vec::new();
		for op in &ops {
			mode = mode.merge(op.mode);
			for store in &op.stores {
				if !stores.contains(store) {
					stores.push(store);
				}
			}
		}
		trace!("queue: flushing {} op(s) over {stores:?} in {mode:?} mode", ops.len());

		let txn = match db.transaction(&stores, mode).await {
			Ok(txn) => txn,
			Err(err) => {
				let results = ops
					.into_iter()
					.map(|op| {
						let _ = op.completion.send(Err(err.clone()));
						Err(err.clone())
					})
					.collect();
				return (results, Some(err));
			}
		};

		let mut completions = Vec::with_capacity(ops.len());
		let mut results = Vec::with_capacity(ops.len());
		for op in ops {
			let value = (op.builder)(txn.as_ref()).await;
			results.push(value.clone());
			completions.push((op.completion, value));
		}

		if let Err(err) = txn.commit().await {
			for (completion, _) in completions {
				let _ = completion.send(Err(err.clone()));
			}
			let results = results.into_iter().map(|_| Err(err.clone())).collect();
			return (results, Some(err));
		}

		for (completion, value) in completions {
			let _ = completion.send(value);
		}
		(results, None)
	}

	/// Spawns a worker that flushes whenever the queue reaches `max_queue`
	/// or `interval` elapses, until `ctx` is cancelled. Browser-only: the
	/// tick comes from `Window::set_timeout`.
	#[cfg(target_arch = "wasm32")]
	pub fn start_async(self: Rc<Self>, ctx: Context, interval: std::time::Duration, db: Rc<dyn Database>) {
		use futures::{FutureExt, StreamExt};

		let (wake_tx, mut wake_rx) = futures::channel::mpsc::unbounded();
		*self.wake.borrow_mut() = Some(wake_tx);
		*self.ctx.borrow_mut() = Some(ctx.clone());

		wasm_bindgen_futures::spawn_local(async move {
			loop {
				if ctx.is_cancelled() {
					break;
				}
				futures::select! {
					_ = timer::sleep(interval).fuse() => {},
					_ = wake_rx.next() => {},
				}
				if ctx.is_cancelled() {
					break;
				}
				if !self.is_empty() {
					let (_, _) = self.do_flush(db.as_ref()).await;
				}
			}
			log::debug!("queue worker stopped");
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;
	use futures::FutureExt;
	use webfs_kv::Schema;

	const SCHEMA: Schema = Schema { stores: &["info"], indexes: &[] };

	fn put_op(key: &'static [u8], value: &'static [u8]) -> OpBuilder {
		Box::new(move |txn| {
			let store = txn.object_store("info");
			async move {
				store.put(key, value, None);
				Ok(None)
			}
			.boxed_local()
		})
	}

	fn get_op(key: &'static [u8]) -> OpBuilder {
		Box::new(move |txn| {
			let store = txn.object_store("info");
			async move { store.get(key).await }.boxed_local()
		})
	}

	#[test]
	fn flush_merges_writes_into_one_transaction() {
		block_on(async {
			let db = webfs_kv::memory::open("q", 1, &SCHEMA);
			let queue = Queue::new(100);
			for _ in 0..5 {
				queue.push(Mode::ReadWrite, &["info"], put_op(b"/a", b"v"));
			}
			let (results, err) = queue.do_flush(db.as_ref()).await;
			assert!(err.is_none());
			assert_eq!(results.len(), 5);
		});
	}

	#[test]
	fn pushed_value_is_readable_after_flush() {
		block_on(async {
			let db = webfs_kv::memory::open("q2", 1, &SCHEMA);
			let queue = Queue::new(100);
			let rx = queue.push(Mode::ReadWrite, &["info"], put_op(b"/a", b"hello"));
			queue.do_flush(db.as_ref()).await;
			rx.await.unwrap().unwrap();

			let queue = Queue::new(100);
			let rx = queue.push(Mode::ReadOnly, &["info"], get_op(b"/a"));
			queue.do_flush(db.as_ref()).await;
			assert_eq!(rx.await.unwrap().unwrap(), Some(b"hello".to_vec()));
		});
	}

	#[test]
	fn empty_flush_is_a_no_op() {
		block_on(async {
			let db = webfs_kv::memory::open("q3", 1, &SCHEMA);
			let queue = Queue::new(100);
			let (results, err) = queue.do_flush(db.as_ref()).await;
			assert!(results.is_empty());
			assert!(err.is_none());
		});
	}

	#[test]
	fn cancelled_context_fails_pending_and_future_pushes() {
		block_on(async {
			let queue = Queue::new(100);
			let ctx = Context::new();
			*queue.ctx.borrow_mut() = Some(ctx.clone());
			ctx.cancel();
			let rx = queue.push(Mode::ReadOnly, &["info"], get_op(b"/a"));
			assert!(rx.await.unwrap().is_err());
		});
	}
}
