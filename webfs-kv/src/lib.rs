//! Transactional key/value store abstraction over IndexedDB.
//!
//! This crate is the bottom of the webfs stack: a typed restatement of
//! IndexedDB's transaction model (`Database` / `Transaction` / `ObjectStore`
//! / `Index`), an in-memory backend good enough to run the whole stack's
//! tests without a browser, and -- on `wasm32` -- a real backend bound to
//! `web_sys::IdbDatabase`.

pub mod error;
pub mod memory;
pub mod schema;
pub mod traits;

#[cfg(target_arch = "wasm32")]
pub mod idb;

pub use error::{AbortReason, Error, Result};
pub use schema::{IndexSpec, Schema};
pub use traits::{Database, Index, Listener, Mode, ObjectStore, Transaction};
