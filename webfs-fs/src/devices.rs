//! `/dev/stdout`, `/dev/stderr`, `/dev/null` (spec.md §6), grounded in
//! `original_source/internal/fs/stdout.go` and `null_file.go`.
//!
//! Mounted like any other backend (spec.md §4.5 doesn't special-case
//! devices), at `/dev`, so the mount composer's ordinary longest-prefix
//! routing is what gets a caller here.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;

use webfs_error::{Error, Result};

use crate::facade::{flags, File, Filesystem, Stat};

/// Buffered writes are flushed whole once they exceed this many bytes,
/// even without a trailing newline (`original_source`'s literal `4096`).
const FLUSH_THRESHOLD: usize = 4096;

/// A write-only, line-buffered sink (`original_source`'s `bufferedLogger`):
/// writes only accumulate; a periodic tick (§6's 500ms) or an explicit
/// `flush` decides what actually gets emitted.
pub struct LineBufferedSink {
	label: &'static str,
	buffer: RefCell<Vec<u8>>,
}

impl LineBufferedSink {
	fn new(label: &'static str) -> Rc<Self> {
		Rc::new(LineBufferedSink { label, buffer: RefCell::new(Vec::new()) })
	}

	fn push(&self, bytes: &[u8]) {
		self.buffer.borrow_mut().extend_from_slice(bytes);
	}

	/// `original_source`'s `flush()`: nothing buffered is a no-op; no
	/// newline found, or the buffer exceeds the 4096-byte ceiling, flushes
	/// everything; otherwise flushes up to and including the last
	/// newline, leaving the remainder buffered.
	pub fn flush(&self) {
		let mut buffer = self.buffer.borrow_mut();
		if buffer.is_empty() {
			return;
		}
		let split = match buffer.iter().rposition(|&b| b == b'\n') {
			Some(i) if buffer.len() <= FLUSH_THRESHOLD => i + 1,
			_ => buffer.len(),
		};
		let chunk: Vec<u8> = buffer.drain(..split).collect();
		drop(buffer);
		let text = String::from_utf8_lossy(&chunk);
		match self.label {
			"stdout" => log::info!(target: "webfs::dev::stdout", "{text}"),
			_ => log::error!(target: "webfs::dev::stderr", "{text}"),
		}
	}
}

#[cfg(target_arch = "wasm32")]
fn start_ticking(sink: Rc<LineBufferedSink>) {
	wasm_bindgen_futures::spawn_local(async move {
		loop {
			crate::timer::sleep(std::time::Duration::from_millis(500)).await;
			sink.flush();
		}
	});
}

struct SinkFile {
	sink: Rc<LineBufferedSink>,
}

#[async_trait(?Send)]
impl File for SinkFile {
	async fn read(&self, _buf: &mut [u8], _position: Option<u64>) -> Result<usize> {
		Ok(0)
	}

	fn write(&self, buf: &[u8]) -> Result<usize> {
		self.sink.push(buf);
		Ok(buf.len())
	}

	async fn close(&self) -> Result<()> {
		self.sink.flush();
		Ok(())
	}
}

/// `original_source`'s `nullFile`: reads report EOF immediately, writes
/// are accepted and discarded, and it is never a directory.
struct NullFile;

#[async_trait(?Send)]
impl File for NullFile {
	async fn read(&self, _buf: &mut [u8], _position: Option<u64>) -> Result<usize> {
		Ok(0)
	}

	fn write(&self, buf: &[u8]) -> Result<usize> {
		Ok(buf.len())
	}

	async fn close(&self) -> Result<()> {
		Ok(())
	}
}

/// The `/dev` mount backend: `stdout`, `stderr`, `null`, nothing else.
pub struct DevFs {
	stdout: Rc<LineBufferedSink>,
	stderr: Rc<LineBufferedSink>,
}

impl DevFs {
	pub fn new() -> Rc<Self> {
		let stdout = LineBufferedSink::new("stdout");
		let stderr = LineBufferedSink::new("stderr");
		#[cfg(target_arch = "wasm32")]
		{
			start_ticking(Rc::clone(&stdout));
			start_ticking(Rc::clone(&stderr));
		}
		Rc::new(DevFs { stdout, stderr })
	}
}

#[async_trait(?Send)]
impl Filesystem for DevFs {
	fn name(&self) -> &str {
		"dev"
	}

	async fn create(&self, path: &str) -> Result<Rc<dyn File>> {
		self.open_file(path, flags::WRONLY, 0).await
	}

	async fn open(&self, path: &str) -> Result<Rc<dyn File>> {
		self.open_file(path, flags::RDONLY, 0).await
	}

	async fn open_file(&self, path: &str, _flags: u32, _mode: u32) -> Result<Rc<dyn File>> {
		match path {
			"/dev/stdout" => Ok(Rc::new(SinkFile { sink: Rc::clone(&self.stdout) })),
			"/dev/stderr" => Ok(Rc::new(SinkFile { sink: Rc::clone(&self.stderr) })),
			"/dev/null" => Ok(Rc::new(NullFile)),
			other => Err(Error::NotExist(other.to_string())),
		}
	}

	async fn mkdir(&self, path: &str, _mode: u32) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}

	async fn mkdir_all(&self, path: &str, _mode: u32) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}

	async fn remove(&self, path: &str) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}

	async fn remove_all(&self, path: &str) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}

	async fn rename(&self, old: &str, _new: &str) -> Result<()> {
		Err(Error::NotSupported(old.to_string()))
	}

	async fn stat(&self, path: &str) -> Result<Stat> {
		match path {
			"/dev/stdout" | "/dev/stderr" | "/dev/null" => Ok(Stat { name: webfs_store::path::base(path), mode: 0, size: 0, mtime: 0 }),
			other => Err(Error::NotExist(other.to_string())),
		}
	}

	async fn lstat_if_possible(&self, path: &str) -> Result<(Stat, bool)> {
		Ok((self.stat(path).await?, false))
	}

	async fn chmod(&self, path: &str, _mode: u32) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}

	async fn chtimes(&self, path: &str, _mtime: i64) -> Result<()> {
		Err(Error::NotSupported(path.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;

	#[test]
	fn null_reads_eof_and_discards_writes() {
		block_on(async {
			let dev = DevFs::new();
			let file = dev.open("/dev/null").await.unwrap();
			let mut buf = [0u8; 4];
			assert_eq!(file.read(&mut buf, None).await.unwrap(), 0);
			assert_eq!(file.write(b"ignored").unwrap(), 7);
		});
	}

	#[test]
	fn stdout_buffers_until_flushed() {
		block_on(async {
			let dev = DevFs::new();
			let file = dev.open("/dev/stdout").await.unwrap();
			file.write(b"no newline yet").unwrap();
			assert_eq!(dev.stdout.buffer.borrow().len(), 14);
			dev.stdout.flush();
			assert!(dev.stdout.buffer.borrow().is_empty());
		});
	}

	#[test]
	fn flush_keeps_partial_line_after_last_newline() {
		block_on(async {
			let sink = LineBufferedSink::new("stdout");
			sink.push(b"one\ntwo");
			sink.flush();
			assert_eq!(sink.buffer.borrow().as_slice(), b"two");
		});
	}

	#[test]
	fn unknown_dev_path_is_not_exist() {
		block_on(async {
			let dev = DevFs::new();
			assert!(dev.stat("/dev/tty").await.unwrap_err().is_not_exist());
		});
	}
}
