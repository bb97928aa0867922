//! Packaging sink (spec.md §4.6), grounded in
//! `original_source/internal/fs/download.go`'s `DumpZip`: walk a subtree
//! through the facade, zip every entry verbatim, then hand the bytes to a
//! browser download.

use std::io::{Cursor, Seek, Write};

use futures::future::{FutureExt, LocalBoxFuture};

use webfs_error::{Error, Result};
use webfs_fs::Filesystem;

fn infra<E: std::fmt::Display>(err: E) -> Error {
	Error::Infrastructure(err.to_string())
}

/// Zips everything under `root` (inclusive). Entry names preserve the
/// walked path verbatim, without a leading `/` (directories get a
/// trailing `/` and no payload), matching `DumpZip`'s `afero.Walk`.
pub async fn dump_zip(fs: &dyn Filesystem, root: &str) -> Result<Vec<u8>> {
	let mut buf = Vec::new();
	{
		let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
		walk(fs, root, &mut writer).await?;
		writer.finish().map_err(infra)?;
	}
	Ok(buf)
}

fn entry_name(path: &str) -> String {
	path.trim_start_matches('/').to_string()
}

fn walk<'a, W: Write + Seek>(fs: &'a dyn Filesystem, path: &'a str, writer: &'a mut zip::ZipWriter<W>) -> LocalBoxFuture<'a, Result<()>> {
	async move {
		let info = fs.stat(path).await?;
		let options = zip::write::FileOptions::default();
		if info.is_dir() {
			writer.add_directory(format!("{}/", entry_name(path)), options).map_err(infra)?;
			let mut children = fs.read_dir(path).await?;
			children.sort();
			for name in children {
				let child = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
				walk(fs, &child, &mut *writer).await?;
			}
		} else {
			writer.start_file(entry_name(path), options).map_err(infra)?;
			let file = fs.open(path).await?;
			let mut chunk = vec![0u8; 64 * 1024];
			loop {
				let n = file.read(&mut chunk, None).await?;
				if n == 0 {
					break;
				}
				writer.write_all(&chunk[..n]).map_err(infra)?;
			}
		}
		Ok(())
	}
	.boxed_local()
}

/// `DumpZip`'s filename derivation: path separators become `-`, then a
/// `.zip` suffix.
pub fn download_name(path: &str) -> String {
	format!("{}.zip", entry_name(path).replace('/', "-"))
}

/// Walks `root`, zips it, and starts a browser download of the result
/// named by `download_name(root)`.
pub async fn download_zip(fs: &dyn Filesystem, root: &str) -> Result<()> {
	let bytes = dump_zip(fs, root).await?;
	start_download("application/zip", &download_name(root), &bytes)
}

#[cfg(target_arch = "wasm32")]
fn start_download(content_type: &str, filename: &str, bytes: &[u8]) -> Result<()> {
	use wasm_bindgen::{JsCast, JsValue};
	use web_sys::{Blob, BlobPropertyBag, HtmlAnchorElement, Url};

	let array = js_sys::Uint8Array::from(bytes);
	let parts = js_sys::Array::new();
	parts.push(&array.buffer());

	let mut options = BlobPropertyBag::new();
	options.type_(content_type);
	let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options).map_err(js_infra)?;
	let url = Url::create_object_url_with_blob(&blob).map_err(js_infra)?;

	let window = web_sys::window().expect("no global `window` exists");
	let document = window.document().expect("no document on window");
	let element = document.create_element("a").map_err(js_infra)?;
	let anchor: HtmlAnchorElement = element.dyn_into().map_err(|_| Error::Infrastructure("created element is not an anchor".to_string()))?;
	anchor.set_href(&url);
	anchor.set_download(filename);
	anchor.click();
	let _ = Url::revoke_object_url(&url);
	Ok(())
}

#[cfg(target_arch = "wasm32")]
fn js_infra(value: wasm_bindgen::JsValue) -> Error {
	Error::Infrastructure(format!("{value:?}"))
}

#[cfg(not(target_arch = "wasm32"))]
fn start_download(_content_type: &str, _filename: &str, _bytes: &[u8]) -> Result<()> {
	Err(Error::NotSupported("browser download is only available on wasm32".to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;
	use webfs_fs::IdbFilesystem;
	use webfs_store::{cache_everything, RecordStore};
	use zip::ZipArchive;

	fn fs() -> std::rc::Rc<IdbFilesystem> {
		let db = webfs_kv::memory::open("archive-test", 1, &webfs_store::SCHEMA);
		let store = std::rc::Rc::new(RecordStore::new(db, cache_everything(), 64));
		IdbFilesystem::new("test", store)
	}

	#[test]
	fn dump_zip_preserves_paths_and_bytes() {
		block_on(async {
			let fs = fs();
			fs.mkdir("/a", 0o755).await.unwrap();
			let file = fs.create("/a/b").await.unwrap();
			file.write(b"hello").unwrap();
			file.close().await.unwrap();

			let bytes = dump_zip(&*fs, "/a").await.unwrap();
			let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
			let mut names: Vec<String> = (0..archive.len()).map(|i| archive.by_index(i).unwrap().name().to_string()).collect();
			names.sort();
			assert_eq!(names, vec!["a/".to_string(), "a/b".to_string()]);

			let mut body = String::new();
			std::io::Read::read_to_string(&mut archive.by_name("a/b").unwrap(), &mut body).unwrap();
			assert_eq!(body, "hello");
		});
	}

	#[test]
	fn download_name_replaces_separators() {
		assert_eq!(download_name("/projects/demo"), "projects-demo.zip");
	}
}
