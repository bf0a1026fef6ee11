//! Tarball decoding.
//!
//! Repository services serve snapshots as a gzipped tarball whose entries all live under a
//! single wrapper directory (`<repo>-<revision>/`). Decoding is blocking work, it runs on
//! whatever thread the caller picked, usually through `spawn_blocking`.

use crate::{
	entry::{EntryKind, FileSystemEntry},
	Error,
};

use std::{
	io::Read,
	ops::ControlFlow,
	path::{Component, Path},
};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{trace, warn};

/// Decodes a gzipped tarball, handing every directory and fully read file to `sink` in
/// archive order. Decoding stops early, without error, when `sink` breaks.
pub fn decode_tar_gz(
	reader: impl Read,
	mut sink: impl FnMut(FileSystemEntry) -> ControlFlow<()>,
) -> Result<(), Error> {
	let mut archive = Archive::new(GzDecoder::new(reader));

	for entry in archive.entries().map_err(Error::from_archive_io)? {
		let mut entry = entry.map_err(Error::from_archive_io)?;

		let kind = match entry.header().entry_type() {
			EntryType::Directory => EntryKind::Directory,
			EntryType::Regular | EntryType::Continuous => EntryKind::File,
			other => {
				trace!(?other, "Skipping archive entry that is neither a file nor a directory");
				continue;
			}
		};

		let raw_path = entry.path().map_err(Error::from_archive_io)?.into_owned();
		let path = normalize_entry_path(&raw_path)?;

		let decoded = match kind {
			EntryKind::Directory => FileSystemEntry::Directory { path },
			EntryKind::File if path == "/" => {
				warn!(
					raw_path = %raw_path.display(),
					"Skipping file stored outside of the archive wrapper directory;",
				);
				continue;
			}
			EntryKind::File => {
				let mut content =
					Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
				entry
					.read_to_end(&mut content)
					.map_err(Error::from_archive_io)?;

				FileSystemEntry::File {
					path,
					content: content.into(),
				}
			}
		};

		if sink(decoded).is_break() {
			trace!("Snapshot consumer went away, stopping archive decoding");
			return Ok(());
		}
	}

	Ok(())
}

/// Strips the archive wrapper directory and turns the remaining components into a root
/// relative, `/` separated path.
pub fn normalize_entry_path(raw: &Path) -> Result<String, Error> {
	let malformed = |reason| Error::MalformedEntry {
		path: raw.display().to_string(),
		reason,
	};

	let mut components = raw
		.components()
		.filter(|component| !matches!(component, Component::CurDir));

	let Some(Component::Normal(_)) = components.next() else {
		return Err(malformed("missing archive wrapper directory"));
	};

	let mut path = String::with_capacity(raw.as_os_str().len());
	for component in components {
		let Component::Normal(part) = component else {
			return Err(malformed("path escapes the archive root"));
		};

		path.push('/');
		path.push_str(part.to_str().ok_or_else(|| malformed("path is not valid UTF-8"))?);
	}

	if path.is_empty() {
		path.push('/');
	}

	Ok(path)
}
