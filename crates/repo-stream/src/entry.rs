use crate::fingerprint::ContentFingerprint;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
	Directory,
	File,
}

impl fmt::Display for EntryKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Directory => write!(f, "Directory"),
			Self::File => write!(f, "File"),
		}
	}
}

/// One node of a repository snapshot.
///
/// Paths are root relative, always start with `/` and never end with one, except for the
/// repository root itself which is `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemEntry {
	Directory { path: String },
	File { path: String, content: Bytes },
}

impl FileSystemEntry {
	pub fn directory(path: impl Into<String>) -> Self {
		Self::Directory { path: path.into() }
	}

	pub fn file(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
		Self::File {
			path: path.into(),
			content: content.into(),
		}
	}

	#[must_use]
	pub const fn kind(&self) -> EntryKind {
		match self {
			Self::Directory { .. } => EntryKind::Directory,
			Self::File { .. } => EntryKind::File,
		}
	}

	#[must_use]
	pub fn path(&self) -> &str {
		match self {
			Self::Directory { path } | Self::File { path, .. } => path,
		}
	}

	#[must_use]
	pub fn fingerprint(&self) -> ContentFingerprint {
		match self {
			Self::Directory { .. } => ContentFingerprint::Directory,
			Self::File { content, .. } => ContentFingerprint::of_content(content),
		}
	}
}
