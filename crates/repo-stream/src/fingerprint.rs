use crate::entry::EntryKind;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Value stored in place of a digest for directories
pub const DIRECTORY_SENTINEL: &str = "Directory";

/// Comparison key used to detect changes between two snapshots.
///
/// Files are keyed by the hex encoded SHA-512 of their content, directories by
/// [`DIRECTORY_SENTINEL`]. A hex digest can never collide with the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentFingerprint {
	Directory,
	Digest(String),
}

impl ContentFingerprint {
	#[must_use]
	pub fn of_content(content: &[u8]) -> Self {
		Self::Digest(hex::encode(Sha512::digest(content)))
	}

	#[must_use]
	pub const fn kind(&self) -> EntryKind {
		match self {
			Self::Directory => EntryKind::Directory,
			Self::Digest(_) => EntryKind::File,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		match self {
			Self::Directory => DIRECTORY_SENTINEL,
			Self::Digest(digest) => digest,
		}
	}
}

impl fmt::Display for ContentFingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<String> for ContentFingerprint {
	fn from(value: String) -> Self {
		if value == DIRECTORY_SENTINEL {
			Self::Directory
		} else {
			Self::Digest(value)
		}
	}
}

impl From<ContentFingerprint> for String {
	fn from(fingerprint: ContentFingerprint) -> Self {
		match fingerprint {
			ContentFingerprint::Directory => DIRECTORY_SENTINEL.to_string(),
			ContentFingerprint::Digest(digest) => digest,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_content_same_fingerprint() {
		assert_eq!(
			ContentFingerprint::of_content(b"hi"),
			ContentFingerprint::of_content(b"hi")
		);
		assert_ne!(
			ContentFingerprint::of_content(b"hi"),
			ContentFingerprint::of_content(b"bye")
		);
		assert_ne!(
			ContentFingerprint::of_content(b""),
			ContentFingerprint::Directory
		);
	}

	#[test]
	fn digest_is_hex_sha512() {
		let ContentFingerprint::Digest(digest) = ContentFingerprint::of_content(b"hi") else {
			panic!("files must produce a digest");
		};

		assert_eq!(digest.len(), 128);
		assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn directory_sentinel_serializes_as_plain_string() {
		let json = serde_json::to_string(&ContentFingerprint::Directory).unwrap();
		assert_eq!(json, "\"Directory\"");

		let parsed: ContentFingerprint = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed.kind(), EntryKind::Directory);
	}
}
