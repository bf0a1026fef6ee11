use crate::fingerprint::ContentFingerprint;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type FingerprintMap = BTreeMap<String, ContentFingerprint>;

/// Baseline a snapshot is compared against.
///
/// A value of this type is never mutated once a poll cycle starts using it; a successful
/// cycle builds a brand new one and swaps it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
	/// Revision the entries were computed from
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revision: Option<String>,
	/// Validation token returned alongside `revision` by the head check
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub etag: Option<String>,
	#[serde(default)]
	pub entries: FingerprintMap,
}

impl RepositoryState {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn fingerprint(&self, path: &str) -> Option<&ContentFingerprint> {
		self.entries.get(path)
	}
}
