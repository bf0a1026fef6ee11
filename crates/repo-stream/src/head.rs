use crate::{
	remote::{HeadResponse, RepositoryService},
	Error,
};

use std::sync::Arc;

use tracing::{debug, trace};

/// Tracks the head revision of a branch with conditional requests.
pub struct ChangeDetector {
	service: Arc<dyn RepositoryService>,
	branch: String,
	revision: Option<String>,
	etag: Option<String>,
}

impl ChangeDetector {
	pub fn new(service: Arc<dyn RepositoryService>, branch: impl Into<String>) -> Self {
		Self {
			service,
			branch: branch.into(),
			revision: None,
			etag: None,
		}
	}

	/// Seeds the detector with a previously observed head. A validation token without a
	/// revision is useless, a `304` could not be answered, so it's dropped.
	#[must_use]
	pub fn resume(mut self, revision: Option<String>, etag: Option<String>) -> Self {
		self.etag = etag.filter(|_| revision.is_some());
		self.revision = revision;
		self
	}

	#[must_use]
	pub fn branch(&self) -> &str {
		&self.branch
	}

	#[must_use]
	pub fn revision(&self) -> Option<&str> {
		self.revision.as_deref()
	}

	#[must_use]
	pub fn etag(&self) -> Option<&str> {
		self.etag.as_deref()
	}

	/// Returns the current head of the branch, which may be the same revision as last time.
	///
	/// Service errors are returned as is, retrying is up to the caller.
	pub async fn check_head(&mut self) -> Result<String, Error> {
		match self
			.service
			.head(&self.branch, self.etag.as_deref())
			.await?
		{
			HeadResponse::NotModified => {
				trace!(branch = %self.branch, "Head not modified");
				self.revision.clone().ok_or_else(|| {
					// Next check must be unconditional to learn the revision
					self.etag = None;
					Error::UnknownHead
				})
			}
			HeadResponse::Modified { revision, etag } => {
				if self.revision.as_deref() != Some(revision.as_str()) {
					debug!(branch = %self.branch, %revision, previous = ?self.revision, "Head moved");
				}
				self.revision = Some(revision.clone());
				self.etag = etag;
				Ok(revision)
			}
		}
	}
}
