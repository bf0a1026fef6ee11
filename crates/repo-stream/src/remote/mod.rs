use crate::Error;

use bytes::Bytes;
use futures::stream::BoxStream;

mod github;

pub use github::{GithubService, RateLimit};

/// Raw bytes of a compressed repository archive
pub type ArchiveStream = BoxStream<'static, Result<Bytes, Error>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadResponse {
	/// The validation token sent along still matches, the head did not move
	NotModified,
	Modified {
		revision: String,
		etag: Option<String>,
	},
}

/// Remote service hosting the repository.
///
/// Implementations must not retry on their own, every failure is reported back so the poll
/// loop can apply its retry cadence.
#[async_trait::async_trait]
pub trait RepositoryService: Send + Sync + 'static {
	/// Conditionally fetches the head revision of `branch`, `etag` being the validation token
	/// returned by the last [`HeadResponse::Modified`], if any.
	async fn head(&self, branch: &str, etag: Option<&str>) -> Result<HeadResponse, Error>;

	/// Opens a gzipped tarball of the whole tree at `revision`.
	async fn archive(&self, revision: &str) -> Result<ArchiveStream, Error>;
}
