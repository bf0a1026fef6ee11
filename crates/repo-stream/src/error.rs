use std::{fmt::Display, io, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("request to the repository service failed: {0}")]
	Transport(#[from] reqwest::Error),
	#[error("unexpected status code {status} <url='{url}'>")]
	UnexpectedStatus { status: u16, url: String },
	#[error("failed to parse head reference response: {0}")]
	MalformedHead(#[source] serde_json::Error),
	#[error("service reported the head as not modified, but no revision is known yet")]
	UnknownHead,
	#[error("repository service error: {0}")]
	Service(String),

	#[error("failed to decode repository archive: {0}")]
	Archive(#[source] io::Error),
	#[error("malformed archive entry <path='{path}'>: {reason}")]
	MalformedEntry { path: String, reason: &'static str },
	#[error("snapshot decoder task failed: {0}")]
	SnapshotTaskJoin(#[from] tokio::task::JoinError),

	#[error("failed to parse configuration: {0}")]
	Config(#[from] toml::de::Error),
	#[error(transparent)]
	FileIO(#[from] FileIOError),

	#[error("repository stream was disposed")]
	Disposed,
}

impl Error {
	/// Errors raised by a poll cycle that are expected to go away on a later attempt.
	#[must_use]
	pub const fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Transport(_)
				| Self::UnexpectedStatus { .. }
				| Self::MalformedHead(_)
				| Self::UnknownHead
				| Self::Service(_)
				| Self::Archive(_)
				| Self::MalformedEntry { .. }
				| Self::SnapshotTaskJoin(_)
		)
	}

	/// Recovers an [`Error`] that was tunneled through an [`io::Error`] while the
	/// archive body was being read by the decoder.
	pub(crate) fn from_archive_io(e: io::Error) -> Self {
		if !e.get_ref().is_some_and(|inner| inner.is::<Self>()) {
			return Self::Archive(e);
		}

		match e.into_inner().map(|inner| inner.downcast::<Self>()) {
			Some(Ok(error)) => *error,
			Some(Err(other)) => Self::Archive(io::Error::other(other)),
			None => Self::Archive(io::Error::other("archive body stream failed")),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}
