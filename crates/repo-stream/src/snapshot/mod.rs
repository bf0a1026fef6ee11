use crate::{entry::FileSystemEntry, remote::RepositoryService, Error};

use std::{
	future::Future,
	io,
	ops::ControlFlow,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use futures::{Stream, TryStreamExt};
use tokio::{
	sync::mpsc,
	task::{spawn_blocking, JoinHandle},
};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, instrument, trace};

mod archive;

pub use archive::{decode_tar_gz, normalize_entry_path};

/// Lazy sequence of snapshot entries, fed by a background task.
///
/// The sequence ends with `None` once the snapshot is complete. A failure is delivered as a
/// single `Some(Err(_))`, after which the sequence always ends. Dropping the stream aborts the
/// producer.
pub struct SnapshotStream {
	task: JoinHandle<()>,
	receiver: mpsc::Receiver<Result<FileSystemEntry, Error>>,
	done: bool,
}

impl SnapshotStream {
	/// Entries are handed over one at a time, a producer can never run more than one entry
	/// ahead of the consumer.
	pub fn spawn<F, Fut>(producer: F) -> Self
	where
		F: FnOnce(mpsc::Sender<Result<FileSystemEntry, Error>>) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send,
	{
		let (tx, rx) = mpsc::channel(1);
		Self {
			task: tokio::spawn(async move {
				producer(tx).await;
			}),
			receiver: rx,
			done: false,
		}
	}
}

impl Stream for SnapshotStream {
	type Item = Result<FileSystemEntry, Error>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.done {
			return Poll::Ready(None);
		}

		let item = std::task::ready!(self.receiver.poll_recv(cx));
		self.done = !matches!(item, Some(Ok(_)));

		Poll::Ready(item)
	}
}

impl Drop for SnapshotStream {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Produces snapshots by downloading and decoding the repository tarball for a revision.
#[derive(Clone)]
pub struct ArchiveSnapshotSource {
	service: Arc<dyn RepositoryService>,
}

impl ArchiveSnapshotSource {
	pub fn new(service: Arc<dyn RepositoryService>) -> Self {
		Self { service }
	}

	/// Starts fetching the snapshot for `revision`.
	///
	/// A single archive request is issued per call and it is never retried.
	#[instrument(skip(self))]
	pub fn fetch(&self, revision: &str) -> SnapshotStream {
		let service = Arc::clone(&self.service);
		let revision = revision.to_owned();

		SnapshotStream::spawn(move |tx| async move {
			let body = match service.archive(&revision).await {
				Ok(body) => body,
				Err(e) => {
					tx.send(Err(e)).await.ok();
					return;
				}
			};

			debug!(%revision, "Decoding repository archive");

			let reader = SyncIoBridge::new(StreamReader::new(body.map_err(io::Error::other)));
			let entries_tx = tx.clone();
			let decoded = spawn_blocking(move || {
				decode_tar_gz(reader, |entry| {
					if entries_tx.blocking_send(Ok(entry)).is_ok() {
						ControlFlow::Continue(())
					} else {
						ControlFlow::Break(())
					}
				})
			})
			.await
			.map_err(Error::from)
			.and_then(|res| res);

			match decoded {
				Ok(()) => trace!(%revision, "Repository archive fully decoded"),
				Err(e) => {
					tx.send(Err(e)).await.ok();
				}
			}
		})
	}
}
