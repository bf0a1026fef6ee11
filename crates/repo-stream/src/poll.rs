use crate::{
	config::{PollSettings, RepoStreamConfig},
	diff::diff_snapshot,
	event::ChangeEvent,
	head::ChangeDetector,
	remote::{GithubService, RepositoryService},
	scheduler::{Scheduler, TokioScheduler},
	snapshot::ArchiveSnapshotSource,
	state::RepositoryState,
	Error,
};

use std::sync::Arc;

use async_channel as chan;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
	/// No cycle completed yet, or the head moved and the new snapshot is not fully diffed
	Pending,
	/// Everything observed up to the last head check was emitted
	Ready,
	Disposed,
}

#[derive(Debug)]
pub enum StreamEvent {
	Change(ChangeEvent),
	/// A cycle completed, carrying the state the next one will be compared against
	StateUpdated(Arc<RepositoryState>),
	/// A cycle failed, the loop keeps going after the retry interval
	Error(Error),
}

/// Handle to a running poll loop.
///
/// Dropping the handle disposes the loop.
pub struct RepoStream {
	events_rx: chan::Receiver<StreamEvent>,
	readiness_rx: watch::Receiver<Readiness>,
	state_rx: watch::Receiver<Arc<RepositoryState>>,
	cancel_token: CancellationToken,
	handle: JoinHandle<()>,
	_cancel_loop: DropGuard,
}

impl RepoStream {
	/// Starts polling the GitHub repository described by `config`.
	pub fn new(config: RepoStreamConfig) -> Result<Self, Error> {
		let service = Arc::new(GithubService::new(&config)?);

		Ok(Self::spawn(
			service,
			config.poll_settings(),
			config.initial_state.unwrap_or_default(),
		))
	}

	pub fn spawn(
		service: Arc<dyn RepositoryService>,
		settings: PollSettings,
		initial_state: RepositoryState,
	) -> Self {
		Self::spawn_with_scheduler(service, settings, initial_state, Arc::new(TokioScheduler))
	}

	pub fn spawn_with_scheduler(
		service: Arc<dyn RepositoryService>,
		settings: PollSettings,
		initial_state: RepositoryState,
		scheduler: Arc<dyn Scheduler>,
	) -> Self {
		let (events_tx, events_rx) = chan::bounded(settings.event_buffer.max(1));
		let (readiness_tx, readiness_rx) = watch::channel(Readiness::Pending);
		let state = Arc::new(initial_state);
		let (state_tx, state_rx) = watch::channel(Arc::clone(&state));
		let cancel_token = CancellationToken::new();

		let detector = ChangeDetector::new(Arc::clone(&service), settings.branch.clone())
			.resume(state.revision.clone(), state.etag.clone());

		let poll_loop = PollLoop {
			detector,
			source: ArchiveSnapshotSource::new(service),
			settings,
			state,
			scheduler,
			events_tx,
			readiness_tx,
			state_tx,
			cancel_token: cancel_token.child_token(),
		};

		Self {
			events_rx,
			readiness_rx,
			state_rx,
			handle: tokio::spawn(poll_loop.run()),
			_cancel_loop: cancel_token.clone().drop_guard(),
			cancel_token,
		}
	}

	/// Next event, `None` once the loop stopped and every pending event was received
	pub async fn recv(&self) -> Option<StreamEvent> {
		self.events_rx.recv().await.ok()
	}

	/// Receiver of every event, usable as a `Stream`
	#[must_use]
	pub fn events(&self) -> chan::Receiver<StreamEvent> {
		self.events_rx.clone()
	}

	#[must_use]
	pub fn readiness(&self) -> Readiness {
		*self.readiness_rx.borrow()
	}

	#[must_use]
	pub fn is_ready(&self) -> bool {
		self.readiness() == Readiness::Ready
	}

	/// Waits until every change up to the latest head check was emitted.
	pub async fn wait_until_ready(&self) -> Result<(), Error> {
		let mut readiness_rx = self.readiness_rx.clone();
		let readiness = readiness_rx
			.wait_for(|readiness| *readiness != Readiness::Pending)
			.await
			.map(|readiness| *readiness)
			.unwrap_or(Readiness::Disposed);

		match readiness {
			Readiness::Ready => Ok(()),
			Readiness::Pending | Readiness::Disposed => Err(Error::Disposed),
		}
	}

	/// Last committed state
	#[must_use]
	pub fn state(&self) -> Arc<RepositoryState> {
		Arc::clone(&self.state_rx.borrow())
	}

	/// Stops scheduling new cycles. A cycle already running completes, but nothing it
	/// produces is emitted or committed.
	pub fn dispose(&self) {
		self.cancel_token.cancel();
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.cancel_token.is_cancelled()
	}

	/// Disposes the loop and waits for it to stop.
	pub async fn shutdown(self) {
		self.dispose();
		let Self { handle, .. } = self;
		if let Err(e) = handle.await {
			warn!(?e, "Repository poll loop did not stop cleanly;");
		}
	}
}

struct PollLoop {
	detector: ChangeDetector,
	source: ArchiveSnapshotSource,
	settings: PollSettings,
	state: Arc<RepositoryState>,
	scheduler: Arc<dyn Scheduler>,
	events_tx: chan::Sender<StreamEvent>,
	readiness_tx: watch::Sender<Readiness>,
	state_tx: watch::Sender<Arc<RepositoryState>>,
	cancel_token: CancellationToken,
}

impl PollLoop {
	async fn run(mut self) {
		loop {
			if self.cancel_token.is_cancelled() {
				break;
			}

			let delay = match self.tick().await {
				Ok(()) => self.settings.update_interval,
				Err(e) => {
					warn!(
						?e,
						retry_in = ?self.settings.retry_interval,
						"Repository poll cycle failed;",
					);
					if !self.emit(StreamEvent::Error(e)).await {
						break;
					}
					self.settings.retry_interval
				}
			};

			tokio::select! {
				() = self.cancel_token.cancelled() => break,
				() = self.scheduler.sleep(delay) => {}
			}
		}

		self.readiness_tx.send_replace(Readiness::Disposed);
		self.events_tx.close();
		debug!(branch = %self.settings.branch, "Repository poll loop stopped");
	}

	#[instrument(skip(self), fields(branch = %self.settings.branch))]
	async fn tick(&mut self) -> Result<(), Error> {
		let head = self.detector.check_head().await?;

		if self.state.revision.as_deref() == Some(head.as_str()) {
			trace!(%head, "Head unchanged, skipping snapshot");
			self.set_readiness(Readiness::Ready);
			return Ok(());
		}

		self.set_readiness(Readiness::Pending);
		debug!(%head, previous = ?self.state.revision, "Fetching snapshot");

		let (entries, stats) = {
			let events_tx = &self.events_tx;
			let cancel_token = &self.cancel_token;

			diff_snapshot(
				self.source.fetch(&head),
				&self.state.entries,
				|event| async move {
					send_unless_cancelled(events_tx, cancel_token, StreamEvent::Change(event)).await;
				},
			)
			.await?
		};

		if self.cancel_token.is_cancelled() {
			debug!(%head, "Disposed while diffing, discarding snapshot");
			return Ok(());
		}

		let state = Arc::new(RepositoryState {
			revision: Some(head),
			etag: self.detector.etag().map(str::to_string),
			entries,
		});
		self.state = Arc::clone(&state);
		self.state_tx.send_replace(Arc::clone(&state));

		info!(
			revision = ?state.revision,
			created = stats.created,
			updated = stats.updated,
			deleted = stats.deleted,
			"Repository snapshot diffed;",
		);

		self.emit(StreamEvent::StateUpdated(state)).await;
		self.set_readiness(Readiness::Ready);

		Ok(())
	}

	/// Returns `false` when nobody is listening anymore
	async fn emit(&self, event: StreamEvent) -> bool {
		send_unless_cancelled(&self.events_tx, &self.cancel_token, event).await
	}

	fn set_readiness(&self, readiness: Readiness) {
		self.readiness_tx.send_if_modified(|current| {
			if *current == readiness {
				false
			} else {
				*current = readiness;
				true
			}
		});
	}
}

/// Sends `event` unless the loop gets disposed first, so a consumer that stopped reading
/// can't keep a full channel from being torn down.
///
/// Returns `false` only when every receiver is gone.
async fn send_unless_cancelled(
	events_tx: &chan::Sender<StreamEvent>,
	cancel_token: &CancellationToken,
	event: StreamEvent,
) -> bool {
	if cancel_token.is_cancelled() {
		return true;
	}

	tokio::select! {
		biased;
		() = cancel_token.cancelled() => true,
		res = events_tx.send(event) => res.is_ok(),
	}
}
