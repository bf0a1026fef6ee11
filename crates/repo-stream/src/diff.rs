//! Snapshot to state diffing.
//!
//! [`StateDiff`] walks a snapshot one entry at a time against a borrowed prior
//! [`FingerprintMap`], producing change events for entries as they arrive and the deletions
//! once the snapshot is exhausted. The prior map is never touched, the new map is only handed
//! out by [`StateDiff::finish`], so a snapshot that fails halfway leaves the caller with the
//! exact baseline it started from.

use crate::{
	entry::FileSystemEntry,
	event::{ChangeAction, ChangeEvent},
	state::FingerprintMap,
	Error,
};

use std::future::Future;

use futures::{Stream, StreamExt};
use tracing::warn;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
	pub created: usize,
	pub updated: usize,
	pub deleted: usize,
}

impl DiffStats {
	#[must_use]
	pub const fn total(&self) -> usize {
		self.created + self.updated + self.deleted
	}

	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.total() == 0
	}

	fn record(&mut self, event: &ChangeEvent) {
		match event.action {
			ChangeAction::Create => self.created += 1,
			ChangeAction::Update => self.updated += 1,
			ChangeAction::Delete => self.deleted += 1,
		}
	}
}

pub struct StateDiff<'prior> {
	prior: &'prior FingerprintMap,
	next: FingerprintMap,
}

impl<'prior> StateDiff<'prior> {
	#[must_use]
	pub fn new(prior: &'prior FingerprintMap) -> Self {
		Self {
			prior,
			next: FingerprintMap::new(),
		}
	}

	/// Records `entry` in the new state and returns the events it causes.
	///
	/// A path that changes kind yields a delete of the old kind followed by a create of the
	/// new one, never an update. A path seen twice in the same snapshot is diffed against its
	/// first occurrence.
	pub fn observe(&mut self, entry: FileSystemEntry) -> Vec<ChangeEvent> {
		let fingerprint = entry.fingerprint();
		let path = entry.path().to_owned();

		let duplicate = self.next.insert(path.clone(), fingerprint.clone());
		if let Some(duplicate) = &duplicate {
			warn!(%path, %duplicate, "Snapshot contains the same path twice;");
		}

		// A repeated path is compared with its earlier copy, which was already reported
		match duplicate.as_ref().or_else(|| self.prior.get(&path)) {
			Some(previous) if *previous == fingerprint => vec![],
			Some(previous) if previous.kind() != fingerprint.kind() => vec![
				ChangeEvent::delete(previous.kind(), path),
				ChangeEvent::create(entry),
			],
			Some(_) => vec![ChangeEvent::update(entry)],
			None => vec![ChangeEvent::create(entry)],
		}
	}

	/// Closes the diff, returning the deletions for every prior path the snapshot did not
	/// contain along with the new state.
	///
	/// Deletions come in reverse path order, so children are removed before their parents.
	#[must_use]
	pub fn finish(self) -> (Vec<ChangeEvent>, FingerprintMap) {
		let deletions = self
			.prior
			.iter()
			.rev()
			.filter(|(path, _)| !self.next.contains_key(*path))
			.map(|(path, fingerprint)| ChangeEvent::delete(fingerprint.kind(), path.clone()))
			.collect();

		(deletions, self.next)
	}
}

/// Diffs a whole in-memory snapshot at once.
#[must_use]
pub fn diff_entries(
	entries: impl IntoIterator<Item = FileSystemEntry>,
	prior: &FingerprintMap,
) -> (Vec<ChangeEvent>, FingerprintMap) {
	let mut diff = StateDiff::new(prior);
	let mut events = entries
		.into_iter()
		.flat_map(|entry| diff.observe(entry))
		.collect::<Vec<_>>();

	let (deletions, next) = diff.finish();
	events.extend(deletions);

	(events, next)
}

/// Drains `snapshot`, handing every change event to `emit` in order.
///
/// Returns the new state only when the snapshot ended without errors. On error, events
/// already emitted stand, and no deletions are emitted at all since the snapshot is incomplete.
pub async fn diff_snapshot<S, F, Fut>(
	snapshot: S,
	prior: &FingerprintMap,
	mut emit: F,
) -> Result<(FingerprintMap, DiffStats), Error>
where
	S: Stream<Item = Result<FileSystemEntry, Error>>,
	F: FnMut(ChangeEvent) -> Fut,
	Fut: Future<Output = ()>,
{
	let mut snapshot = std::pin::pin!(snapshot);
	let mut diff = StateDiff::new(prior);
	let mut stats = DiffStats::default();

	while let Some(entry) = snapshot.next().await {
		for event in diff.observe(entry?) {
			stats.record(&event);
			emit(event).await;
		}
	}

	let (deletions, next) = diff.finish();
	for event in deletions {
		stats.record(&event);
		emit(event).await;
	}

	Ok((next, stats))
}
