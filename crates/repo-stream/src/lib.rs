//! Change stream over a remote git repository.
//!
//! A [`RepoStream`] polls the head of a branch with conditional requests. Whenever the head
//! moves, it downloads the tarball snapshot of the new revision and diffs it against the
//! fingerprints of the previous one. The consumer receives a [`ChangeEvent`] for every entry
//! that was created, updated or deleted.
//!
//! Each successful cycle is followed by a [`StreamEvent::StateUpdated`] carrying the new
//! [`RepositoryState`]. Persisting it and handing it back through
//! [`RepoStreamConfig::initial_state`] resumes the stream without replaying the whole tree.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod diff;
mod entry;
mod error;
mod event;
mod fingerprint;
mod head;
mod mirror;
mod poll;
mod remote;
mod scheduler;
mod snapshot;
mod state;

pub use config::{Credential, PollSettings, RepoStreamConfig};
pub use diff::{diff_entries, diff_snapshot, DiffStats, StateDiff};
pub use entry::{EntryKind, FileSystemEntry};
pub use error::{Error, FileIOError, Result};
pub use event::{ChangeAction, ChangeEvent};
pub use fingerprint::{ContentFingerprint, DIRECTORY_SENTINEL};
pub use head::ChangeDetector;
pub use mirror::DirectoryMirror;
pub use poll::{Readiness, RepoStream, StreamEvent};
pub use remote::{ArchiveStream, GithubService, HeadResponse, RateLimit, RepositoryService};
pub use scheduler::{Scheduler, TokioScheduler};
pub use snapshot::{
	decode_tar_gz, normalize_entry_path, ArchiveSnapshotSource, SnapshotStream,
};
pub use state::{FingerprintMap, RepositoryState};
