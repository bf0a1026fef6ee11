use crate::{
	entry::EntryKind,
	error::FileIOError,
	event::{ChangeAction, ChangeEvent},
	Error,
};

use std::{
	io,
	path::{Component, Path, PathBuf},
};

use tokio::fs;
use tracing::{trace, warn};

/// Keeps a local directory in sync with the repository by applying change events to it.
#[derive(Debug, Clone)]
pub struct DirectoryMirror {
	root: PathBuf,
}

impl DirectoryMirror {
	pub async fn create(root: impl AsRef<Path>) -> Result<Self, Error> {
		let root = root.as_ref();
		fs::create_dir_all(root)
			.await
			.map_err(|e| FileIOError::from((root, e, "Failed to create mirror root")))?;

		Ok(Self {
			root: root.to_path_buf(),
		})
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Maps a repository path to its place under the mirror root.
	///
	/// Only plain components are accepted, nothing can land outside of the root.
	pub fn local_path(&self, path: &str) -> Result<PathBuf, Error> {
		let relative = Path::new(path.trim_start_matches('/'));

		if !relative
			.components()
			.all(|component| matches!(component, Component::Normal(_)))
		{
			return Err(Error::MalformedEntry {
				path: path.to_string(),
				reason: "path escapes the mirror root",
			});
		}

		Ok(self.root.join(relative))
	}

	pub async fn apply(&self, event: &ChangeEvent) -> Result<(), Error> {
		let local_path = self.local_path(&event.path)?;
		trace!(%event, local_path = %local_path.display(), "Applying change to mirror");

		match (event.action, event.kind) {
			(ChangeAction::Create | ChangeAction::Update, EntryKind::Directory) => {
				fs::create_dir_all(&local_path)
					.await
					.map_err(|e| FileIOError::from((&local_path, e, "Failed to create directory")))?;
			}

			(ChangeAction::Create | ChangeAction::Update, EntryKind::File) => {
				if let Some(parent) = local_path.parent() {
					fs::create_dir_all(parent).await.map_err(|e| {
						FileIOError::from((parent, e, "Failed to create parent directory"))
					})?;
				}

				fs::write(&local_path, event.body.as_deref().unwrap_or_default())
					.await
					.map_err(|e| FileIOError::from((&local_path, e, "Failed to write file")))?;
			}

			(ChangeAction::Delete, _) if local_path == self.root => {
				warn!("Refusing to delete the mirror root;");
			}

			(ChangeAction::Delete, EntryKind::Directory) => {
				let res = fs::remove_dir_all(&local_path).await;
				self.already_gone(&local_path, res)
					.await
					.map_err(|e| FileIOError::from((&local_path, e, "Failed to remove directory")))?;
			}

			(ChangeAction::Delete, EntryKind::File) => {
				let res = fs::remove_file(&local_path).await;
				self.already_gone(&local_path, res)
					.await
					.map_err(|e| FileIOError::from((&local_path, e, "Failed to remove file")))?;
			}
		}

		Ok(())
	}

	/// Failed removals are fine when the path doesn't exist anymore: either it's missing, or one
	/// of its parents was replaced by a file, which happens when a directory becomes a file and
	/// its children are deleted afterwards.
	async fn already_gone(&self, local_path: &Path, res: io::Result<()>) -> io::Result<()> {
		let e = match res {
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
			Err(e) => e,
			Ok(()) => return Ok(()),
		};

		for ancestor in local_path
			.ancestors()
			.skip(1)
			.take_while(|ancestor| *ancestor != self.root && ancestor.starts_with(&self.root))
		{
			if let Ok(metadata) = fs::symlink_metadata(ancestor).await {
				if !metadata.is_dir() {
					trace!(
						local_path = %local_path.display(),
						ancestor = %ancestor.display(),
						"Path is shadowed by a file, nothing to remove",
					);
					return Ok(());
				}
			}
		}

		Err(e)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{diff::diff_entries, entry::FileSystemEntry, state::FingerprintMap};

	use tempfile::tempdir;

	#[test]
	fn rejects_paths_leaving_the_root() {
		let mirror = DirectoryMirror {
			root: PathBuf::from("/tmp/mirror"),
		};

		assert_eq!(
			mirror.local_path("/src/lib.rs").unwrap(),
			PathBuf::from("/tmp/mirror/src/lib.rs")
		);
		assert_eq!(mirror.local_path("/").unwrap(), PathBuf::from("/tmp/mirror"));
		assert!(matches!(
			mirror.local_path("/../etc/passwd"),
			Err(Error::MalformedEntry { .. })
		));
	}

	#[tokio::test]
	async fn applies_creates_updates_and_deletes() {
		let dir = tempdir().unwrap();
		let mirror = DirectoryMirror::create(dir.path().join("mirror")).await.unwrap();

		mirror
			.apply(&ChangeEvent::create(FileSystemEntry::directory("/")))
			.await
			.unwrap();
		mirror
			.apply(&ChangeEvent::create(FileSystemEntry::file(
				"/docs/README.md",
				&b"hi"[..],
			)))
			.await
			.unwrap();

		let readme = mirror.root().join("docs/README.md");
		assert_eq!(fs::read(&readme).await.unwrap(), b"hi");

		mirror
			.apply(&ChangeEvent::update(FileSystemEntry::file(
				"/docs/README.md",
				&b"hello"[..],
			)))
			.await
			.unwrap();
		assert_eq!(fs::read(&readme).await.unwrap(), b"hello");

		mirror
			.apply(&ChangeEvent::delete(EntryKind::File, "/docs/README.md".to_string()))
			.await
			.unwrap();
		assert!(!readme.exists());

		mirror
			.apply(&ChangeEvent::delete(EntryKind::Directory, "/docs".to_string()))
			.await
			.unwrap();
		assert!(!mirror.root().join("docs").exists());

		// Already gone is fine, the root always stays
		mirror
			.apply(&ChangeEvent::delete(EntryKind::Directory, "/docs".to_string()))
			.await
			.unwrap();
		mirror
			.apply(&ChangeEvent::delete(EntryKind::Directory, "/".to_string()))
			.await
			.unwrap();
		assert!(mirror.root().exists());
	}

	#[tokio::test]
	async fn directory_replaced_by_file_mirrors_cleanly() {
		let dir = tempdir().unwrap();
		let mirror = DirectoryMirror::create(dir.path()).await.unwrap();

		let (created, prior) = diff_entries(
			vec![
				FileSystemEntry::directory("/"),
				FileSystemEntry::directory("/a"),
				FileSystemEntry::directory("/a/nested"),
				FileSystemEntry::file("/a/b.txt", &b"b"[..]),
				FileSystemEntry::file("/a/nested/c.txt", &b"c"[..]),
			],
			&FingerprintMap::new(),
		);
		for event in &created {
			mirror.apply(event).await.unwrap();
		}
		assert!(mirror.root().join("a/nested/c.txt").exists());

		let (events, _) = diff_entries(
			vec![
				FileSystemEntry::directory("/"),
				FileSystemEntry::file("/a", &b"now a file"[..]),
			],
			&prior,
		);
		// Children of `/a` are deleted after it turned into a file
		assert_eq!(events[0].action, ChangeAction::Delete);
		assert_eq!(events[1].action, ChangeAction::Create);
		assert!(events[2..]
			.iter()
			.all(|event| event.action == ChangeAction::Delete && event.path.starts_with("/a/")));

		for event in &events {
			mirror.apply(event).await.unwrap();
		}

		assert_eq!(fs::read(mirror.root().join("a")).await.unwrap(), b"now a file");
	}

	#[tokio::test]
	async fn other_removal_failures_are_reported() {
		let dir = tempdir().unwrap();
		let mirror = DirectoryMirror::create(dir.path()).await.unwrap();

		mirror
			.apply(&ChangeEvent::create(FileSystemEntry::directory("/a")))
			.await
			.unwrap();

		// Removing a directory as if it were a file fails for a real reason
		assert!(matches!(
			mirror
				.apply(&ChangeEvent::delete(EntryKind::File, "/a".to_string()))
				.await,
			Err(Error::FileIO(_))
		));
	}
}
