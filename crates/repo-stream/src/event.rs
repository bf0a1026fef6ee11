use crate::entry::{EntryKind, FileSystemEntry};

use std::fmt;

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
	Create,
	Update,
	Delete,
}

impl fmt::Display for ChangeAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Create => write!(f, "Create"),
			Self::Update => write!(f, "Update"),
			Self::Delete => write!(f, "Delete"),
		}
	}
}

/// A single change between two snapshots, `body` is only set on file creates and updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
	pub kind: EntryKind,
	pub action: ChangeAction,
	pub path: String,
	pub body: Option<Bytes>,
}

impl ChangeEvent {
	pub(crate) fn create(entry: FileSystemEntry) -> Self {
		Self::with_body(ChangeAction::Create, entry)
	}

	pub(crate) fn update(entry: FileSystemEntry) -> Self {
		Self::with_body(ChangeAction::Update, entry)
	}

	pub(crate) fn delete(kind: EntryKind, path: String) -> Self {
		Self {
			kind,
			action: ChangeAction::Delete,
			path,
			body: None,
		}
	}

	fn with_body(action: ChangeAction, entry: FileSystemEntry) -> Self {
		match entry {
			FileSystemEntry::Directory { path } => Self {
				kind: EntryKind::Directory,
				action,
				path,
				body: None,
			},
			FileSystemEntry::File { path, content } => Self {
				kind: EntryKind::File,
				action,
				path,
				body: Some(content),
			},
		}
	}
}

impl fmt::Display for ChangeEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {}", self.action, self.kind, self.path)?;
		if let Some(body) = &self.body {
			write!(f, " ({} bytes)", body.len())?;
		}
		Ok(())
	}
}
