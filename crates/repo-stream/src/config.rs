use crate::{error::FileIOError, state::RepositoryState, Error};

use std::{fmt, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::fs;

const ONE_SEC: Duration = Duration::from_secs(1);
const ONE_MINUTE: Duration = Duration::from_secs(60);
const RETRY_BACKOFF_FACTOR: u32 = 10;

/// Credential handed to the repository service untouched
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Credential {
	Token { token: String },
	Basic { username: String, password: String },
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Token { .. } => f.debug_struct("Token").finish_non_exhaustive(),
			Self::Basic { username, .. } => f
				.debug_struct("Basic")
				.field("username", username)
				.finish_non_exhaustive(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStreamConfig {
	pub owner: String,
	pub repo: String,
	#[serde(default = "default_branch")]
	pub branch: String,
	#[serde(default)]
	pub credential: Option<Credential>,
	/// Time between two head checks, defaults to one second when authenticated and one
	/// minute otherwise, as anonymous clients get a much smaller rate limit.
	#[serde(default, with = "humantime_serde")]
	pub update_interval: Option<Duration>,
	/// Time before trying again after a failed cycle, defaults to ten times the update interval
	#[serde(default, with = "humantime_serde")]
	pub retry_interval: Option<Duration>,
	#[serde(default = "default_api_url")]
	pub api_url: String,
	#[serde(default = "default_archive_url")]
	pub archive_url: String,
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
	/// How many events can wait for the consumer before the poll loop stalls
	#[serde(default = "default_event_buffer")]
	pub event_buffer: usize,
	/// Previously saved state to resume from instead of diffing against nothing
	#[serde(skip)]
	pub initial_state: Option<RepositoryState>,
}

fn default_branch() -> String {
	"master".to_string()
}

fn default_api_url() -> String {
	"https://api.github.com".to_string()
}

fn default_archive_url() -> String {
	"https://github.com".to_string()
}

fn default_user_agent() -> String {
	concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_event_buffer() -> usize {
	64
}

impl RepoStreamConfig {
	pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
		Self {
			owner: owner.into(),
			repo: repo.into(),
			branch: default_branch(),
			credential: None,
			update_interval: None,
			retry_interval: None,
			api_url: default_api_url(),
			archive_url: default_archive_url(),
			user_agent: default_user_agent(),
			event_buffer: default_event_buffer(),
			initial_state: None,
		}
	}

	/// Reads a TOML configuration file
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "Failed to read configuration file")))?;

		Self::from_toml(&contents)
	}

	pub fn from_toml(contents: &str) -> Result<Self, Error> {
		toml::from_str(contents).map_err(Into::into)
	}

	#[must_use]
	pub fn poll_settings(&self) -> PollSettings {
		let update_interval = self.update_interval.unwrap_or(if self.credential.is_some() {
			ONE_SEC
		} else {
			ONE_MINUTE
		});

		PollSettings {
			branch: self.branch.clone(),
			update_interval,
			retry_interval: self
				.retry_interval
				.unwrap_or(update_interval * RETRY_BACKOFF_FACTOR),
			event_buffer: self.event_buffer.max(1),
		}
	}
}

/// Resolved cadence of the poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
	pub branch: String,
	pub update_interval: Duration,
	pub retry_interval: Duration,
	pub event_buffer: usize,
}

impl Default for PollSettings {
	fn default() -> Self {
		RepoStreamConfig::new("", "").poll_settings()
	}
}
