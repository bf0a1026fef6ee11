use sd_repo_stream::{
	Credential, DirectoryMirror, RepoStream, RepoStreamConfig, RepositoryState, StreamEvent,
};

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use humantime_serde::re::humantime;
use tokio::fs;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
	name = "sd-repo-mirror",
	about = "Follows a GitHub branch and mirrors its tree into a local directory"
)]
struct Cli {
	/// Repository owner, required unless given by the configuration file
	owner: Option<String>,

	/// Repository name, required unless given by the configuration file
	repo: Option<String>,

	/// TOML configuration file, command line flags take precedence over it
	#[arg(long)]
	config: Option<PathBuf>,

	#[arg(long)]
	branch: Option<String>,

	/// Personal access token, raises the rate limit and the default poll frequency
	#[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
	token: Option<String>,

	/// Time between two head checks, e.g. `30s`
	#[arg(long, value_parser = humantime::parse_duration)]
	interval: Option<Duration>,

	/// Time before retrying a failed cycle
	#[arg(long, value_parser = humantime::parse_duration)]
	retry_interval: Option<Duration>,

	/// JSON file the stream state is saved to after every cycle and resumed from on start
	#[arg(long)]
	state_file: Option<PathBuf>,

	/// Directory the repository tree gets mirrored into, changes are only logged without it
	#[arg(long)]
	mirror_dir: Option<PathBuf>,
}

impl Cli {
	async fn into_config(self) -> Result<(RepoStreamConfig, Option<PathBuf>, Option<PathBuf>)> {
		let mut config = match (&self.config, self.owner, self.repo) {
			(Some(path), owner, repo) => {
				let mut config = RepoStreamConfig::load(path).await?;
				if let Some(owner) = owner {
					config.owner = owner;
				}
				if let Some(repo) = repo {
					config.repo = repo;
				}
				config
			}
			(None, Some(owner), Some(repo)) => RepoStreamConfig::new(owner, repo),
			(None, _, _) => bail!("either <OWNER> <REPO> or --config must be given"),
		};

		if let Some(branch) = self.branch {
			config.branch = branch;
		}
		if let Some(token) = self.token {
			config.credential = Some(Credential::Token { token });
		}
		if self.interval.is_some() {
			config.update_interval = self.interval;
		}
		if self.retry_interval.is_some() {
			config.retry_interval = self.retry_interval;
		}

		if let Some(state_file) = &self.state_file {
			config.initial_state = load_state(state_file).await?;
		}

		Ok((config, self.state_file, self.mirror_dir))
	}
}

async fn load_state(path: &Path) -> Result<Option<RepositoryState>> {
	match fs::read(path).await {
		Ok(bytes) => {
			let state = serde_json::from_slice::<RepositoryState>(&bytes)
				.with_context(|| format!("Failed to parse saved state at {}", path.display()))?;
			info!(
				revision = ?state.revision,
				entries = state.len(),
				"Resuming from saved state",
			);
			Ok(Some(state))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e).with_context(|| format!("Failed to read saved state at {}", path.display())),
	}
}

/// Writes next to the target then renames, a crash never leaves a half written state behind
async fn save_state(path: &Path, state: &RepositoryState) -> Result<()> {
	let tmp_path = path.with_extension("tmp");

	fs::write(&tmp_path, serde_json::to_vec(state)?)
		.await
		.with_context(|| format!("Failed to write state to {}", tmp_path.display()))?;
	fs::rename(&tmp_path, path)
		.await
		.with_context(|| format!("Failed to move state into {}", path.display()))?;

	debug!(path = %path.display(), "Saved stream state");

	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info,sd_repo_stream=debug".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let (config, state_file, mirror_dir) = Cli::parse().into_config().await?;

	let mirror = match mirror_dir {
		Some(dir) => Some(DirectoryMirror::create(dir).await?),
		None => None,
	};

	info!(
		owner = %config.owner,
		repo = %config.repo,
		branch = %config.branch,
		"Following repository",
	);

	let stream = RepoStream::new(config)?;
	let events = stream.events();

	let shutdown = tokio::signal::ctrl_c();
	tokio::pin!(shutdown);

	loop {
		let event = tokio::select! {
			res = &mut shutdown => {
				res.context("Failed to listen for the shutdown signal")?;
				info!("Shutting down");
				break;
			}
			event = events.recv() => match event {
				Ok(event) => event,
				Err(_) => break,
			},
		};

		match event {
			StreamEvent::Change(change) => {
				info!(%change, "Repository changed");
				if let Some(mirror) = &mirror {
					if let Err(e) = mirror.apply(&change).await {
						error!(%change, ?e, "Failed to mirror change;");
					}
				}
			}

			StreamEvent::StateUpdated(state) => {
				info!(revision = ?state.revision, entries = state.len(), "Up to date");
				if let Some(state_file) = &state_file {
					if let Err(e) = save_state(state_file, &state).await {
						error!(?e, "Failed to save stream state;");
					}
				}
			}

			StreamEvent::Error(e) => warn!(%e, "Repository poll cycle failed, retrying later;"),
		}
	}

	stream.shutdown().await;

	Ok(())
}
