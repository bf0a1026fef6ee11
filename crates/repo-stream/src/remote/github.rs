use crate::{config::Credential, Error, RepoStreamConfig};

use std::sync::{PoisonError, RwLock};

use futures::{StreamExt, TryStreamExt};
use reqwest::{
	header::{HeaderMap, ACCEPT, ETAG, IF_NONE_MATCH},
	RequestBuilder, StatusCode,
};
use serde::Deserialize;
use tracing::{debug, instrument, trace, warn};

use super::{ArchiveStream, HeadResponse, RepositoryService};

const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
	pub limit: u64,
	pub remaining: u64,
}

impl RateLimit {
	fn from_headers(headers: &HeaderMap) -> Option<Self> {
		let read = |name: &str| {
			headers
				.get(name)
				.and_then(|value| value.to_str().ok())
				.and_then(|value| value.parse().ok())
		};

		Some(Self {
			limit: read(RATE_LIMIT_HEADER)?,
			remaining: read(RATE_LIMIT_REMAINING_HEADER)?,
		})
	}
}

#[derive(Deserialize)]
struct GitRef {
	object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
	sha: String,
}

/// GitHub flavoured repository service.
///
/// Heads come from the git refs API, honoring `If-None-Match` so unchanged heads cost a
/// `304 Not Modified`, archives come from the `/archive/<revision>.tar.gz` download endpoint.
pub struct GithubService {
	client: reqwest::Client,
	api_url: String,
	archive_url: String,
	owner: String,
	repo: String,
	credential: Option<Credential>,
	rate_limit: RwLock<Option<RateLimit>>,
}

impl GithubService {
	pub fn new(config: &RepoStreamConfig) -> Result<Self, Error> {
		let client = reqwest::Client::builder()
			.user_agent(&config.user_agent)
			.build()?;

		Ok(Self::with_client(client, config))
	}

	pub fn with_client(client: reqwest::Client, config: &RepoStreamConfig) -> Self {
		Self {
			client,
			api_url: config.api_url.trim_end_matches('/').to_string(),
			archive_url: config.archive_url.trim_end_matches('/').to_string(),
			owner: config.owner.clone(),
			repo: config.repo.clone(),
			credential: config.credential.clone(),
			rate_limit: RwLock::new(None),
		}
	}

	/// Rate limit reported by the last head check, if the service sent one
	pub fn rate_limit(&self) -> Option<RateLimit> {
		*self
			.rate_limit
			.read()
			.unwrap_or_else(PoisonError::into_inner)
	}

	fn head_url(&self, branch: &str) -> String {
		format!(
			"{}/repos/{}/{}/git/refs/heads/{branch}",
			self.api_url, self.owner, self.repo
		)
	}

	fn archive_url(&self, revision: &str) -> String {
		format!(
			"{}/{}/{}/archive/{revision}.tar.gz",
			self.archive_url, self.owner, self.repo
		)
	}

	fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
		match &self.credential {
			Some(Credential::Token { token }) => req.bearer_auth(token),
			Some(Credential::Basic { username, password }) => {
				req.basic_auth(username, Some(password))
			}
			None => req,
		}
	}

	fn record_rate_limit(&self, headers: &HeaderMap) {
		let Some(rate_limit) = RateLimit::from_headers(headers) else {
			return;
		};

		if rate_limit.remaining == 0 {
			warn!(limit = rate_limit.limit, "Repository service rate limit exhausted;");
		} else {
			trace!(?rate_limit, "Repository service rate limit");
		}

		*self
			.rate_limit
			.write()
			.unwrap_or_else(PoisonError::into_inner) = Some(rate_limit);
	}
}

#[async_trait::async_trait]
impl RepositoryService for GithubService {
	#[instrument(skip(self))]
	async fn head(&self, branch: &str, etag: Option<&str>) -> Result<HeadResponse, Error> {
		let url = self.head_url(branch);

		let mut req = self
			.client
			.get(&url)
			.header(ACCEPT, "application/vnd.github+json");
		if let Some(etag) = etag {
			req = req.header(IF_NONE_MATCH, etag);
		}

		let res = self.authorize(req).send().await?;
		self.record_rate_limit(res.headers());

		match res.status() {
			StatusCode::NOT_MODIFIED => Ok(HeadResponse::NotModified),
			status if status.is_success() => {
				let etag = res
					.headers()
					.get(ETAG)
					.and_then(|value| value.to_str().ok())
					.map(str::to_string);

				let body = res.bytes().await?;
				let GitRef {
					object: GitObject { sha },
				} = serde_json::from_slice(&body).map_err(Error::MalformedHead)?;

				debug!(revision = %sha, "Fetched branch head");

				Ok(HeadResponse::Modified {
					revision: sha,
					etag,
				})
			}
			status => Err(Error::UnexpectedStatus {
				status: status.as_u16(),
				url,
			}),
		}
	}

	#[instrument(skip(self))]
	async fn archive(&self, revision: &str) -> Result<ArchiveStream, Error> {
		let url = self.archive_url(revision);

		let res = self.authorize(self.client.get(&url)).send().await?;

		let status = res.status();
		if !status.is_success() {
			return Err(Error::UnexpectedStatus {
				status: status.as_u16(),
				url,
			});
		}

		Ok(res.bytes_stream().map_err(Error::from).boxed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use reqwest::header::HeaderValue;

	fn service() -> GithubService {
		let mut config = RepoStreamConfig::new("spacedriveapp", "spacedrive");
		config.api_url = "https://api.example.com/".to_string();
		GithubService::new(&config).unwrap()
	}

	#[test]
	fn builds_endpoint_urls() {
		let service = service();

		assert_eq!(
			service.head_url("main"),
			"https://api.example.com/repos/spacedriveapp/spacedrive/git/refs/heads/main"
		);
		assert_eq!(
			service.archive_url("3f1c2a"),
			"https://github.com/spacedriveapp/spacedrive/archive/3f1c2a.tar.gz"
		);
	}

	#[test]
	fn tracks_rate_limit_headers() {
		let service = service();
		assert_eq!(service.rate_limit(), None);

		let mut headers = HeaderMap::new();
		headers.insert(RATE_LIMIT_HEADER, HeaderValue::from_static("5000"));
		headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from_static("4999"));
		service.record_rate_limit(&headers);

		assert_eq!(
			service.rate_limit(),
			Some(RateLimit {
				limit: 5000,
				remaining: 4999,
			})
		);

		// Responses without the headers keep the last known values
		service.record_rate_limit(&HeaderMap::new());
		assert_eq!(service.rate_limit().map(|r| r.remaining), Some(4999));
	}

	#[test]
	fn parses_git_refs() {
		let GitRef {
			object: GitObject { sha },
		} = serde_json::from_str(
			r#"{
				"ref": "refs/heads/main",
				"object": { "sha": "aa218f56b14c9653891f9e74264a383fa43fefbd", "type": "commit" }
			}"#,
		)
		.unwrap();

		assert_eq!(sha, "aa218f56b14c9653891f9e74264a383fa43fefbd");
	}
}
