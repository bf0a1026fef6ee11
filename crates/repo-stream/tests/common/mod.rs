#![allow(dead_code)]

use sd_repo_stream::{ArchiveStream, Error, HeadResponse, RepositoryService, Scheduler};

use std::{
	collections::{HashMap, VecDeque},
	io::Write,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use tar::{Builder, EntryType, Header};
use tokio::{
	sync::{mpsc, oneshot},
	time::timeout,
};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry of a test tarball, paths ending with `/` are directories and `""` is the wrapper itself
pub type TarEntry<'a> = (&'a str, &'a str);

fn tar_bytes(wrapper: &str, entries: &[TarEntry<'_>]) -> Vec<u8> {
	let mut builder = Builder::new(Vec::new());
	append_entries(&mut builder, wrapper, entries);
	builder.into_inner().unwrap()
}

fn append_entries(builder: &mut Builder<Vec<u8>>, wrapper: &str, entries: &[TarEntry<'_>]) {
	for (path, data) in entries {
		let mut header = Header::new_gnu();
		if path.is_empty() || path.ends_with('/') {
			header.set_entry_type(EntryType::Directory);
			header.set_mode(0o755);
		} else {
			header.set_entry_type(EntryType::Regular);
			header.set_mode(0o644);
		}
		header.set_size(data.len() as u64);
		builder
			.append_data(&mut header, format!("{wrapper}/{path}"), data.as_bytes())
			.unwrap();
	}
}

/// Complete gzipped tarball, every path wrapped in `<wrapper>/` the way GitHub does it
pub fn tar_gz(wrapper: &str, entries: &[TarEntry<'_>]) -> Vec<u8> {
	let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
	encoder.write_all(&tar_bytes(wrapper, entries)).unwrap();
	encoder.finish().unwrap()
}

/// Poorly compressible text
fn filler(len: usize) -> String {
	let mut seed = 0x2545_f491_u32;
	(0..len)
		.map(|_| {
			seed ^= seed << 13;
			seed ^= seed >> 17;
			seed ^= seed << 5;
			char::from(b'a' + (seed % 26) as u8)
		})
		.collect()
}

/// Gzipped tarball holding `entries`, then cut halfway through the content of one more file,
/// without end of archive marker nor gzip trailer.
///
/// Every one of `entries` can be fully decoded from it, the trailing file can't.
pub fn truncated_tar_gz(wrapper: &str, entries: &[TarEntry<'_>]) -> Vec<u8> {
	let mut builder = Builder::new(Vec::new());
	append_entries(&mut builder, wrapper, entries);
	let complete = builder.get_ref().len();

	// Inflaters decode up to a 32 KiB window ahead of the reader, the cut has to lie well past it
	let filler = filler(256 * 1024);
	append_entries(&mut builder, wrapper, &[("zz-filler.txt", filler.as_str())]);

	// One header block, then half of the content
	let cut = complete + 512 + filler.len() / 2;

	let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
	encoder.write_all(&builder.get_ref()[..cut]).unwrap();
	encoder.flush().unwrap();
	encoder.get_ref().clone()
}

#[derive(Debug, Clone)]
pub enum ArchiveScript {
	Tarball(Vec<u8>),
	Status(u16),
	/// Sends the bytes, then fails the body stream
	BrokenBody(Vec<u8>),
}

/// In memory repository service replaying scripted heads and archives.
///
/// Once the scripted heads run out, every head check answers `304 Not Modified`.
#[derive(Default)]
pub struct FakeService {
	heads: Mutex<VecDeque<Result<HeadResponse, Error>>>,
	archives: Mutex<HashMap<String, ArchiveScript>>,
	seen_etags: Mutex<Vec<Option<String>>>,
	fetches: AtomicUsize,
}

impl FakeService {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}

	pub fn push_head(&self, revision: &str, etag: &str) -> &Self {
		self.heads
			.lock()
			.unwrap()
			.push_back(Ok(HeadResponse::Modified {
				revision: revision.to_string(),
				etag: Some(etag.to_string()),
			}));
		self
	}

	pub fn push_head_error(&self, error: Error) -> &Self {
		self.heads.lock().unwrap().push_back(Err(error));
		self
	}

	pub fn set_archive(&self, revision: &str, script: ArchiveScript) -> &Self {
		self.archives
			.lock()
			.unwrap()
			.insert(revision.to_string(), script);
		self
	}

	pub fn fetches(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	pub fn seen_etags(&self) -> Vec<Option<String>> {
		self.seen_etags.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl RepositoryService for FakeService {
	async fn head(&self, _branch: &str, etag: Option<&str>) -> Result<HeadResponse, Error> {
		self.seen_etags
			.lock()
			.unwrap()
			.push(etag.map(str::to_string));

		self.heads
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or(Ok(HeadResponse::NotModified))
	}

	async fn archive(&self, revision: &str) -> Result<ArchiveStream, Error> {
		self.fetches.fetch_add(1, Ordering::SeqCst);

		let script = self.archives.lock().unwrap().get(revision).cloned();
		match script {
			Some(ArchiveScript::Tarball(bytes)) => {
				Ok(stream::iter([Ok(Bytes::from(bytes))]).boxed())
			}
			Some(ArchiveScript::BrokenBody(bytes)) => Ok(stream::iter([
				Ok(Bytes::from(bytes)),
				Err(Error::Service("connection reset".to_string())),
			])
			.boxed()),
			Some(ArchiveScript::Status(status)) => Err(Error::UnexpectedStatus {
				status,
				url: format!("https://github.test/archive/{revision}.tar.gz"),
			}),
			None => Err(Error::UnexpectedStatus {
				status: 404,
				url: format!("https://github.test/archive/{revision}.tar.gz"),
			}),
		}
	}
}

/// Scheduler whose delays only elapse when a test wakes them
pub struct ManualScheduler {
	sleeps_tx: mpsc::UnboundedSender<PendingSleep>,
}

pub struct PendingSleep {
	pub duration: Duration,
	wake_tx: oneshot::Sender<()>,
}

impl PendingSleep {
	pub fn wake(self) {
		self.wake_tx.send(()).ok();
	}
}

pub struct Sleeps {
	sleeps_rx: mpsc::UnboundedReceiver<PendingSleep>,
}

impl Sleeps {
	pub async fn next(&mut self) -> PendingSleep {
		timeout(TEST_TIMEOUT, self.sleeps_rx.recv())
			.await
			.expect("poll loop never scheduled its next cycle")
			.expect("poll loop is gone")
	}
}

impl ManualScheduler {
	pub fn new() -> (Arc<Self>, Sleeps) {
		let (sleeps_tx, sleeps_rx) = mpsc::unbounded_channel();
		(Arc::new(Self { sleeps_tx }), Sleeps { sleeps_rx })
	}
}

impl Scheduler for ManualScheduler {
	fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
		let (wake_tx, wake_rx) = oneshot::channel();
		self.sleeps_tx.send(PendingSleep { duration, wake_tx }).ok();

		async move {
			// A sleep dropped without waking never elapses
			if wake_rx.await.is_err() {
				futures::future::pending::<()>().await;
			}
		}
		.boxed()
	}
}
