use std::time::Duration;

use futures::{future::BoxFuture, FutureExt};

/// Source of the delays between two poll cycles.
///
/// Production code uses [`TokioScheduler`], tests can hand out delays manually to drive the
/// poll loop one cycle at a time.
pub trait Scheduler: Send + Sync + 'static {
	fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
	fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
		tokio::time::sleep(duration).boxed()
	}
}
