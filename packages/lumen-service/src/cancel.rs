use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// Cooperative cancellation shared between a caller and an in-flight retrieval.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
	inner: Arc<CancelState>,
}
impl CancelHandle {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::SeqCst);
		self.inner.notify.notify_waiters();
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.cancelled.load(Ordering::SeqCst)
	}

	/// Resolves once `cancel` has been called, immediately if it already was.
	pub async fn cancelled(&self) {
		loop {
			let notified = self.inner.notify.notified();

			tokio::pin!(notified);
			// Register before re-checking so a concurrent `cancel` cannot slip between the two.
			notified.as_mut().enable();

			if self.is_cancelled() {
				return;
			}

			notified.await;
		}
	}
}

#[derive(Debug, Default)]
struct CancelState {
	cancelled: AtomicBool,
	notify: Notify,
}
