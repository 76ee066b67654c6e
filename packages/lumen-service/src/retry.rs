use std::{future::Future, time::Duration};

use rand::Rng;

use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_enrichment(cfg: &lumen_config::Enrichment) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}

	/// Exponential ceiling for the retry that follows `attempt` (1-based).
	pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);

		self.base_backoff.saturating_mul(1 << exp).min(self.max_backoff)
	}

	/// Full jitter: uniform in `0..=backoff_ceiling(attempt)`.
	pub fn jittered_backoff(&self, attempt: u32) -> Duration {
		let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;

		if ceiling == 0 {
			return Duration::ZERO;
		}

		Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
	}
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors with [`crate::Error::is_transient`] are retried. `op` receives the 1-based attempt.
pub async fn retry_with_jitter<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut attempt = 1;

	loop {
		match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_transient() && attempt < policy.max_attempts => {
				let delay = policy.jittered_backoff(attempt);

				tracing::warn!(
					error = %err,
					operation = label,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Transient failure. Retrying."
				);

				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}
