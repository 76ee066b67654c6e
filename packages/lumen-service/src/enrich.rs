use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
	DocumentMetadata, Error, MetadataStore, Result,
	cache::{self, CacheKey, PendingWrites, ScoreCache},
	context::AssembledContext,
	retry::{self, RetryPolicy},
};

/// One cited document. `metadata` is `None` when the lookup failed or found nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
	pub document_id: String,
	pub document_title: String,
	pub document_author: Option<String>,
	pub metadata: Option<DocumentMetadata>,
}

/// Bounded-concurrency metadata lookups for the documents in a context.
pub struct Enricher {
	metadata: Arc<dyn MetadataStore>,
	cache: Arc<ScoreCache>,
	policy: RetryPolicy,
	lookup_timeout: Duration,
	concurrency: usize,
	ttl: time::Duration,
}
impl Enricher {
	pub fn new(
		metadata: Arc<dyn MetadataStore>,
		cache: Arc<ScoreCache>,
		cfg: &lumen_config::Config,
	) -> Self {
		Self {
			metadata,
			cache,
			policy: RetryPolicy::from_enrichment(&cfg.enrichment),
			lookup_timeout: Duration::from_millis(cfg.enrichment.timeout_ms),
			concurrency: cfg.enrichment.concurrency.max(1),
			ttl: cache::ttl_from_seconds(cfg.cache.ttl_seconds.metadata),
		}
	}

	/// One source per distinct document, in context order. Never fails: a lookup that still
	/// errors after retrying yields a source without metadata.
	///
	/// Fetched metadata is staged in `pending`, never written to the cache directly.
	pub async fn enrich(
		&self,
		context: &AssembledContext,
		use_cache: bool,
		pending: &mut PendingWrites,
	) -> Vec<SourceRef> {
		let mut sources: Vec<SourceRef> = Vec::new();

		for document_id in context.document_ids() {
			let Some(item) = context.items.iter().find(|item| item.document_id == document_id)
			else {
				continue;
			};

			sources.push(SourceRef {
				document_id: document_id.to_string(),
				document_title: item.document_title.clone(),
				document_author: item.document_author.clone(),
				metadata: None,
			});
		}

		let semaphore = Arc::new(Semaphore::new(self.concurrency));
		let mut tasks = JoinSet::new();

		for (idx, source) in sources.iter_mut().enumerate() {
			let key = match metadata_key(&source.document_id) {
				Ok(key) => key,
				Err(err) => {
					tracing::warn!(error = %err, "Failed to build metadata cache key.");

					continue;
				},
			};

			if use_cache
				&& let Some(cached) = self.cache.get_json::<Option<DocumentMetadata>>(&key)
			{
				source.metadata = cached;

				continue;
			}

			let store = self.metadata.clone();
			let semaphore = semaphore.clone();
			let document_id = source.document_id.clone();
			let policy = self.policy;
			let lookup_timeout = self.lookup_timeout;

			tasks.spawn(async move {
				let _permit = semaphore.acquire_owned().await;
				let result = lookup(store, &document_id, policy, lookup_timeout).await;

				(idx, key, result)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			let (idx, key, result) = match joined {
				Ok(output) => output,
				Err(err) => {
					tracing::warn!(error = %err, "Metadata lookup task failed.");

					continue;
				},
			};

			match result {
				Ok(metadata) => {
					if use_cache && let Err(err) = pending.stage(key, &metadata, self.ttl) {
						tracing::warn!(error = %err, "Failed to cache document metadata.");
					}

					sources[idx].metadata = metadata;
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						document_id = sources[idx].document_id.as_str(),
						"Metadata enrichment failed. Returning source without metadata."
					);
				},
			}
		}

		sources
	}
}

async fn lookup(
	store: Arc<dyn MetadataStore>,
	document_id: &str,
	policy: RetryPolicy,
	lookup_timeout: Duration,
) -> Result<Option<DocumentMetadata>> {
	retry::retry_with_jitter(policy, "metadata_lookup", |_| {
		let store = store.clone();

		async move {
			match tokio::time::timeout(lookup_timeout, store.get_document_by_id(document_id)).await
			{
				Ok(result) => result,
				Err(_) => Err(Error::Unavailable {
					message: format!("Metadata lookup timed out after {lookup_timeout:?}."),
				}),
			}
		}
	})
	.await
}

fn metadata_key(document_id: &str) -> Result<CacheKey> {
	CacheKey::new(
		cache::NAMESPACE_METADATA,
		document_id,
		&serde_json::json!({ "schema_version": 1 }),
	)
}
