use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
	Backends, Candidate, Error, FusedResult, Result, SourceKind,
	cache::{self, CacheKey, PendingWrites, ScoreCache},
	cancel::CancelHandle,
	context::{self, AssembledContext},
	enrich::{Enricher, SourceRef},
	merge,
	options::{self, RetrievalOptions, RetrievalRequestOptions},
	session::{SessionCache, SessionHistory, Turn},
};
use lumen_config::Config;
use lumen_domain::{
	gate::{self, GateDecision},
	intent::{self, IntentResult},
	lexical,
	normalize::normalize_query_text,
};

#[derive(Clone, Debug, Serialize)]
pub struct RetrievalOutcome {
	pub context: AssembledContext,
	pub intent: IntentResult,
	pub confidence: f64,
	pub top_score: f64,
	pub gate: GateDecision,
	/// The merged ranking the context was assembled from.
	pub fused: Vec<FusedResult>,
	pub sources: Vec<SourceRef>,
	pub options: RetrievalOptions,
}

/// The hybrid retrieval pipeline with its collaborators and shared cache.
pub struct RetrievalService {
	pub cfg: Config,
	pub backends: Backends,
	pub cache: Arc<ScoreCache>,
	pub sessions: SessionCache,
	enricher: Enricher,
}
impl RetrievalService {
	pub fn new(cfg: Config, backends: Backends, cache: Arc<ScoreCache>) -> Self {
		let sessions = SessionCache::new(cache.clone(), backends.history.clone(), &cfg);
		let enricher = Enricher::new(backends.metadata.clone(), cache.clone(), &cfg);

		Self { cfg, backends, cache, sessions, enricher }
	}

	/// Classifies `question`, retrieves from both sources concurrently, merges, assembles a bounded
	/// context and gates it.
	///
	/// Empty retrieval is not an error; it surfaces as a rejected gate decision. The deadline and
	/// `cancel` cover the whole call, and cache writes happen only once every stage has finished.
	pub async fn retrieve_and_assemble(
		&self,
		question: &str,
		history: &SessionHistory,
		overrides: &RetrievalRequestOptions,
		cancel: Option<&CancelHandle>,
	) -> Result<RetrievalOutcome> {
		let span = tracing::info_span!("retrieve_and_assemble", request_id = %Uuid::new_v4());

		async move {
			let question = question.trim();

			if question.is_empty() {
				return Err(Error::InvalidRequest {
					message: "question must be non-empty.".to_string(),
				});
			}

			let intent = intent::classify(
				question,
				history.has_history(),
				history.last_answer_len(),
				&self.cfg.intent,
			);
			let options = options::resolve_options(&self.cfg, intent.retrieval_strategy, overrides)?;

			tracing::info!(
				retrieval_strategy = intent.retrieval_strategy.as_str(),
				chat_action = intent.chat_action.as_str(),
				vector_weight = options.vector_weight,
				lexical_weight = options.lexical_weight,
				"Query intent classified."
			);

			let pipeline = self.run_pipeline(question, history, intent, options.clone());

			bounded(pipeline, options.timeout, cancel).await
		}
		.instrument(span)
		.await
	}

	/// Loads the session's recent turns, retrieves, then records the question as a user turn.
	pub async fn retrieve_for_session(
		&self,
		session_id: &str,
		question: &str,
		overrides: &RetrievalRequestOptions,
		cancel: Option<&CancelHandle>,
	) -> Result<RetrievalOutcome> {
		let history = self.sessions.load(session_id).await?;
		let outcome = self.retrieve_and_assemble(question, &history, overrides, cancel).await?;

		self.sessions.append(session_id, Turn::user(question.trim())).await?;

		Ok(outcome)
	}

	/// Records the generated answer so the next turn can transform or export it.
	pub async fn record_answer(&self, session_id: &str, answer: &str) -> Result<()> {
		self.sessions.append(session_id, Turn::assistant(answer)).await
	}

	async fn run_pipeline(
		&self,
		question: &str,
		history: &SessionHistory,
		intent: IntentResult,
		options: RetrievalOptions,
	) -> Result<RetrievalOutcome> {
		let normalized = normalize_query_text(question);

		if normalized.is_empty() {
			return Err(Error::InvalidRequest {
				message: "question must contain visible characters.".to_string(),
			});
		}

		let terms = lexical::query_terms(&normalized, self.cfg.ranking.lexical.min_term_chars);
		let use_cache = options.cache_enabled && self.cache.is_enabled();
		let fused_key = CacheKey::new(
			cache::NAMESPACE_FUSED,
			normalized.as_str(),
			&serde_json::json!({
				"schema_version": 1,
				"options": options,
				"ranking": ranking_fingerprint(&self.cfg),
			}),
		)?;
		let mut pending = PendingWrites::default();
		let cached = if use_cache { self.cache.get_json::<Vec<FusedResult>>(&fused_key) } else { None };
		let fused = match cached {
			Some(fused) => {
				tracing::debug!(
					cache_namespace = cache::NAMESPACE_FUSED,
					cache_key_prefix = cache::cache_key_prefix(&fused_key.digest()),
					results = fused.len(),
					"Fused ranking cache hit."
				);

				fused
			},
			None => {
				let (
					(vector, vector_writes),
					(lexical, lexical_writes),
				) = tokio::try_join!(
					self.vector_candidates(&normalized, &options, use_cache),
					self.lexical_candidates(&normalized, &terms, &options, use_cache),
				)?;

				tracing::info!(
					vector_candidates = vector.len(),
					lexical_candidates = lexical.len(),
					"Retrievers returned candidates."
				);

				pending.extend(vector_writes);
				pending.extend(lexical_writes);

				let fused =
					merge::merge(&vector, &lexical, &terms, &options, &self.cfg.ranking.title_boost);

				if use_cache {
					pending.stage(
						fused_key,
						&fused,
						cache::ttl_from_seconds(self.cfg.cache.ttl_seconds.fused),
					)?;
				}

				fused
			},
		};
		let context = context::assemble_context(&fused, &self.cfg.context);
		let (confidence, top_score) = context::confidence_signals(&context, &options);
		let gate = gate::gate(
			&self.cfg.gate,
			context.len(),
			confidence,
			top_score,
			intent.chat_action,
			history.prior_artifact().is_some(),
		);

		tracing::info!(
			context_size = context.len(),
			relaxed_added = context.relaxed_added,
			confidence,
			top_score,
			proceed = gate.proceed,
			reason = ?gate.reason,
			"Quality gate evaluated."
		);

		let sources = self.enricher.enrich(&context, use_cache, &mut pending).await;

		if use_cache {
			pending.commit(&self.cache);
		}

		Ok(RetrievalOutcome { context, intent, confidence, top_score, gate, fused, sources, options })
	}

	async fn vector_candidates(
		&self,
		normalized: &str,
		options: &RetrievalOptions,
		use_cache: bool,
	) -> Result<(Vec<Candidate>, PendingWrites)> {
		let embedding_cfg = &self.cfg.providers.embedding;
		let ttl = &self.cfg.cache.ttl_seconds;
		let mut pending = PendingWrites::default();
		let vector_key = CacheKey::new(
			cache::NAMESPACE_VECTOR,
			normalized,
			&serde_json::json!({
				"model": embedding_cfg.model,
				"dimensions": embedding_cfg.dimensions,
				"top_k": options.candidate_k,
				"min_score": options.min_vector_score,
			}),
		)?;

		if use_cache && let Some(candidates) = self.cache.get_json::<Vec<Candidate>>(&vector_key) {
			return Ok((candidates, pending));
		}

		let embedding_key = CacheKey::new(
			cache::NAMESPACE_EMBEDDING,
			normalized,
			&serde_json::json!({
				"provider_id": embedding_cfg.provider_id,
				"model": embedding_cfg.model,
				"dimensions": embedding_cfg.dimensions,
			}),
		)?;
		let cached_vector =
			if use_cache { self.cache.get_json::<Vec<f32>>(&embedding_key) } else { None };
		let query_vector = match cached_vector {
			Some(vector) => vector,
			None => {
				let texts = [normalized.to_string()];
				let vector = self
					.backends
					.embedding
					.embed(embedding_cfg, &texts)
					.await?
					.into_iter()
					.next()
					.ok_or_else(|| Error::Provider {
						message: "Embedding provider returned no vectors.".to_string(),
					})?;

				if use_cache {
					pending.stage(embedding_key, &vector, cache::ttl_from_seconds(ttl.embedding))?;
				}

				vector
			},
		};
		let hits = self
			.backends
			.vector
			.query(&query_vector, options.candidate_k, options.min_vector_score)
			.await?;
		let candidates: Vec<Candidate> = hits
			.into_iter()
			.take(options.candidate_k as usize)
			.map(|hit| Candidate {
				passage: hit.passage,
				raw_score: hit.score,
				source_kind: SourceKind::Vector,
			})
			.collect();

		if use_cache {
			pending.stage(vector_key, &candidates, cache::ttl_from_seconds(ttl.vector))?;
		}

		Ok((candidates, pending))
	}

	async fn lexical_candidates(
		&self,
		normalized: &str,
		terms: &[String],
		options: &RetrievalOptions,
		use_cache: bool,
	) -> Result<(Vec<Candidate>, PendingWrites)> {
		let mut pending = PendingWrites::default();

		// No term can match, so every score would be zero.
		if terms.is_empty() {
			return Ok((Vec::new(), pending));
		}

		let lexical_key = CacheKey::new(
			cache::NAMESPACE_LEXICAL,
			normalized,
			&serde_json::json!({
				"limit": options.candidate_k,
				"ranking": ranking_fingerprint(&self.cfg),
			}),
		)?;

		if use_cache && let Some(candidates) = self.cache.get_json::<Vec<Candidate>>(&lexical_key) {
			return Ok((candidates, pending));
		}

		let passages = self.backends.lexical.search(normalized, options.candidate_k).await?;
		let candidates: Vec<Candidate> = passages
			.into_iter()
			.filter(|passage| !passage.content.trim().is_empty())
			.take(options.candidate_k as usize)
			.map(|passage| {
				let raw_score =
					lexical::score_terms(terms, &passage.content, &self.cfg.ranking.lexical);

				Candidate { passage, raw_score, source_kind: SourceKind::Lexical }
			})
			.collect();

		if use_cache {
			pending.stage(
				lexical_key,
				&candidates,
				cache::ttl_from_seconds(self.cfg.cache.ttl_seconds.lexical),
			)?;
		}

		Ok((candidates, pending))
	}
}

// Runs `work` under an optional deadline and cancellation signal. Dropping `work` abandons its
// in-flight calls together with any writes it staged.
async fn bounded<F, T>(work: F, timeout: Option<Duration>, cancel: Option<&CancelHandle>) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	let limited = async {
		match timeout {
			Some(limit) => tokio::time::timeout(limit, work)
				.await
				.unwrap_or_else(|_| Err(Error::DeadlineExceeded)),
			None => work.await,
		}
	};
	let Some(cancel) = cancel else {
		return limited.await;
	};

	tokio::select! {
		biased;
		_ = cancel.cancelled() => {
			tracing::info!("Retrieval cancelled by caller.");

			Err(Error::Cancelled)
		},
		result = limited => result,
	}
}

fn ranking_fingerprint(cfg: &Config) -> Value {
	let lexical = &cfg.ranking.lexical;
	let boost = &cfg.ranking.title_boost;

	serde_json::json!({
		"min_term_chars": lexical.min_term_chars,
		"position_weight": lexical.position_weight,
		"exact_match_bonus": lexical.exact_match_bonus,
		"frequency_step": lexical.frequency_step,
		"frequency_cap": lexical.frequency_cap,
		"coverage_weight": lexical.coverage_weight,
		"title_per_term": boost.per_term,
		"title_multi_term_bonus": boost.multi_term_bonus,
		"title_single_term_bonus": boost.single_term_bonus,
	})
}
