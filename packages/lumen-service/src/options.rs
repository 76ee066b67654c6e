use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use lumen_config::{Config, SourceWeights};
use lumen_domain::intent::RetrievalStrategy;

/// Per-request overrides. Unset fields fall back to the intent's strategy weights, then config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalRequestOptions {
	pub vector_weight: Option<f64>,
	pub lexical_weight: Option<f64>,
	pub min_vector_score: Option<f64>,
	pub min_lexical_score: Option<f64>,
	pub max_results: Option<u32>,
	pub max_per_document: Option<u32>,
	pub candidate_k: Option<u32>,
	pub cache_enabled: Option<bool>,
	/// Scopes cache entries to one caller when results are personalized.
	pub caller_id: Option<String>,
	pub timeout_ms: Option<u64>,
}

/// Fully resolved options for one call. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievalOptions {
	pub vector_weight: f64,
	pub lexical_weight: f64,
	pub min_vector_score: f64,
	pub min_lexical_score: f64,
	pub max_results: u32,
	pub max_per_document: u32,
	pub candidate_k: u32,
	pub cache_enabled: bool,
	pub caller_id: Option<String>,
	#[serde(skip)]
	pub timeout: Option<Duration>,
}
impl RetrievalOptions {
	/// Best achievable pre-boost fused score.
	pub fn weight_sum(&self) -> f64 {
		self.vector_weight + self.lexical_weight
	}
}

pub fn strategy_weights(cfg: &Config, strategy: RetrievalStrategy) -> SourceWeights {
	let weights = &cfg.retrieval.strategy_weights;

	match strategy {
		RetrievalStrategy::Factual => weights.factual,
		RetrievalStrategy::Conceptual => weights.conceptual,
		RetrievalStrategy::Comparative => weights.comparative,
		RetrievalStrategy::General => SourceWeights {
			vector_weight: cfg.retrieval.vector_weight,
			lexical_weight: cfg.retrieval.lexical_weight,
		},
	}
}

pub fn resolve_options(
	cfg: &Config,
	strategy: RetrievalStrategy,
	overrides: &RetrievalRequestOptions,
) -> Result<RetrievalOptions> {
	let weights = strategy_weights(cfg, strategy);
	let retrieval = &cfg.retrieval;
	let timeout_ms = overrides.timeout_ms.or(retrieval.timeout_ms);
	let options = RetrievalOptions {
		vector_weight: overrides.vector_weight.unwrap_or(weights.vector_weight),
		lexical_weight: overrides.lexical_weight.unwrap_or(weights.lexical_weight),
		min_vector_score: overrides.min_vector_score.unwrap_or(retrieval.min_vector_score),
		min_lexical_score: overrides.min_lexical_score.unwrap_or(retrieval.min_lexical_score),
		max_results: overrides.max_results.unwrap_or(retrieval.max_results),
		max_per_document: overrides.max_per_document.unwrap_or(retrieval.max_per_document),
		candidate_k: overrides.candidate_k.unwrap_or(retrieval.candidate_k),
		cache_enabled: overrides.cache_enabled.unwrap_or(cfg.cache.enabled),
		caller_id: overrides
			.caller_id
			.as_deref()
			.map(str::trim)
			.filter(|id| !id.is_empty())
			.map(str::to_string),
		timeout: timeout_ms.map(Duration::from_millis),
	};

	validate_options(cfg, &options)?;

	Ok(options)
}

/// Checked on every call; a malformed option fails fast instead of under-filling the context.
pub fn validate_options(cfg: &Config, options: &RetrievalOptions) -> Result<()> {
	for (path, value) in [
		("vector_weight", options.vector_weight),
		("lexical_weight", options.lexical_weight),
		("min_vector_score", options.min_vector_score),
		("min_lexical_score", options.min_lexical_score),
	] {
		if !value.is_finite() {
			return Err(Error::InvalidRequest {
				message: format!("{path} must be a finite number."),
			});
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::InvalidRequest {
				message: format!("{path} must be in the range 0.0-1.0."),
			});
		}
	}

	if options.max_results == 0 || options.max_per_document == 0 || options.candidate_k == 0 {
		return Err(Error::InvalidRequest {
			message: "max_results, max_per_document and candidate_k must be greater than zero."
				.to_string(),
		});
	}
	if options.max_results < cfg.context.chunk_budget {
		return Err(Error::InvalidRequest {
			message: format!(
				"max_results ({}) must be at least context.chunk_budget ({}).",
				options.max_results, cfg.context.chunk_budget
			),
		});
	}
	if options.max_per_document < cfg.context.max_per_document {
		return Err(Error::InvalidRequest {
			message: format!(
				"max_per_document ({}) must be at least context.max_per_document ({}).",
				options.max_per_document, cfg.context.max_per_document
			),
		});
	}
	if options.timeout.is_some_and(|timeout| timeout.is_zero()) {
		return Err(Error::InvalidRequest {
			message: "timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}
