mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, CacheTtlSeconds, Config, Context, DEFAULT_CONTEXT_CHUNK_BUDGET,
	DEFAULT_CONTEXT_MAX_PER_DOCUMENT, DEFAULT_CONTEXT_RELAXED_EXTRA_PER_DOCUMENT,
	DEFAULT_LEXICAL_COVERAGE_WEIGHT, DEFAULT_LEXICAL_EXACT_MATCH_BONUS,
	DEFAULT_LEXICAL_FREQUENCY_CAP, DEFAULT_LEXICAL_FREQUENCY_STEP, DEFAULT_LEXICAL_MIN_TERM_CHARS,
	DEFAULT_LEXICAL_POSITION_WEIGHT, DEFAULT_TITLE_BOOST_MULTI_TERM_BONUS,
	DEFAULT_TITLE_BOOST_PER_TERM, DEFAULT_TITLE_BOOST_SINGLE_TERM_BONUS, EmbeddingProviderConfig,
	Enrichment, Gate, GateThresholds, Intent, LexicalScoring, Postgres, Providers, Qdrant, Ranking,
	Retrieval, Service, Session, SourceWeights, Storage, StrategyWeights, TitleBoost,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}

	validate_retrieval(cfg)?;
	validate_ranking(cfg)?;
	validate_context(cfg)?;
	validate_gate(&cfg.gate)?;
	validate_cache(&cfg.cache)?;
	validate_enrichment(&cfg.enrichment)?;

	if cfg.session.max_turns == 0 {
		return Err(Error::Validation {
			message: "session.max_turns must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

/// Rejects values that are not finite or fall outside `0.0..=1.0`.
pub fn validate_unit_interval(path: &str, value: f64) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{path} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation {
			message: format!("{path} must be in the range 0.0-1.0."),
		});
	}

	Ok(())
}

fn validate_non_negative(path: &str, value: f64) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{path} must be a finite number.") });
	}
	if value < 0.0 {
		return Err(Error::Validation { message: format!("{path} must be zero or greater.") });
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;
	let strategies = &retrieval.strategy_weights;

	for (path, value) in [
		("retrieval.vector_weight", retrieval.vector_weight),
		("retrieval.lexical_weight", retrieval.lexical_weight),
		("retrieval.min_vector_score", retrieval.min_vector_score),
		("retrieval.min_lexical_score", retrieval.min_lexical_score),
		("retrieval.strategy_weights.factual.vector_weight", strategies.factual.vector_weight),
		("retrieval.strategy_weights.factual.lexical_weight", strategies.factual.lexical_weight),
		(
			"retrieval.strategy_weights.conceptual.vector_weight",
			strategies.conceptual.vector_weight,
		),
		(
			"retrieval.strategy_weights.conceptual.lexical_weight",
			strategies.conceptual.lexical_weight,
		),
		(
			"retrieval.strategy_weights.comparative.vector_weight",
			strategies.comparative.vector_weight,
		),
		(
			"retrieval.strategy_weights.comparative.lexical_weight",
			strategies.comparative.lexical_weight,
		),
	] {
		validate_unit_interval(path, value)?;
	}

	for (path, value) in [
		("retrieval.max_results", retrieval.max_results),
		("retrieval.max_per_document", retrieval.max_per_document),
		("retrieval.candidate_k", retrieval.candidate_k),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{path} must be greater than zero.") });
		}
	}

	if let Some(timeout_ms) = retrieval.timeout_ms
		&& timeout_ms == 0
	{
		return Err(Error::Validation {
			message: "retrieval.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if retrieval.max_results < cfg.context.chunk_budget {
		return Err(Error::Validation {
			message: "retrieval.max_results must be greater than or equal to context.chunk_budget."
				.to_string(),
		});
	}
	if retrieval.max_per_document < cfg.context.max_per_document {
		return Err(Error::Validation {
			message:
				"retrieval.max_per_document must be greater than or equal to context.max_per_document."
					.to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let lexical = &cfg.ranking.lexical;
	let title = &cfg.ranking.title_boost;

	if lexical.min_term_chars == 0 {
		return Err(Error::Validation {
			message: "ranking.lexical.min_term_chars must be greater than zero.".to_string(),
		});
	}

	for (path, value) in [
		("ranking.lexical.position_weight", lexical.position_weight),
		("ranking.lexical.exact_match_bonus", lexical.exact_match_bonus),
		("ranking.lexical.frequency_step", lexical.frequency_step),
		("ranking.lexical.frequency_cap", lexical.frequency_cap),
		("ranking.lexical.coverage_weight", lexical.coverage_weight),
		("ranking.title_boost.per_term", title.per_term),
		("ranking.title_boost.multi_term_bonus", title.multi_term_bonus),
		("ranking.title_boost.single_term_bonus", title.single_term_bonus),
	] {
		validate_non_negative(path, value)?;
	}

	Ok(())
}

fn validate_context(cfg: &Config) -> Result<()> {
	let context = &cfg.context;

	if context.chunk_budget == 0 {
		return Err(Error::Validation {
			message: "context.chunk_budget must be greater than zero.".to_string(),
		});
	}
	if context.max_per_document == 0 {
		return Err(Error::Validation {
			message: "context.max_per_document must be greater than zero.".to_string(),
		});
	}
	if let Some(max_tokens) = context.max_tokens
		&& max_tokens == 0
	{
		return Err(Error::Validation {
			message: "context.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.intent.basic_factual_max_words == 0 || cfg.intent.transform_max_words == 0 {
		return Err(Error::Validation {
			message: "intent word limits must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_gate(gate: &Gate) -> Result<()> {
	validate_unit_interval("gate.confidence_floor", gate.confidence_floor)?;

	for (label, thresholds) in [
		("synthesize", gate.synthesize),
		("basic_factual", gate.basic_factual),
		("default", gate.default),
	] {
		validate_unit_interval(&format!("gate.{label}.min_confidence"), thresholds.min_confidence)?;
		validate_unit_interval(&format!("gate.{label}.min_top_score"), thresholds.min_top_score)?;
	}

	Ok(())
}

fn validate_cache(cache: &Cache) -> Result<()> {
	if cache.enabled && cache.capacity == 0 {
		return Err(Error::Validation {
			message: "cache.capacity must be greater than zero when the cache is enabled."
				.to_string(),
		});
	}
	if cache.sweep_interval_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.sweep_interval_seconds must be greater than zero.".to_string(),
		});
	}

	let ttl = &cache.ttl_seconds;

	for (path, value) in [
		("cache.ttl_seconds.embedding", ttl.embedding),
		("cache.ttl_seconds.vector", ttl.vector),
		("cache.ttl_seconds.lexical", ttl.lexical),
		("cache.ttl_seconds.fused", ttl.fused),
		("cache.ttl_seconds.metadata", ttl.metadata),
		("cache.ttl_seconds.session", ttl.session),
	] {
		if value <= 0 {
			return Err(Error::Validation { message: format!("{path} must be greater than zero.") });
		}
	}

	Ok(())
}

fn validate_enrichment(enrichment: &Enrichment) -> Result<()> {
	if enrichment.concurrency == 0 {
		return Err(Error::Validation {
			message: "enrichment.concurrency must be greater than zero.".to_string(),
		});
	}
	if enrichment.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "enrichment.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if enrichment.max_attempts == 0 {
		return Err(Error::Validation {
			message: "enrichment.max_attempts must be at least one.".to_string(),
		});
	}
	if enrichment.base_backoff_ms > enrichment.max_backoff_ms {
		return Err(Error::Validation {
			message: "enrichment.base_backoff_ms must not exceed enrichment.max_backoff_ms."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
