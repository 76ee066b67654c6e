use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lumen_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml() -> String {
	SAMPLE_CONFIG_TEMPLATE_TOML.replace("api_key     = \"REPLACE_ME\"", "api_key     = \"test-key\"")
}

fn sample_toml_with(section: &[&str], key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(&sample_toml()).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for name in section {
		table = table
			.get_mut(*name)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{name}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lumen_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(&sample_toml()).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads() {
	let path = write_temp_config(sample_toml());
	let result = lumen_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected sample config to load.");

	assert_eq!(cfg.retrieval.max_results, 20);
	assert_eq!(cfg.context.chunk_budget, 8);
	assert_eq!(cfg.ranking.title_boost.per_term, 0.15);
	assert!(cfg.retrieval.timeout_ms.is_none());
}

#[test]
fn omitted_sections_fall_back_to_defaults() {
	let mut root: Value = toml::from_str(&sample_toml()).expect("Failed to parse template config.");
	let table = root.as_table_mut().expect("Template config must be a table.");

	for name in ["retrieval", "ranking", "context", "intent", "gate", "cache", "enrichment", "session"]
	{
		table.remove(name);
	}

	let payload = toml::to_string(&root).expect("Failed to render template config.");
	let cfg: Config = toml::from_str(&payload).expect("Failed to parse trimmed config.");

	assert!(lumen_config::validate(&cfg).is_ok());
	assert_eq!(cfg.retrieval.vector_weight, 0.7);
	assert_eq!(cfg.retrieval.strategy_weights.conceptual.vector_weight, 0.8);
	assert_eq!(cfg.ranking.lexical.min_term_chars, 3);
	assert_eq!(cfg.context.max_per_document, 2);
	assert_eq!(cfg.gate.basic_factual.min_top_score, 0.45);
	assert_eq!(cfg.cache.ttl_seconds.session, 1_800);
	assert_eq!(cfg.enrichment.concurrency, 8);
}

#[test]
fn vector_weight_must_be_in_range() {
	let payload = sample_toml_with(&["retrieval"], "vector_weight", Value::Float(1.5));
	let path = write_temp_config(payload);
	let result = lumen_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected vector_weight validation error.");

	assert!(
		err.to_string().contains("retrieval.vector_weight must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn weights_must_be_finite() {
	let mut cfg = base_config();

	cfg.retrieval.lexical_weight = f64::NAN;

	let err = lumen_config::validate(&cfg).expect_err("Expected lexical_weight validation error.");

	assert!(
		err.to_string().contains("retrieval.lexical_weight must be a finite number."),
		"Unexpected error: {err}"
	);
}

#[test]
fn strategy_weights_are_validated() {
	let mut cfg = base_config();

	cfg.retrieval.strategy_weights.comparative.lexical_weight = -0.1;

	let err = lumen_config::validate(&cfg).expect_err("Expected strategy weight validation error.");

	assert!(
		err.to_string().contains(
			"retrieval.strategy_weights.comparative.lexical_weight must be in the range 0.0-1.0."
		),
		"Unexpected error: {err}"
	);
}

#[test]
fn max_results_must_cover_chunk_budget() {
	let mut cfg = base_config();

	cfg.retrieval.max_results = 4;

	let err = lumen_config::validate(&cfg).expect_err("Expected max_results validation error.");

	assert!(
		err.to_string()
			.contains("retrieval.max_results must be greater than or equal to context.chunk_budget."),
		"Unexpected error: {err}"
	);
}

#[test]
fn search_cap_must_cover_context_cap() {
	let mut cfg = base_config();

	cfg.retrieval.max_per_document = 1;

	let err = lumen_config::validate(&cfg).expect_err("Expected max_per_document validation error.");

	assert!(
		err.to_string().contains(
			"retrieval.max_per_document must be greater than or equal to context.max_per_document."
		),
		"Unexpected error: {err}"
	);
}

#[test]
fn counts_must_be_positive() {
	let mut cfg = base_config();

	cfg.retrieval.candidate_k = 0;

	assert!(lumen_config::validate(&cfg).is_err());

	cfg = base_config();
	cfg.context.chunk_budget = 0;

	assert!(lumen_config::validate(&cfg).is_err());

	cfg = base_config();
	cfg.context.max_tokens = Some(0);

	let err = lumen_config::validate(&cfg).expect_err("Expected max_tokens validation error.");

	assert!(
		err.to_string().contains("context.max_tokens must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn cache_ttl_must_be_positive() {
	let mut cfg = base_config();

	cfg.cache.ttl_seconds.fused = 0;

	let err = lumen_config::validate(&cfg).expect_err("Expected cache TTL validation error.");

	assert!(
		err.to_string().contains("cache.ttl_seconds.fused must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn cache_capacity_is_only_required_when_enabled() {
	let mut cfg = base_config();

	cfg.cache.capacity = 0;

	assert!(lumen_config::validate(&cfg).is_err());

	cfg.cache.enabled = false;

	assert!(lumen_config::validate(&cfg).is_ok());
}

#[test]
fn enrichment_backoff_bounds_are_ordered() {
	let mut cfg = base_config();

	cfg.enrichment.base_backoff_ms = 5_000;

	let err = lumen_config::validate(&cfg).expect_err("Expected backoff validation error.");

	assert!(
		err.to_string()
			.contains("enrichment.base_backoff_ms must not exceed enrichment.max_backoff_ms."),
		"Unexpected error: {err}"
	);

	cfg = base_config();
	cfg.enrichment.max_attempts = 0;

	assert!(lumen_config::validate(&cfg).is_err());
}

#[test]
fn gate_thresholds_must_be_in_range() {
	let mut cfg = base_config();

	cfg.gate.synthesize.min_top_score = 1.2;

	let err = lumen_config::validate(&cfg).expect_err("Expected gate validation error.");

	assert!(
		err.to_string().contains("gate.synthesize.min_top_score must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let payload = sample_toml_with(&["storage", "qdrant"], "vector_dim", Value::Integer(768));
	let path = write_temp_config(payload);
	let err = lumen_config::load(&path).expect_err("Expected dimension validation error.");

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert!(
		err.to_string()
			.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error: {err}"
	);
}

#[test]
fn api_key_cannot_be_blank() {
	let payload = sample_toml_with(&["providers", "embedding"], "api_key", Value::String("  ".into()));
	let path = write_temp_config(payload);
	let err = lumen_config::load(&path).expect_err("Expected api_key validation error.");

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert!(err.to_string().contains("providers.embedding.api_key must be non-empty."));
}

#[test]
fn missing_required_section_is_a_parse_error() {
	let payload = sample_toml().replace("[service]\nlog_level = \"info\"\n", "");
	let path = write_temp_config(payload);
	let err = lumen_config::load(&path).expect_err("Expected missing service parse error.");

	fs::remove_file(&path).expect("Failed to remove test config.");

	let message = match err {
		Error::ParseConfig { source, .. } => source.to_string(),
		err => panic!("Expected parse config error, got {err}"),
	};

	assert!(message.contains("missing field `service`"), "Unexpected error: {message}");
}

#[test]
fn zero_timeout_is_rejected() {
	let payload = sample_toml_with(&["retrieval"], "timeout_ms", Value::Integer(0));
	let path = write_temp_config(payload);
	let result = lumen_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected timeout validation error.");

	assert!(
		err.to_string().contains("retrieval.timeout_ms must be greater than zero."),
		"Unexpected error: {err}"
	);
}
