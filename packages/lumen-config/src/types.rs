use serde::Deserialize;
use serde_json::{Map, Value};

// Empirically tuned ranking constants. Every value below is overridable from the config file and
// is expected to move during offline tuning.
pub const DEFAULT_LEXICAL_MIN_TERM_CHARS: usize = 3;
pub const DEFAULT_LEXICAL_POSITION_WEIGHT: f64 = 0.2;
pub const DEFAULT_LEXICAL_EXACT_MATCH_BONUS: f64 = 0.3;
pub const DEFAULT_LEXICAL_FREQUENCY_STEP: f64 = 0.1;
pub const DEFAULT_LEXICAL_FREQUENCY_CAP: f64 = 0.5;
pub const DEFAULT_LEXICAL_COVERAGE_WEIGHT: f64 = 0.4;
pub const DEFAULT_TITLE_BOOST_PER_TERM: f64 = 0.15;
pub const DEFAULT_TITLE_BOOST_MULTI_TERM_BONUS: f64 = 0.3;
pub const DEFAULT_TITLE_BOOST_SINGLE_TERM_BONUS: f64 = 0.2;
pub const DEFAULT_CONTEXT_CHUNK_BUDGET: u32 = 8;
pub const DEFAULT_CONTEXT_MAX_PER_DOCUMENT: u32 = 2;
pub const DEFAULT_CONTEXT_RELAXED_EXTRA_PER_DOCUMENT: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub context: Context,
	#[serde(default)]
	pub intent: Intent,
	#[serde(default)]
	pub gate: Gate,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub enrichment: Enrichment,
	#[serde(default)]
	pub session: Session,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub vector_weight: f64,
	pub lexical_weight: f64,
	pub min_vector_score: f64,
	pub min_lexical_score: f64,
	pub max_results: u32,
	/// Per-document cap applied to the merged search ranking. The context assembler applies its
	/// own, tighter cap on top of this one.
	pub max_per_document: u32,
	/// `topK` for the vector index and `limit` for the lexical store.
	pub candidate_k: u32,
	pub timeout_ms: Option<u64>,
	pub strategy_weights: StrategyWeights,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			vector_weight: 0.7,
			lexical_weight: 0.3,
			min_vector_score: 0.3,
			min_lexical_score: 0.05,
			max_results: 20,
			max_per_document: 3,
			candidate_k: 40,
			timeout_ms: None,
			strategy_weights: StrategyWeights::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyWeights {
	pub factual: SourceWeights,
	pub conceptual: SourceWeights,
	pub comparative: SourceWeights,
}
impl Default for StrategyWeights {
	fn default() -> Self {
		Self {
			factual: SourceWeights { vector_weight: 0.7, lexical_weight: 0.3 },
			conceptual: SourceWeights { vector_weight: 0.8, lexical_weight: 0.2 },
			comparative: SourceWeights { vector_weight: 0.6, lexical_weight: 0.4 },
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SourceWeights {
	pub vector_weight: f64,
	pub lexical_weight: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub lexical: LexicalScoring,
	pub title_boost: TitleBoost,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LexicalScoring {
	/// Query terms shorter than this are ignored.
	pub min_term_chars: usize,
	pub position_weight: f64,
	pub exact_match_bonus: f64,
	pub frequency_step: f64,
	pub frequency_cap: f64,
	pub coverage_weight: f64,
}
impl Default for LexicalScoring {
	fn default() -> Self {
		Self {
			min_term_chars: DEFAULT_LEXICAL_MIN_TERM_CHARS,
			position_weight: DEFAULT_LEXICAL_POSITION_WEIGHT,
			exact_match_bonus: DEFAULT_LEXICAL_EXACT_MATCH_BONUS,
			frequency_step: DEFAULT_LEXICAL_FREQUENCY_STEP,
			frequency_cap: DEFAULT_LEXICAL_FREQUENCY_CAP,
			coverage_weight: DEFAULT_LEXICAL_COVERAGE_WEIGHT,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TitleBoost {
	pub per_term: f64,
	pub multi_term_bonus: f64,
	pub single_term_bonus: f64,
}
impl Default for TitleBoost {
	fn default() -> Self {
		Self {
			per_term: DEFAULT_TITLE_BOOST_PER_TERM,
			multi_term_bonus: DEFAULT_TITLE_BOOST_MULTI_TERM_BONUS,
			single_term_bonus: DEFAULT_TITLE_BOOST_SINGLE_TERM_BONUS,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Context {
	pub chunk_budget: u32,
	pub max_per_document: u32,
	pub relaxed_extra_per_document: u32,
	pub max_tokens: Option<u32>,
}
impl Default for Context {
	fn default() -> Self {
		Self {
			chunk_budget: DEFAULT_CONTEXT_CHUNK_BUDGET,
			max_per_document: DEFAULT_CONTEXT_MAX_PER_DOCUMENT,
			relaxed_extra_per_document: DEFAULT_CONTEXT_RELAXED_EXTRA_PER_DOCUMENT,
			max_tokens: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Intent {
	/// A prior answer must be longer than this for a short imperative to count as a transform.
	pub transform_min_prior_chars: usize,
	pub transform_max_words: usize,
	pub basic_factual_max_words: usize,
}
impl Default for Intent {
	fn default() -> Self {
		Self { transform_min_prior_chars: 400, transform_max_words: 12, basic_factual_max_words: 8 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Gate {
	pub confidence_floor: f64,
	pub synthesize: GateThresholds,
	pub basic_factual: GateThresholds,
	pub default: GateThresholds,
}
impl Default for Gate {
	fn default() -> Self {
		Self {
			confidence_floor: 0.1,
			synthesize: GateThresholds { min_confidence: 0.35, min_top_score: 0.40 },
			basic_factual: GateThresholds { min_confidence: 0.4, min_top_score: 0.45 },
			default: GateThresholds { min_confidence: 0.7, min_top_score: 0.55 },
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateThresholds {
	pub min_confidence: f64,
	pub min_top_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub capacity: usize,
	pub sweep_interval_seconds: u64,
	pub ttl_seconds: CacheTtlSeconds,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			enabled: true,
			capacity: 10_000,
			sweep_interval_seconds: 60,
			ttl_seconds: CacheTtlSeconds::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTtlSeconds {
	pub embedding: i64,
	pub vector: i64,
	pub lexical: i64,
	pub fused: i64,
	pub metadata: i64,
	pub session: i64,
}
impl Default for CacheTtlSeconds {
	fn default() -> Self {
		Self {
			embedding: 86_400,
			vector: 600,
			lexical: 600,
			fused: 300,
			metadata: 3_600,
			session: 1_800,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Enrichment {
	pub concurrency: usize,
	pub timeout_ms: u64,
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Enrichment {
	fn default() -> Self {
		Self {
			concurrency: 8,
			timeout_ms: 2_000,
			max_attempts: 2,
			base_backoff_ms: 100,
			max_backoff_ms: 1_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Session {
	pub max_turns: usize,
}
impl Default for Session {
	fn default() -> Self {
		Self { max_turns: 12 }
	}
}
