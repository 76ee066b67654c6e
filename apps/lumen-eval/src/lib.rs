use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::Arc,
	time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use color_eyre::eyre;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lumen_config::Config;
use lumen_service::{
	Backends, CacheStats, RetrievalRequestOptions, RetrievalService, ScoreCache, SessionHistory,
};
use lumen_testkit::{Fixture, InMemoryCorpus};

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Questions with expected documents; the memory backend also indexes its documents.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	#[arg(long, value_enum, default_value_t = Backend::Memory)]
	pub backend: Backend,
	/// Cutoff for recall; defaults to `context.chunk_budget`.
	#[arg(long, value_name = "N")]
	pub k: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
	/// In-process corpus built from the dataset with a hashing embedder.
	Memory,
	/// Qdrant, Postgres and the configured embedding provider.
	Live,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	pub dataset: EvalDatasetInfo,
	pub settings: EvalSettings,
	pub summary: EvalSummary,
	pub queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub document_count: usize,
	pub query_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EvalSettings {
	pub backend: Backend,
	pub k: usize,
	pub chunk_budget: u32,
	pub cache_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct EvalSummary {
	pub avg_recall_at_k: f64,
	pub proceed_rate: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
	pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
	pub id: String,
	pub question: String,
	pub retrieval_strategy: &'static str,
	pub chat_action: &'static str,
	pub proceed: bool,
	pub gate_reason: String,
	pub confidence: f64,
	pub top_score: f64,
	pub context_size: usize,
	pub relaxed_added: usize,
	pub expected_documents: Vec<String>,
	pub retrieved_documents: Vec<String>,
	pub recall_at_k: f64,
	pub latency_ms: f64,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let cfg = lumen_config::load(&args.config)?;
	let filter = EnvFilter::new(cfg.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let dataset = load_dataset(&args.dataset)?;
	let name = args
		.dataset
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_else(|| "eval".to_string());
	let output = evaluate(cfg, &dataset, &name, args.backend, args.k).await?;

	println!("{}", serde_json::to_string_pretty(&output)?);

	Ok(())
}

/// Runs every dataset query through one service instance that owns a shared cache.
pub async fn evaluate(
	cfg: Config,
	dataset: &Fixture,
	name: &str,
	backend: Backend,
	k: Option<usize>,
) -> color_eyre::Result<EvalOutput> {
	let backends = match backend {
		Backend::Memory => {
			let dimensions = cfg.providers.embedding.dimensions as usize;

			Arc::new(InMemoryCorpus::from_fixture(dataset, dimensions)).into_backends()
		},
		Backend::Live => Backends::live(&cfg).await?,
	};
	let k = k.unwrap_or(cfg.context.chunk_budget as usize).max(1);
	let settings = EvalSettings {
		backend,
		k,
		chunk_budget: cfg.context.chunk_budget,
		cache_enabled: cfg.cache.enabled,
	};
	let cache = Arc::new(ScoreCache::new(&cfg.cache));
	let sweeper = cache.spawn_sweeper(Duration::from_secs(cfg.cache.sweep_interval_seconds));
	let service = RetrievalService::new(cfg, backends, cache.clone());
	let opts = RetrievalRequestOptions::default();
	let mut reports = Vec::with_capacity(dataset.queries.len());
	let mut latencies_ms = Vec::with_capacity(dataset.queries.len());

	for (index, query) in dataset.queries.iter().enumerate() {
		let history = SessionHistory::new(query.history.clone());
		let started = Instant::now();
		let outcome =
			service.retrieve_and_assemble(&query.question, &history, &opts, None).await?;
		let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
		let retrieved: Vec<String> =
			outcome.context.document_ids().into_iter().map(str::to_string).collect();
		let recall_at_k = recall_at_k(&retrieved, &query.relevant_documents, k);

		tracing::info!(
			query = index,
			proceed = outcome.gate.proceed,
			context_size = outcome.context.len(),
			recall_at_k,
			latency_ms,
			"Query evaluated."
		);

		reports.push(QueryReport {
			id: format!("q{}", index + 1),
			question: query.question.clone(),
			retrieval_strategy: outcome.intent.retrieval_strategy.as_str(),
			chat_action: outcome.intent.chat_action.as_str(),
			proceed: outcome.gate.proceed,
			gate_reason: format!("{:?}", outcome.gate.reason),
			confidence: outcome.confidence,
			top_score: outcome.top_score,
			context_size: outcome.context.len(),
			relaxed_added: outcome.context.relaxed_added,
			expected_documents: query.relevant_documents.clone(),
			retrieved_documents: retrieved,
			recall_at_k,
			latency_ms,
		});
		latencies_ms.push(latency_ms);
	}

	sweeper.abort();

	let summary = summarize(&reports, &latencies_ms, cache.stats());

	Ok(EvalOutput {
		dataset: EvalDatasetInfo {
			name: name.to_string(),
			document_count: dataset.documents.len(),
			query_count: reports.len(),
		},
		settings,
		summary,
		queries: reports,
	})
}

fn load_dataset(path: &Path) -> color_eyre::Result<Fixture> {
	let dataset = lumen_testkit::load_fixture(path)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}

	Ok(dataset)
}

/// Fraction of expected documents among the first `k` retrieved. Queries without expectations
/// score 1.0 when nothing was retrieved and 0.0 otherwise.
fn recall_at_k(retrieved: &[String], expected: &[String], k: usize) -> f64 {
	let expected: HashSet<&str> = expected.iter().map(String::as_str).collect();

	if expected.is_empty() {
		return if retrieved.is_empty() { 1.0 } else { 0.0 };
	}

	let hits = retrieved.iter().take(k).filter(|id| expected.contains(id.as_str())).count();

	hits as f64 / expected.len() as f64
}

fn summarize(reports: &[QueryReport], latencies_ms: &[f64], cache: CacheStats) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let avg_recall_at_k = reports.iter().map(|r| r.recall_at_k).sum::<f64>() / count;
	let proceed_rate = reports.iter().filter(|r| r.proceed).count() as f64 / count;
	let mut sorted = latencies_ms.to_vec();

	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	EvalSummary {
		avg_recall_at_k,
		proceed_rate,
		latency_ms_p50: percentile(&sorted, 0.50),
		latency_ms_p95: percentile(&sorted, 0.95),
		cache,
	}
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let clamped = percentile.clamp(0.0, 1.0);
	let pos = clamped * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}
