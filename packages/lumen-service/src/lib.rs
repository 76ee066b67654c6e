pub mod backends;
pub mod cache;
pub mod cancel;
pub mod context;
pub mod enrich;
pub mod merge;
pub mod options;
pub mod retrieve;
pub mod retry;
pub mod session;

mod error;

pub use cache::{
	CacheKey, CacheStats, Clock, ManualClock, PendingWrites, ScoreCache, SystemClock,
};
pub use cancel::CancelHandle;
pub use context::{AssembledContext, ContextItem};
pub use enrich::{Enricher, SourceRef};
pub use error::{Error, Result};
pub use options::{RetrievalOptions, RetrievalRequestOptions};
pub use retrieve::{RetrievalOutcome, RetrievalService};
pub use session::{Role, SessionCache, SessionHistory, Turn};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};

use lumen_config::EmbeddingProviderConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Nearest-neighbor search over passage embeddings.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	/// Hits carry a similarity in `0.0..=1.0`.
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		min_score: f64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>>;
}

/// Full-text recall; relevance is recomputed by the caller.
pub trait LexicalStore
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a str, limit: u32) -> BoxFuture<'a, Result<Vec<Passage>>>;
}

pub trait MetadataStore
where
	Self: Send + Sync,
{
	fn get_document_by_id<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<DocumentMetadata>>>;
}

pub trait HistoryStore
where
	Self: Send + Sync,
{
	/// The latest `limit` turns, oldest first.
	fn recent_turns<'a>(
		&'a self,
		session_id: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<Turn>>>;

	fn append_turn<'a>(&'a self, session_id: &'a str, turn: &'a Turn) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passage {
	/// Unique within its document only.
	pub id: String,
	pub document_id: String,
	pub document_title: String,
	pub document_author: Option<String>,
	pub chunk_index: i32,
	pub content: String,
	pub token_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
	pub passage: Passage,
	pub score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
	Vector,
	Lexical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub passage: Passage,
	pub raw_score: f64,
	pub source_kind: SourceKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
	Vector,
	Lexical,
	Hybrid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
	pub passage: Passage,
	/// Weighted sum plus title boost.
	pub fused_score: f64,
	pub original_score: f64,
	pub title_boost: f64,
	pub provenance: Provenance,
}

/// Display-only document fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
	pub title: String,
	pub author: Option<String>,
	pub links: Option<Vec<String>>,
	pub contact_info: Option<String>,
}

#[derive(Clone)]
pub struct Backends {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub vector: Arc<dyn VectorIndex>,
	pub lexical: Arc<dyn LexicalStore>,
	pub metadata: Arc<dyn MetadataStore>,
	pub history: Option<Arc<dyn HistoryStore>>,
}
impl Backends {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		vector: Arc<dyn VectorIndex>,
		lexical: Arc<dyn LexicalStore>,
		metadata: Arc<dyn MetadataStore>,
	) -> Self {
		Self { embedding, vector, lexical, metadata, history: None }
	}

	pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
		self.history = Some(history);

		self
	}
}
