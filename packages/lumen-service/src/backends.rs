//! Adapters from the Postgres, Qdrant, and HTTP embedding clients to the retrieval traits.

use std::sync::Arc;

use crate::{
	Backends, BoxFuture, DocumentMetadata, EmbeddingProvider, Error, HistoryStore, LexicalStore,
	MetadataStore, Passage, Result, Role, Turn, VectorHit, VectorIndex,
};
use lumen_config::{Config, EmbeddingProviderConfig};
use lumen_providers::embedding::HttpEmbedding;
use lumen_storage::{
	db::Db,
	history, passages,
	models::{ChunkRow, DocumentRow, TurnRow},
	qdrant::{QdrantStore, ScoredChunk},
};

impl Backends {
	/// Connects every live backend and makes sure the Postgres schema exists.
	pub async fn live(cfg: &Config) -> Result<Self> {
		let embedding = HttpEmbedding::new(&cfg.providers.embedding)?;
		let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let db = Arc::new(db);

		tracing::info!(
			collection = cfg.storage.qdrant.collection.as_str(),
			embedding_model = cfg.providers.embedding.model.as_str(),
			"Retrieval backends connected."
		);

		Ok(Self::new(Arc::new(embedding), Arc::new(qdrant), db.clone(), db.clone()).with_history(db))
	}
}

impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(HttpEmbedding::embed(self, cfg, texts).await?) })
	}
}

impl VectorIndex for QdrantStore {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		min_score: f64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let hits = self.query_passages(vector, top_k, min_score as f32).await?;

			Ok(hits.into_iter().map(vector_hit).collect())
		})
	}
}

impl LexicalStore for Db {
	fn search<'a>(&'a self, query: &'a str, limit: u32) -> BoxFuture<'a, Result<Vec<Passage>>> {
		Box::pin(async move {
			let rows = passages::search_chunks(&self.pool, query, limit).await?;

			Ok(rows.into_iter().map(passage_from_row).collect())
		})
	}
}

impl MetadataStore for Db {
	fn get_document_by_id<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<DocumentMetadata>>> {
		Box::pin(async move {
			let row = passages::get_document(&self.pool, document_id).await?;

			Ok(row.map(metadata_from_row))
		})
	}
}

impl HistoryStore for Db {
	fn recent_turns<'a>(
		&'a self,
		session_id: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<Turn>>> {
		Box::pin(async move {
			let limit = u32::try_from(limit).unwrap_or(u32::MAX);
			let rows = history::recent_turns(&self.pool, session_id, limit).await?;

			rows.into_iter().map(turn_from_row).collect()
		})
	}

	fn append_turn<'a>(&'a self, session_id: &'a str, turn: &'a Turn) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			history::append_turn(&self.pool, session_id, turn.role.as_str(), &turn.content).await?;

			Ok(())
		})
	}
}

fn vector_hit(hit: ScoredChunk) -> VectorHit {
	VectorHit { score: f64::from(hit.score), passage: passage_from_row(hit.chunk) }
}

fn passage_from_row(row: ChunkRow) -> Passage {
	Passage {
		id: row.passage_id,
		document_id: row.document_id,
		document_title: row.title,
		document_author: row.author,
		chunk_index: row.chunk_index,
		content: row.content,
		token_count: u32::try_from(row.token_count).unwrap_or(0),
	}
}

fn metadata_from_row(row: DocumentRow) -> DocumentMetadata {
	DocumentMetadata {
		title: row.title,
		author: row.author,
		links: row.links.map(|links| links.0),
		contact_info: row.contact_info,
	}
}

fn turn_from_row(row: TurnRow) -> Result<Turn> {
	let role = match row.role.as_str() {
		"user" => Role::User,
		"assistant" => Role::Assistant,
		other => {
			return Err(Error::Storage {
				message: format!("Turn {} has unknown role {other:?}.", row.turn_id),
			});
		},
	};

	Ok(Turn { role, content: row.content })
}
