pub const DENSE_VECTOR_NAME: &str = "dense";

use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	qdrant::{Query, QueryPointsBuilder, ScoredPoint, Value, value::Kind},
};

use crate::{Error, Result, models::ChunkRow};

/// A passage returned by nearest-neighbor search, score clamped to `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
	pub chunk: ChunkRow,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &lumen_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn query_passages(
		&self,
		vector: &[f32],
		top_k: u32,
		min_score: f32,
	) -> Result<Vec<ScoredChunk>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions, collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.score_threshold(min_score)
			.with_payload(true)
			.limit(top_k as u64);
		let response = self.client.query(search).await?;

		Ok(response.result.iter().filter_map(scored_chunk_from_point).collect())
	}
}

/// Points missing any required payload field are skipped.
pub fn scored_chunk_from_point(point: &ScoredPoint) -> Option<ScoredChunk> {
	let payload = &point.payload;
	let chunk = ChunkRow {
		document_id: payload_string(payload, "document_id")?,
		passage_id: payload_string(payload, "passage_id")?,
		chunk_index: payload_i32(payload, "chunk_index")?,
		content: payload_string(payload, "content")?,
		token_count: payload_i32(payload, "token_count").unwrap_or(0),
		title: payload_string(payload, "document_title")?,
		author: payload_string(payload, "document_author"),
	};
	let score = if point.score.is_finite() { point.score.clamp(0.0, 1.0) } else { 0.0 };

	Some(ScoredChunk { chunk, score })
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				i32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use qdrant_client::qdrant::{ScoredPoint, Value};

	use crate::qdrant::scored_chunk_from_point;

	fn point(score: f32, with_title: bool) -> ScoredPoint {
		let mut payload: HashMap<String, Value> = HashMap::new();

		payload.insert("document_id".to_string(), Value::from("doc-1"));
		payload.insert("passage_id".to_string(), Value::from("p-3"));
		payload.insert("chunk_index".to_string(), Value::from(3_i64));
		payload.insert("content".to_string(), Value::from("Lord, shelter the orphans of war."));
		payload.insert("token_count".to_string(), Value::from(9_i64));

		if with_title {
			payload
				.insert("document_title".to_string(), Value::from("Prayers for War-Affected Children"));
		}

		ScoredPoint { payload, score, ..Default::default() }
	}

	#[test]
	fn decodes_payload_into_chunk() {
		let scored = scored_chunk_from_point(&point(0.8, true)).expect("Expected a decoded chunk.");

		assert_eq!(scored.chunk.passage_id, "p-3");
		assert_eq!(scored.chunk.chunk_index, 3);
		assert_eq!(scored.chunk.token_count, 9);
		assert_eq!(scored.chunk.author, None);
		assert_eq!(scored.score, 0.8);
	}

	#[test]
	fn clamps_scores_and_skips_incomplete_points() {
		let scored = scored_chunk_from_point(&point(1.2, true)).expect("Expected a decoded chunk.");

		assert_eq!(scored.score, 1.0);
		assert!(scored_chunk_from_point(&point(0.5, false)).is_none());
	}
}
