use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// A chunk joined with its document's display fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkRow {
	pub document_id: String,
	pub passage_id: String,
	pub chunk_index: i32,
	pub content: String,
	pub token_count: i32,
	pub title: String,
	pub author: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
	pub document_id: String,
	pub title: String,
	pub author: Option<String>,
	pub links: Option<Json<Vec<String>>>,
	pub contact_info: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TurnRow {
	pub turn_id: Uuid,
	pub session_id: String,
	pub role: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}
