use sqlx::PgExecutor;

use crate::{
	Error, Result,
	models::{ChunkRow, DocumentRow},
};

/// Full-text search over chunk content.
///
/// Any stemmed query term may match (the `plainto_tsquery` conjunction is rewritten into a
/// disjunction); callers rescore the returned text themselves, so the store only has to recall.
pub async fn search_chunks<'e, E>(executor: E, query: &str, limit: u32) -> Result<Vec<ChunkRow>>
where
	E: PgExecutor<'e>,
{
	if limit == 0 {
		return Err(Error::InvalidArgument("limit must be greater than zero.".to_string()));
	}
	if query.trim().is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, ChunkRow>(
		"\
WITH q AS (
\tSELECT replace(plainto_tsquery('english', $1)::text, '&', '|')::tsquery AS tsq
)
SELECT
\tc.document_id,
\tc.passage_id,
\tc.chunk_index,
\tc.content,
\tc.token_count,
\td.title,
\td.author
FROM chunks c
JOIN documents d ON d.document_id = c.document_id
CROSS JOIN q
WHERE q.tsq::text <> '' AND c.search_tsv @@ q.tsq
ORDER BY ts_rank_cd(c.search_tsv, q.tsq) DESC, c.document_id, c.passage_id
LIMIT $2",
	)
	.bind(query)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn get_document<'e, E>(executor: E, document_id: &str) -> Result<Option<DocumentRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, DocumentRow>(
		"\
SELECT document_id, title, author, links, contact_info
FROM documents
WHERE document_id = $1
LIMIT 1",
	)
	.bind(document_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
