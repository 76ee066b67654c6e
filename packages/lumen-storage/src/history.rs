use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, models::TurnRow};

/// Most recent `limit` turns of a session, oldest first.
pub async fn recent_turns<'e, E>(executor: E, session_id: &str, limit: u32) -> Result<Vec<TurnRow>>
where
	E: PgExecutor<'e>,
{
	let mut rows = sqlx::query_as::<_, TurnRow>(
		"\
SELECT turn_id, session_id, role, content, created_at
FROM chat_turns
WHERE session_id = $1
ORDER BY created_at DESC, turn_id DESC
LIMIT $2",
	)
	.bind(session_id)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	rows.reverse();

	Ok(rows)
}

pub async fn append_turn<'e, E>(
	executor: E,
	session_id: &str,
	role: &str,
	content: &str,
) -> Result<TurnRow>
where
	E: PgExecutor<'e>,
{
	if !matches!(role, "user" | "assistant") {
		return Err(Error::InvalidArgument(format!("Unknown turn role {role:?}.")));
	}

	let row = TurnRow {
		turn_id: Uuid::new_v4(),
		session_id: session_id.to_string(),
		role: role.to_string(),
		content: content.to_string(),
		created_at: OffsetDateTime::now_utc(),
	};

	sqlx::query(
		"\
INSERT INTO chat_turns (turn_id, session_id, role, content, created_at)
VALUES ($1,$2,$3,$4,$5)",
	)
	.bind(row.turn_id)
	.bind(row.session_id.as_str())
	.bind(row.role.as_str())
	.bind(row.content.as_str())
	.bind(row.created_at)
	.execute(executor)
	.await?;

	Ok(row)
}
