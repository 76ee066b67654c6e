use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::Result;

const SCHEMA_SQL: &str = include_str!("../../../sql/init.sql");
const SCHEMA_LOCK_ID: i64 = 5_138_201;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &lumen_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		// Advisory locks are per connection; the transaction pins one and releases it on commit.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in schema_statements() {
			sqlx::query(statement).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

pub fn schema_statements() -> impl Iterator<Item = &'static str> {
	SCHEMA_SQL.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}
