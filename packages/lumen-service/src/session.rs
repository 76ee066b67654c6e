use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
	HistoryStore, Result,
	cache::{self, CacheKey, ScoreCache},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
	pub role: Role,
	pub content: String,
}
impl Turn {
	pub fn user(content: impl Into<String>) -> Self {
		Self { role: Role::User, content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: Role::Assistant, content: content.into() }
	}
}

/// Recent turns of one conversation, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
	pub turns: Vec<Turn>,
}
impl SessionHistory {
	pub fn new(turns: Vec<Turn>) -> Self {
		Self { turns }
	}

	pub fn has_history(&self) -> bool {
		!self.turns.is_empty()
	}

	fn last_answer(&self) -> Option<&Turn> {
		self.turns.iter().rev().find(|turn| turn.role == Role::Assistant)
	}

	/// Character length of the latest assistant turn, 0 without one.
	pub fn last_answer_len(&self) -> usize {
		self.last_answer().map(|turn| turn.content.chars().count()).unwrap_or(0)
	}

	/// The latest non-empty assistant answer, which transform and export intents operate on.
	pub fn prior_artifact(&self) -> Option<&str> {
		self.last_answer().map(|turn| turn.content.as_str()).filter(|text| !text.trim().is_empty())
	}
}

/// Per-session turn cache, reading through to a [`HistoryStore`] on miss.
///
/// Without a store the cache holds the only copy of each conversation, so turns then live in a
/// dedicated cache that stays on even when the shared score cache is disabled.
pub struct SessionCache {
	cache: Arc<ScoreCache>,
	store: Option<Arc<dyn HistoryStore>>,
	max_turns: usize,
	ttl: Duration,
}
impl SessionCache {
	pub fn new(
		cache: Arc<ScoreCache>,
		store: Option<Arc<dyn HistoryStore>>,
		cfg: &lumen_config::Config,
	) -> Self {
		let cache = if store.is_none() && !cache.is_enabled() {
			Arc::new(ScoreCache::new(&turn_cache_config(&cfg.cache)))
		} else {
			cache
		};

		Self {
			cache,
			store,
			max_turns: cfg.session.max_turns,
			ttl: cache::ttl_from_seconds(cfg.cache.ttl_seconds.session),
		}
	}

	pub async fn load(&self, session_id: &str) -> Result<SessionHistory> {
		let key = session_key(session_id)?;

		if let Some(turns) = self.cache.get_json::<Vec<Turn>>(&key) {
			tracing::debug!(
				cache_namespace = cache::NAMESPACE_SESSION,
				cache_key_prefix = cache::cache_key_prefix(&key.digest()),
				turns = turns.len(),
				"Session cache hit."
			);

			return Ok(SessionHistory::new(turns));
		}

		let Some(store) = self.store.as_ref() else {
			return Ok(SessionHistory::default());
		};
		let mut turns = store.recent_turns(session_id, self.max_turns).await?;

		trim_to(&mut turns, self.max_turns);
		self.cache.set_json(key, &turns, self.ttl)?;

		Ok(SessionHistory::new(turns))
	}

	/// Writes through to the store; a cached list is extended in place, otherwise the next
	/// `load` reads through.
	pub async fn append(&self, session_id: &str, turn: Turn) -> Result<()> {
		if let Some(store) = self.store.as_ref() {
			store.append_turn(session_id, &turn).await?;
		}

		let key = session_key(session_id)?;
		let cached = self.cache.get_json::<Vec<Turn>>(&key);
		let mut turns = match (cached, self.store.is_some()) {
			(Some(turns), _) => turns,
			(None, true) => return Ok(()),
			(None, false) => Vec::new(),
		};

		turns.push(turn);
		trim_to(&mut turns, self.max_turns);
		self.cache.set_json(key, &turns, self.ttl)?;

		Ok(())
	}

	pub fn invalidate(&self, session_id: &str) -> Result<bool> {
		Ok(self.cache.delete(&session_key(session_id)?))
	}
}

fn session_key(session_id: &str) -> Result<CacheKey> {
	CacheKey::new(cache::NAMESPACE_SESSION, session_id, &serde_json::json!({ "schema_version": 1 }))
}

fn turn_cache_config(shared: &lumen_config::Cache) -> lumen_config::Cache {
	let capacity =
		if shared.capacity == 0 { lumen_config::Cache::default().capacity } else { shared.capacity };

	lumen_config::Cache { enabled: true, capacity, ..shared.clone() }
}

fn trim_to(turns: &mut Vec<Turn>, max_turns: usize) {
	if turns.len() > max_turns {
		turns.drain(..turns.len() - max_turns);
	}
}
