pub const NAMESPACE_EMBEDDING: &str = "embedding";
pub const NAMESPACE_VECTOR: &str = "vector";
pub const NAMESPACE_LEXICAL: &str = "lexical";
pub const NAMESPACE_FUSED: &str = "fused";
pub const NAMESPACE_METADATA: &str = "metadata";
pub const NAMESPACE_SESSION: &str = "session";

use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc, Mutex, MutexGuard, Weak,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration as StdDuration,
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;

use crate::{Error, Result};

pub trait Clock
where
	Self: Send + Sync,
{
	fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
}
impl ManualClock {
	pub fn new(start: OffsetDateTime) -> Self {
		Self { now: Mutex::new(start) }
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(|err| err.into_inner());

		*now += by;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
	pub namespace: String,
	pub key: String,
	pub fingerprint: String,
}
impl CacheKey {
	/// `params` are fingerprinted independently of object key order.
	pub fn new(namespace: &str, key: impl Into<String>, params: &Value) -> Result<Self> {
		Ok(Self {
			namespace: namespace.to_string(),
			key: key.into(),
			fingerprint: fingerprint_params(params)?,
		})
	}

	pub fn digest(&self) -> String {
		let mut hasher = blake3::Hasher::new();

		hasher.update(self.namespace.as_bytes());
		hasher.update(&[0]);
		hasher.update(self.key.as_bytes());
		hasher.update(&[0]);
		hasher.update(self.fingerprint.as_bytes());

		hasher.finalize().to_hex().to_string()
	}
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
	pub value: Value,
	pub created_at: OffsetDateTime,
	pub ttl: Duration,
	pub access_count: u64,
	pub last_accessed_at: OffsetDateTime,
	tick: u64,
}
impl CacheEntry {
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now - self.created_at > self.ttl
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	pub evictions: u64,
	pub expirations: u64,
}

#[derive(Default)]
struct CacheCounters {
	hits: AtomicU64,
	misses: AtomicU64,
	evictions: AtomicU64,
	expirations: AtomicU64,
}

#[derive(Default)]
struct CacheState {
	entries: HashMap<CacheKey, CacheEntry>,
	// Access tick to key; the first entry is the least recently used.
	recency: BTreeMap<u64, CacheKey>,
	next_tick: u64,
}
impl CacheState {
	fn bump(&mut self) -> u64 {
		self.next_tick += 1;

		self.next_tick
	}

	fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
		let entry = self.entries.remove(key)?;

		self.recency.remove(&entry.tick);

		Some(entry)
	}
}

/// Namespaced TTL cache with least-recently-used eviction.
///
/// Entries are logically gone once their TTL elapses; `get` treats them as misses even before the
/// sweeper removes them. The cache is TTL-agnostic: callers pass a TTL per entry.
pub struct ScoreCache {
	enabled: bool,
	capacity: usize,
	clock: Arc<dyn Clock>,
	state: Mutex<CacheState>,
	counters: CacheCounters,
}
impl ScoreCache {
	pub fn new(cfg: &lumen_config::Cache) -> Self {
		Self::with_clock(cfg, Arc::new(SystemClock))
	}

	pub fn with_clock(cfg: &lumen_config::Cache, clock: Arc<dyn Clock>) -> Self {
		Self {
			enabled: cfg.enabled,
			capacity: cfg.capacity,
			clock,
			state: Mutex::new(CacheState::default()),
			counters: CacheCounters::default(),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn get(&self, key: &CacheKey) -> Option<Value> {
		if !self.enabled {
			return None;
		}

		let now = self.clock.now();
		let mut state = self.lock();
		let expired = match state.entries.get(key) {
			None => {
				self.counters.misses.fetch_add(1, Ordering::Relaxed);

				return None;
			},
			Some(entry) => entry.is_expired(now),
		};

		if expired {
			state.remove(key);
			self.counters.expirations.fetch_add(1, Ordering::Relaxed);
			self.counters.misses.fetch_add(1, Ordering::Relaxed);

			return None;
		}

		let tick = state.bump();
		let entry = state.entries.get_mut(key)?;
		let old_tick = entry.tick;

		entry.tick = tick;
		entry.access_count += 1;
		entry.last_accessed_at = now;

		let value = entry.value.clone();

		state.recency.remove(&old_tick);
		state.recency.insert(tick, key.clone());
		self.counters.hits.fetch_add(1, Ordering::Relaxed);

		Some(value)
	}

	/// Inserts or replaces an entry, evicting the least recently used one when full.
	pub fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
		if !self.enabled || self.capacity == 0 || !ttl.is_positive() {
			return;
		}

		let now = self.clock.now();
		let mut state = self.lock();

		state.remove(&key);

		while state.entries.len() >= self.capacity {
			let Some((_, oldest)) = state.recency.pop_first() else {
				break;
			};

			state.entries.remove(&oldest);
			self.counters.evictions.fetch_add(1, Ordering::Relaxed);

			tracing::debug!(
				cache_namespace = oldest.namespace.as_str(),
				cache_key_prefix = cache_key_prefix(&oldest.digest()),
				"Cache entry evicted."
			);
		}

		let tick = state.bump();

		state.recency.insert(tick, key.clone());
		state.entries.insert(
			key,
			CacheEntry { value, created_at: now, ttl, access_count: 0, last_accessed_at: now, tick },
		);
	}

	pub fn delete(&self, key: &CacheKey) -> bool {
		self.lock().remove(key).is_some()
	}

	pub fn clear_namespace(&self, namespace: &str) -> usize {
		let mut state = self.lock();
		let keys: Vec<CacheKey> =
			state.entries.keys().filter(|key| key.namespace == namespace).cloned().collect();

		for key in &keys {
			state.remove(key);
		}

		keys.len()
	}

	/// Physically removes expired entries and returns how many were dropped.
	pub fn sweep(&self) -> usize {
		let now = self.clock.now();
		let mut state = self.lock();
		let expired: Vec<CacheKey> = state
			.entries
			.iter()
			.filter(|(_, entry)| entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect();

		for key in &expired {
			state.remove(key);
		}

		self.counters.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);

		expired.len()
	}

	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			hits: self.counters.hits.load(Ordering::Relaxed),
			misses: self.counters.misses.load(Ordering::Relaxed),
			evictions: self.counters.evictions.load(Ordering::Relaxed),
			expirations: self.counters.expirations.load(Ordering::Relaxed),
		}
	}

	/// Undecodable payloads are dropped and reported as a miss.
	pub fn get_json<T>(&self, key: &CacheKey) -> Option<T>
	where
		T: DeserializeOwned,
	{
		let value = self.get(key)?;

		match serde_json::from_value(value) {
			Ok(decoded) => Some(decoded),
			Err(err) => {
				self.delete(key);

				tracing::warn!(
					error = %err,
					cache_namespace = key.namespace.as_str(),
					cache_key_prefix = cache_key_prefix(&key.digest()),
					"Cache payload decode failed. Dropping entry."
				);

				None
			},
		}
	}

	pub fn set_json<T>(&self, key: CacheKey, value: &T, ttl: Duration) -> Result<()>
	where
		T: Serialize,
	{
		if !self.enabled {
			return Ok(());
		}

		let value = serde_json::to_value(value).map_err(|err| Error::Storage {
			message: format!("Failed to encode cache payload: {err}"),
		})?;

		self.set(key, value, ttl);

		Ok(())
	}

	/// Periodically sweeps expired entries until the cache is dropped.
	pub fn spawn_sweeper(self: &Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
		let weak: Weak<Self> = Arc::downgrade(self);

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(cache) = weak.upgrade() else {
					break;
				};
				let removed = cache.sweep();

				if removed > 0 {
					let stats = cache.stats();

					tracing::info!(
						removed,
						remaining = cache.len(),
						hits = stats.hits,
						misses = stats.misses,
						evictions = stats.evictions,
						"Cache sweep removed expired entries."
					);
				}
			}
		})
	}

	fn lock(&self) -> MutexGuard<'_, CacheState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Cache writes held back until the attempt that produced them completes. Dropping the buffer
/// discards them.
#[derive(Default)]
pub struct PendingWrites {
	entries: Vec<(CacheKey, Value, Duration)>,
}
impl PendingWrites {
	pub fn stage<T>(&mut self, key: CacheKey, value: &T, ttl: Duration) -> Result<()>
	where
		T: Serialize,
	{
		let value = serde_json::to_value(value).map_err(|err| Error::Storage {
			message: format!("Failed to encode cache payload: {err}"),
		})?;

		self.entries.push((key, value, ttl));

		Ok(())
	}

	pub fn extend(&mut self, other: PendingWrites) {
		self.entries.extend(other.entries);
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn commit(self, cache: &ScoreCache) {
		let count = self.entries.len();

		for (key, value, ttl) in self.entries {
			cache.set(key, value, ttl);
		}

		if count > 0 {
			tracing::debug!(entries = count, "Committed staged cache writes.");
		}
	}
}

/// Order-independent blake3 fingerprint of structured parameters.
pub fn fingerprint_params(params: &Value) -> Result<String> {
	let canonical = canonicalize(params);
	let raw = serde_json::to_vec(&canonical).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

pub fn ttl_from_seconds(seconds: i64) -> Duration {
	Duration::seconds(seconds)
}

fn canonicalize(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();

			keys.sort();

			let mut out = Map::new();

			for key in keys {
				if let Some(inner) = map.get(key) {
					out.insert(key.clone(), canonicalize(inner));
				}
			}

			Value::Object(out)
		},
		Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
		other => other.clone(),
	}
}
