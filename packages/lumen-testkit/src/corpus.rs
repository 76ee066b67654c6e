use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, AtomicUsize, Ordering},
	},
	time::Duration,
};

use lumen_service::{
	Backends, BoxFuture, DocumentMetadata, Error, HistoryStore, LexicalStore, MetadataStore,
	Passage, Result, Turn, VectorHit, VectorIndex, merge::cmp_f64_desc,
};

use crate::{
	embedding::{self, HashEmbedding},
	fixture::{Fixture, FixtureDocument},
};

struct IndexedPassage {
	passage: Passage,
	embedding: Vec<f32>,
}

/// Every storage collaborator over one in-process corpus, with call counters and fault injection
/// for pipeline tests.
pub struct InMemoryCorpus {
	dimensions: usize,
	passages: Vec<IndexedPassage>,
	metadata: HashMap<String, DocumentMetadata>,
	turns: Mutex<HashMap<String, Vec<Turn>>>,
	vector_delay: Option<Duration>,
	transient_metadata_failures: AtomicU32,
	failing_documents: HashSet<String>,
	slow_documents: HashMap<String, Duration>,
	vector_calls: AtomicUsize,
	lexical_calls: AtomicUsize,
	metadata_calls: AtomicUsize,
}
impl InMemoryCorpus {
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions,
			passages: Vec::new(),
			metadata: HashMap::new(),
			turns: Mutex::new(HashMap::new()),
			vector_delay: None,
			transient_metadata_failures: AtomicU32::new(0),
			failing_documents: HashSet::new(),
			slow_documents: HashMap::new(),
			vector_calls: AtomicUsize::new(0),
			lexical_calls: AtomicUsize::new(0),
			metadata_calls: AtomicUsize::new(0),
		}
	}

	pub fn from_fixture(fixture: &Fixture, dimensions: usize) -> Self {
		fixture.documents.iter().fold(Self::new(dimensions), Self::with_document)
	}

	pub fn with_document(mut self, document: &FixtureDocument) -> Self {
		for passage in document.passages() {
			let embedding = embedding::embed_text(&passage.content, self.dimensions);

			self.passages.push(IndexedPassage { passage, embedding });
		}

		self.metadata.insert(document.document_id.clone(), document.metadata());

		self
	}

	/// Delays every vector query, for deadline and cancellation tests.
	pub fn with_vector_delay(mut self, delay: Duration) -> Self {
		self.vector_delay = Some(delay);

		self
	}

	/// Metadata lookups for `document_id` always fail with a permanent error.
	pub fn with_failing_document(mut self, document_id: &str) -> Self {
		self.failing_documents.insert(document_id.to_string());

		self
	}

	/// Metadata lookups for `document_id` succeed only after `delay`.
	pub fn with_slow_document(mut self, document_id: &str, delay: Duration) -> Self {
		self.slow_documents.insert(document_id.to_string(), delay);

		self
	}

	/// The next `count` metadata lookups fail with a transient error.
	pub fn fail_next_metadata_lookups(&self, count: u32) {
		self.transient_metadata_failures.store(count, Ordering::SeqCst);
	}

	pub fn vector_calls(&self) -> usize {
		self.vector_calls.load(Ordering::SeqCst)
	}

	pub fn lexical_calls(&self) -> usize {
		self.lexical_calls.load(Ordering::SeqCst)
	}

	pub fn metadata_calls(&self) -> usize {
		self.metadata_calls.load(Ordering::SeqCst)
	}

	/// Wires the corpus and [`HashEmbedding`] into a full backend set, history included.
	pub fn into_backends(self: Arc<Self>) -> Backends {
		Backends::new(Arc::new(HashEmbedding), self.clone(), self.clone(), self.clone())
			.with_history(self)
	}
}
impl VectorIndex for InMemoryCorpus {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		min_score: f64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			self.vector_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(delay) = self.vector_delay {
				tokio::time::sleep(delay).await;
			}
			if vector.len() != self.dimensions {
				return Err(Error::InvalidRequest {
					message: format!(
						"Query vector has {} dimensions, corpus expects {}.",
						vector.len(),
						self.dimensions
					),
				});
			}

			let mut hits: Vec<VectorHit> = self
				.passages
				.iter()
				.map(|indexed| VectorHit {
					passage: indexed.passage.clone(),
					score: embedding::similarity(vector, &indexed.embedding),
				})
				.filter(|hit| hit.score > 0.0 && hit.score >= min_score)
				.collect();

			sort_hits(&mut hits);
			hits.truncate(top_k as usize);

			Ok(hits)
		})
	}
}
impl LexicalStore for InMemoryCorpus {
	fn search<'a>(&'a self, query: &'a str, limit: u32) -> BoxFuture<'a, Result<Vec<Passage>>> {
		Box::pin(async move {
			self.lexical_calls.fetch_add(1, Ordering::SeqCst);

			let terms = lumen_domain::lexical::query_terms(query, 3);
			let mut matches: Vec<(usize, &Passage)> = self
				.passages
				.iter()
				.filter_map(|indexed| {
					let content = indexed.passage.content.to_lowercase();
					let matched =
						terms.iter().filter(|term| content.contains(term.as_str())).count();

					(matched > 0).then_some((matched, &indexed.passage))
				})
				.collect();

			matches.sort_by(|(a_count, a), (b_count, b)| {
				b_count
					.cmp(a_count)
					.then_with(|| a.document_id.cmp(&b.document_id))
					.then_with(|| a.id.cmp(&b.id))
			});

			Ok(matches.into_iter().take(limit as usize).map(|(_, passage)| passage.clone()).collect())
		})
	}
}
impl MetadataStore for InMemoryCorpus {
	fn get_document_by_id<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<DocumentMetadata>>> {
		Box::pin(async move {
			self.metadata_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(delay) = self.slow_documents.get(document_id) {
				tokio::time::sleep(*delay).await;
			}
			if self.failing_documents.contains(document_id) {
				return Err(Error::Storage {
					message: format!("Metadata for {document_id} is unreadable."),
				});
			}

			let pending = self.transient_metadata_failures.fetch_update(
				Ordering::SeqCst,
				Ordering::SeqCst,
				|left| left.checked_sub(1),
			);

			if pending.is_ok() {
				return Err(Error::Unavailable { message: "Connection reset.".to_string() });
			}

			Ok(self.metadata.get(document_id).cloned())
		})
	}
}
impl HistoryStore for InMemoryCorpus {
	fn recent_turns<'a>(
		&'a self,
		session_id: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<Turn>>> {
		Box::pin(async move {
			let turns = self.turns.lock().unwrap_or_else(|err| err.into_inner());
			let Some(session) = turns.get(session_id) else {
				return Ok(Vec::new());
			};
			let start = session.len().saturating_sub(limit);

			Ok(session[start..].to_vec())
		})
	}

	fn append_turn<'a>(&'a self, session_id: &'a str, turn: &'a Turn) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut turns = self.turns.lock().unwrap_or_else(|err| err.into_inner());

			turns.entry(session_id.to_string()).or_default().push(turn.clone());

			Ok(())
		})
	}
}

/// Returns a fixed hit list regardless of the query vector.
#[derive(Clone, Debug, Default)]
pub struct StaticVectorIndex {
	pub hits: Vec<VectorHit>,
}
impl VectorIndex for StaticVectorIndex {
	fn query<'a>(
		&'a self,
		_vector: &'a [f32],
		top_k: u32,
		min_score: f64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let mut hits: Vec<VectorHit> =
				self.hits.iter().filter(|hit| hit.score >= min_score).cloned().collect();

			sort_hits(&mut hits);
			hits.truncate(top_k as usize);

			Ok(hits)
		})
	}
}

fn sort_hits(hits: &mut [VectorHit]) {
	hits.sort_by(|a, b| {
		cmp_f64_desc(a.score, b.score)
			.then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
			.then_with(|| a.passage.id.cmp(&b.passage.id))
	});
}
