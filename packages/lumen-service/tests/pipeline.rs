use std::{sync::Arc, time::Duration};

use lumen_config::Config;
use lumen_domain::gate::{Fallback, GateReason};
use lumen_service::{
	Backends, CancelHandle, Error, FusedResult, Passage, Provenance, RetrievalRequestOptions,
	RetrievalService, ScoreCache, SessionHistory, Turn, VectorHit,
};
use lumen_testkit::{
	FixtureDocument, FixturePassage, HashEmbedding, InMemoryCorpus, StaticVectorIndex,
};

const DIMENSIONS: u32 = 64;

fn document(document_id: &str, title: &str, passages: &[&str]) -> FixtureDocument {
	FixtureDocument {
		document_id: document_id.to_string(),
		title: title.to_string(),
		author: Some("Field Team".to_string()),
		links: Some(vec![format!("https://library.example/{document_id}")]),
		contact_info: None,
		passages: passages
			.iter()
			.enumerate()
			.map(|(idx, content)| FixturePassage {
				passage_id: format!("p{}", idx + 1),
				chunk_index: None,
				content: content.to_string(),
				token_count: None,
			})
			.collect(),
	}
}

fn war_prayers() -> FixtureDocument {
	document(
		"war-prayers",
		"Prayers for War-Affected Children",
		&["A prayer for orphans of war: shelter the children who lost their parents."],
	)
}

fn harvest() -> FixtureDocument {
	document(
		"harvest",
		"Harvest Songs",
		&["Songs of thanks for the harvest and for rain on the fields."],
	)
}

fn corpus(documents: &[FixtureDocument]) -> InMemoryCorpus {
	documents.iter().fold(InMemoryCorpus::new(DIMENSIONS as usize), InMemoryCorpus::with_document)
}

fn service_with(cfg: Config, backends: Backends) -> RetrievalService {
	let cache = Arc::new(ScoreCache::new(&cfg.cache));

	RetrievalService::new(cfg, backends, cache)
}

fn service(corpus: Arc<InMemoryCorpus>) -> RetrievalService {
	service_with(lumen_testkit::test_config(DIMENSIONS), corpus.into_backends())
}

fn passage_keys(results: &[FusedResult]) -> Vec<(String, String)> {
	results
		.iter()
		.map(|result| (result.passage.document_id.clone(), result.passage.id.clone()))
		.collect()
}

fn defaults() -> RetrievalRequestOptions {
	RetrievalRequestOptions::default()
}

#[tokio::test]
async fn title_matched_hybrid_passage_ranks_first() {
	let corpus = Arc::new(corpus(&[war_prayers(), harvest()]));
	let passage = war_prayers().passages().remove(0);
	let vector = StaticVectorIndex { hits: vec![VectorHit { passage, score: 0.8 }] };
	let backends =
		Backends::new(Arc::new(HashEmbedding), Arc::new(vector), corpus.clone(), corpus.clone());
	let service = service_with(lumen_testkit::test_config(DIMENSIONS), backends);
	let outcome = service
		.retrieve_and_assemble(
			"prayer for orphans of war",
			&SessionHistory::default(),
			&defaults(),
			None,
		)
		.await
		.expect("Retrieval should succeed.");
	let top = &outcome.fused[0];

	assert_eq!(top.passage.document_id, "war-prayers");
	assert_eq!(top.provenance, Provenance::Hybrid);
	assert!(top.title_boost >= 0.3, "Unexpected title boost: {}", top.title_boost);
	assert!(top.fused_score >= 0.8 * outcome.options.vector_weight);
	assert_eq!(outcome.context.items[0].document_id, "war-prayers");
	assert_eq!(outcome.context.items[0].passage_id, "p1");
	assert_eq!(outcome.sources[0].document_id, "war-prayers");
	assert_eq!(
		outcome.sources[0].metadata.as_ref().map(|metadata| metadata.title.as_str()),
		Some("Prayers for War-Affected Children")
	);
}

#[tokio::test]
async fn normalized_repeat_question_hits_the_fused_cache() {
	let corpus = Arc::new(corpus(&[war_prayers(), harvest()]));
	let service = service(corpus.clone());
	let history = SessionHistory::default();
	let first = service
		.retrieve_and_assemble("prayer for orphans of war", &history, &defaults(), None)
		.await
		.expect("First retrieval should succeed.");
	let calls = (corpus.vector_calls(), corpus.lexical_calls(), corpus.metadata_calls());
	let second = service
		.retrieve_and_assemble("  PRAYER for orphans\u{200B} of   war ", &history, &defaults(), None)
		.await
		.expect("Second retrieval should succeed.");

	assert_eq!(calls, (1, 1, first.sources.len()));
	assert_eq!(corpus.vector_calls(), 1);
	assert_eq!(corpus.lexical_calls(), 1);
	assert_eq!(corpus.metadata_calls(), calls.2);
	assert_eq!(passage_keys(&first.fused), passage_keys(&second.fused));
	assert_eq!(first.sources, second.sources);
	assert!(service.cache.stats().hits > 0);
}

#[tokio::test]
async fn disabling_the_cache_per_request_reaches_the_stores() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let service = service(corpus.clone());
	let opts = RetrievalRequestOptions { cache_enabled: Some(false), ..defaults() };

	for _ in 0..2 {
		service
			.retrieve_and_assemble("orphans of war", &SessionHistory::default(), &opts, None)
			.await
			.expect("Retrieval should succeed.");
	}

	assert_eq!(corpus.vector_calls(), 2);
	assert_eq!(corpus.lexical_calls(), 2);
	assert!(service.cache.is_empty());
}

#[tokio::test]
async fn empty_corpus_is_gated_not_failed() {
	let service = service(Arc::new(InMemoryCorpus::new(DIMENSIONS as usize)));
	let outcome = service
		.retrieve_and_assemble(
			"What is prayer?",
			&SessionHistory::default(),
			&defaults(),
			None,
		)
		.await
		.expect("Empty retrieval should not be an error.");

	assert!(outcome.context.is_empty());
	assert_eq!((outcome.confidence, outcome.top_score), (0.0, 0.0));
	assert!(!outcome.gate.proceed);
	assert_eq!(outcome.gate.reason, GateReason::EmptyContext);
	assert_eq!(outcome.gate.fallback(), Some(Fallback::NotFoundInCorpus));
}

#[tokio::test]
async fn transform_request_proceeds_on_prior_artifact() {
	let service = service(Arc::new(InMemoryCorpus::new(DIMENSIONS as usize)));
	let history = SessionHistory::new(vec![
		Turn::user("Outline a four week study on lament."),
		Turn::assistant("Week one: lament in the psalms. ".repeat(20)),
	]);
	let outcome = service
		.retrieve_and_assemble("Add scripture to that outline", &history, &defaults(), None)
		.await
		.expect("Retrieval should succeed.");

	assert!(outcome.context.is_empty());
	assert!(outcome.gate.proceed);
	assert_eq!(outcome.gate.reason, GateReason::PriorArtifact);
}

#[tokio::test]
async fn relaxed_pass_only_deepens_chosen_documents() {
	let passages = [
		"Lament gives grief words before God.",
		"Lament psalms move from complaint to trust.",
		"Communal lament names shared loss.",
		"Lament in prophets calls for repentance.",
	];
	let corpus = Arc::new(corpus(&[document("lament", "On Lament", &passages)]));
	let service = service(corpus);
	let outcome = service
		.retrieve_and_assemble("lament", &SessionHistory::default(), &defaults(), None)
		.await
		.expect("Retrieval should succeed.");

	assert_eq!(outcome.context.document_ids(), vec!["lament"]);
	assert_eq!(outcome.context.len(), 3);
	assert_eq!(outcome.context.relaxed_added, 1);
}

#[tokio::test]
async fn cancellation_abandons_retrieval_without_cache_writes() {
	let corpus = Arc::new(corpus(&[war_prayers()]).with_vector_delay(Duration::from_secs(5)));
	let service = service(corpus);
	let handle = CancelHandle::new();
	let trigger = handle.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		trigger.cancel();
	});

	let result = service
		.retrieve_and_assemble(
			"orphans of war",
			&SessionHistory::default(),
			&defaults(),
			Some(&handle),
		)
		.await;

	assert!(matches!(result, Err(Error::Cancelled)), "Unexpected result: {result:?}");
	assert!(service.cache.is_empty());
}

#[tokio::test]
async fn cancellation_during_enrichment_discards_finished_lookups() {
	let corpus = Arc::new(
		corpus(&[war_prayers(), harvest()])
			.with_slow_document("harvest", Duration::from_millis(500)),
	);
	let service = service(corpus.clone());
	let handle = CancelHandle::new();
	let trigger = handle.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(150)).await;
		trigger.cancel();
	});

	let result = service
		.retrieve_and_assemble(
			"songs for orphans of war and the harvest",
			&SessionHistory::default(),
			&defaults(),
			Some(&handle),
		)
		.await;

	assert!(matches!(result, Err(Error::Cancelled)), "Unexpected result: {result:?}");
	assert_eq!(corpus.metadata_calls(), 2);
	assert_eq!(service.cache.len(), 0);
}

#[tokio::test]
async fn cancelled_handle_stops_before_any_backend_call() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let service = service(corpus.clone());
	let handle = CancelHandle::new();

	handle.cancel();

	let result = service
		.retrieve_and_assemble(
			"orphans of war",
			&SessionHistory::default(),
			&defaults(),
			Some(&handle),
		)
		.await;

	assert!(matches!(result, Err(Error::Cancelled)));
	assert_eq!(corpus.vector_calls(), 0);
}

#[tokio::test]
async fn deadline_is_enforced_across_retrievers() {
	let corpus = Arc::new(corpus(&[war_prayers()]).with_vector_delay(Duration::from_secs(5)));
	let service = service(corpus);
	let opts = RetrievalRequestOptions { timeout_ms: Some(30), ..defaults() };
	let result = service
		.retrieve_and_assemble("orphans of war", &SessionHistory::default(), &opts, None)
		.await;

	assert!(matches!(result, Err(Error::DeadlineExceeded)), "Unexpected result: {result:?}");
	assert!(service.cache.is_empty());
}

#[tokio::test]
async fn transient_metadata_failure_is_retried() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let service = service(corpus.clone());

	corpus.fail_next_metadata_lookups(1);

	let outcome = service
		.retrieve_and_assemble("orphans of war", &SessionHistory::default(), &defaults(), None)
		.await
		.expect("Retrieval should succeed.");

	assert_eq!(corpus.metadata_calls(), 2);
	assert!(outcome.sources[0].metadata.is_some());
}

#[tokio::test]
async fn failed_metadata_lookup_degrades_to_missing_fields() {
	let corpus = Arc::new(corpus(&[war_prayers()]).with_failing_document("war-prayers"));
	let service = service(corpus.clone());
	let outcome = service
		.retrieve_and_assemble("orphans of war", &SessionHistory::default(), &defaults(), None)
		.await
		.expect("Enrichment failures should not fail retrieval.");

	assert_eq!(corpus.metadata_calls(), 1);
	assert_eq!(outcome.sources.len(), 1);
	assert_eq!(outcome.sources[0].document_title, "Prayers for War-Affected Children");
	assert!(outcome.sources[0].metadata.is_none());
}

#[tokio::test]
async fn malformed_options_fail_fast() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let service = service(corpus.clone());
	let history = SessionHistory::default();

	for opts in [
		RetrievalRequestOptions { vector_weight: Some(1.5), ..defaults() },
		RetrievalRequestOptions { min_lexical_score: Some(f64::NAN), ..defaults() },
		RetrievalRequestOptions { max_results: Some(2), ..defaults() },
		RetrievalRequestOptions { max_per_document: Some(1), ..defaults() },
		RetrievalRequestOptions { timeout_ms: Some(0), ..defaults() },
	] {
		let result = service.retrieve_and_assemble("orphans of war", &history, &opts, None).await;

		assert!(matches!(result, Err(Error::InvalidRequest { .. })), "Unexpected result: {result:?}");
	}

	let blank = service.retrieve_and_assemble(" \n ", &history, &defaults(), None).await;

	assert!(matches!(blank, Err(Error::InvalidRequest { .. })));
	assert_eq!(corpus.vector_calls(), 0);
}

#[tokio::test]
async fn session_turns_feed_the_next_classification() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let service = service(corpus.clone());
	let answer = "Week one: shelter. ".repeat(30);

	service
		.retrieve_for_session("s1", "Outline a study on orphans of war", &defaults(), None)
		.await
		.expect("Retrieval should succeed.");
	service.record_answer("s1", &answer).await.expect("Answer should be recorded.");

	let history = service.sessions.load("s1").await.expect("History should load.");

	assert_eq!(history.turns.len(), 2);
	assert_eq!(history.prior_artifact(), Some(answer.as_str()));

	service.sessions.invalidate("s1").expect("Invalidate should succeed.");

	let reloaded = service.sessions.load("s1").await.expect("History should reload from store.");

	assert_eq!(reloaded, history);

	let outcome = service
		.retrieve_for_session("s1", "Add a prayer to that", &defaults(), None)
		.await
		.expect("Retrieval should succeed.");

	assert_eq!(
		outcome.intent.chat_action,
		lumen_domain::intent::ChatAction::TransformPriorArtifact
	);
	assert!(outcome.gate.proceed);
}

#[tokio::test]
async fn sessions_survive_a_disabled_cache_without_a_history_store() {
	let corpus = Arc::new(corpus(&[war_prayers()]));
	let mut cfg = lumen_testkit::test_config(DIMENSIONS);

	cfg.cache.enabled = false;

	let backends = Backends::new(
		Arc::new(HashEmbedding),
		corpus.clone(),
		corpus.clone(),
		corpus.clone(),
	);
	let service = service_with(cfg, backends);
	let answer = "Week one: shelter. ".repeat(32);

	service.record_answer("s1", &answer).await.expect("Answer should be recorded.");

	let history = service.sessions.load("s1").await.expect("History should load.");

	assert_eq!(history.turns.len(), 1);
	assert_eq!(history.prior_artifact(), Some(answer.as_str()));

	let outcome = service
		.retrieve_for_session("s1", "Add scripture to that outline", &defaults(), None)
		.await
		.expect("Retrieval should succeed.");

	assert_eq!(
		outcome.intent.chat_action,
		lumen_domain::intent::ChatAction::TransformPriorArtifact
	);
	assert!(service.cache.is_empty());
}

#[test]
fn fixture_passages_keep_document_fields() {
	let passages: Vec<Passage> = war_prayers().passages();

	assert_eq!(passages[0].document_title, "Prayers for War-Affected Children");
	assert_eq!(passages[0].document_author.as_deref(), Some("Field Team"));
}
