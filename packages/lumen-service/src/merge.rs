use std::{cmp::Ordering, collections::HashMap};

use crate::{Candidate, FusedResult, Provenance, options::RetrievalOptions};
use lumen_config::TitleBoost;

/// Fuses vector and lexical candidates into one ranking.
///
/// Floors are applied per source before weighting. A passage (keyed by document and passage id)
/// found by both sources sums its weighted scores and becomes [`Provenance::Hybrid`]. After the
/// title boost, results are sorted by fused score with a document/passage id tie-break, truncated
/// to `max_results` and diversified. Output is fully determined by the inputs.
pub fn merge(
	vector: &[Candidate],
	lexical: &[Candidate],
	query_terms: &[String],
	opts: &RetrievalOptions,
	boost: &TitleBoost,
) -> Vec<FusedResult> {
	let mut index: HashMap<(String, String), usize> = HashMap::new();
	let mut fused: Vec<FusedResult> = Vec::new();

	for candidate in best_per_passage(vector, opts.min_vector_score) {
		let key = passage_key(candidate);

		index.insert(key, fused.len());
		fused.push(FusedResult {
			passage: candidate.passage.clone(),
			fused_score: candidate.raw_score * opts.vector_weight,
			original_score: 0.0,
			title_boost: 0.0,
			provenance: Provenance::Vector,
		});
	}
	for candidate in best_per_passage(lexical, opts.min_lexical_score) {
		let weighted = candidate.raw_score * opts.lexical_weight;

		if let Some(&pos) = index.get(&passage_key(candidate)) {
			let existing = &mut fused[pos];

			existing.fused_score += weighted;
			existing.provenance = Provenance::Hybrid;

			continue;
		}

		index.insert(passage_key(candidate), fused.len());
		fused.push(FusedResult {
			passage: candidate.passage.clone(),
			fused_score: weighted,
			original_score: 0.0,
			title_boost: 0.0,
			provenance: Provenance::Lexical,
		});
	}

	for result in &mut fused {
		let title_boost = title_boost(query_terms, &result.passage.document_title, boost);

		result.original_score = result.fused_score;
		result.title_boost = title_boost;
		result.fused_score += title_boost;
	}

	sort_results(&mut fused);
	fused.truncate(opts.max_results as usize);

	diversify(fused, opts.max_per_document as usize)
}

/// Flat bonus per query term found in the lowercased title, plus one concept bonus: the multi-term
/// bonus when two or more distinct terms match, the single-term bonus when exactly one does.
pub fn title_boost(query_terms: &[String], title: &str, cfg: &TitleBoost) -> f64 {
	let title = title.to_lowercase();
	let matched = query_terms.iter().filter(|term| title.contains(term.as_str())).count();

	match matched {
		0 => 0.0,
		1 => cfg.per_term + cfg.single_term_bonus,
		n => cfg.per_term * n as f64 + cfg.multi_term_bonus,
	}
}

/// Keeps at most `max_per_document` results per document, preserving order.
///
/// Over-cap results are dropped, not replaced.
pub fn diversify(results: Vec<FusedResult>, max_per_document: usize) -> Vec<FusedResult> {
	let mut counts: HashMap<String, usize> = HashMap::new();
	let mut out = Vec::with_capacity(results.len());

	for result in results {
		let count = counts.entry(result.passage.document_id.clone()).or_default();

		if *count >= max_per_document {
			continue;
		}

		*count += 1;

		out.push(result);
	}

	out
}

pub fn sort_results(results: &mut [FusedResult]) {
	results.sort_by(|a, b| {
		cmp_f64_desc(a.fused_score, b.fused_score)
			.then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
			.then_with(|| a.passage.id.cmp(&b.passage.id))
	});
}

/// Descending order with NaN last.
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn passage_key(candidate: &Candidate) -> (String, String) {
	(candidate.passage.document_id.clone(), candidate.passage.id.clone())
}

// Drops candidates under the floor (or non-finite) and keeps the best score per passage, in first
// occurrence order.
fn best_per_passage(candidates: &[Candidate], floor: f64) -> Vec<&Candidate> {
	let mut index: HashMap<(&str, &str), usize> = HashMap::new();
	let mut out: Vec<&Candidate> = Vec::new();

	for candidate in candidates {
		if !candidate.raw_score.is_finite() || candidate.raw_score < floor {
			continue;
		}

		let key = (candidate.passage.document_id.as_str(), candidate.passage.id.as_str());

		if let Some(&pos) = index.get(&key) {
			if candidate.raw_score > out[pos].raw_score {
				out[pos] = candidate;
			}

			continue;
		}

		index.insert(key, out.len());
		out.push(candidate);
	}

	out
}

#[cfg(test)]
mod tests {
	use lumen_config::TitleBoost;

	use crate::{
		Candidate, Passage, Provenance, SourceKind,
		merge::{diversify, merge, title_boost},
		options::RetrievalOptions,
	};

	fn passage(document_id: &str, id: &str, title: &str) -> Passage {
		Passage {
			id: id.to_string(),
			document_id: document_id.to_string(),
			document_title: title.to_string(),
			document_author: None,
			chunk_index: 0,
			content: "text".to_string(),
			token_count: 1,
		}
	}

	fn candidate(document_id: &str, id: &str, score: f64, kind: SourceKind) -> Candidate {
		Candidate {
			passage: passage(document_id, id, "Untitled"),
			raw_score: score,
			source_kind: kind,
		}
	}

	fn options() -> RetrievalOptions {
		RetrievalOptions {
			vector_weight: 0.7,
			lexical_weight: 0.3,
			min_vector_score: 0.3,
			min_lexical_score: 0.05,
			max_results: 20,
			max_per_document: 3,
			candidate_k: 40,
			cache_enabled: false,
			caller_id: None,
			timeout: None,
		}
	}

	#[test]
	fn floors_apply_before_fusion() {
		let vector = vec![candidate("d1", "p1", 0.2, SourceKind::Vector)];
		let lexical = vec![candidate("d1", "p1", 0.5, SourceKind::Lexical)];
		let merged = merge(&vector, &lexical, &[], &options(), &TitleBoost::default());

		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].provenance, Provenance::Lexical);
		assert!((merged[0].fused_score - 0.15).abs() < 1e-9);
	}

	#[test]
	fn same_passage_id_in_different_documents_stays_separate() {
		let vector = vec![candidate("d1", "p1", 0.9, SourceKind::Vector)];
		let lexical = vec![candidate("d2", "p1", 0.9, SourceKind::Lexical)];
		let merged = merge(&vector, &lexical, &[], &options(), &TitleBoost::default());

		assert_eq!(merged.len(), 2);
		assert!(merged.iter().all(|result| result.provenance != Provenance::Hybrid));
	}

	#[test]
	fn ties_break_by_document_then_passage_id() {
		let vector = vec![
			candidate("d2", "p1", 0.5, SourceKind::Vector),
			candidate("d1", "p2", 0.5, SourceKind::Vector),
			candidate("d1", "p1", 0.5, SourceKind::Vector),
		];
		let merged = merge(&vector, &[], &[], &options(), &TitleBoost::default());
		let order: Vec<(&str, &str)> = merged
			.iter()
			.map(|result| (result.passage.document_id.as_str(), result.passage.id.as_str()))
			.collect();

		assert_eq!(order, vec![("d1", "p1"), ("d1", "p2"), ("d2", "p1")]);
	}

	#[test]
	fn duplicate_candidates_keep_the_best_score() {
		let vector = vec![
			candidate("d1", "p1", 0.4, SourceKind::Vector),
			candidate("d1", "p1", 0.8, SourceKind::Vector),
		];
		let merged = merge(&vector, &[], &[], &options(), &TitleBoost::default());

		assert_eq!(merged.len(), 1);
		assert!((merged[0].fused_score - 0.56).abs() < 1e-9);
	}

	#[test]
	fn title_bonuses_are_mutually_exclusive() {
		let cfg = TitleBoost::default();
		let terms = vec!["prayer".to_string(), "war".to_string(), "fasting".to_string()];

		assert_eq!(title_boost(&terms, "Songs of Harvest", &cfg), 0.0);
		assert!((title_boost(&terms, "On Fasting", &cfg) - 0.35).abs() < 1e-9);
		assert!((title_boost(&terms, "Prayers in War", &cfg) - 0.6).abs() < 1e-9);
	}

	#[test]
	fn title_terms_match_as_substrings() {
		let cfg = TitleBoost::default();
		let single = cfg.per_term + cfg.single_term_bonus;
		let boost = |term: &str, title: &str| title_boost(&[term.to_string()], title, &cfg);

		// Plural and inflected titles count, and so do words that merely contain a term.
		assert!((boost("prayer", "Prayers at Dawn") - single).abs() < 1e-9);
		assert!((boost("war", "Award Winners") - single).abs() < 1e-9);
		assert!((boost("for", "Affordable Housing") - single).abs() < 1e-9);
		assert_eq!(boost("orphans", "Orphan Care"), 0.0);
	}

	#[test]
	fn diversify_drops_over_cap_without_replacement() {
		let vector = vec![
			candidate("d1", "p1", 0.9, SourceKind::Vector),
			candidate("d1", "p2", 0.8, SourceKind::Vector),
			candidate("d2", "p1", 0.7, SourceKind::Vector),
			candidate("d1", "p3", 0.6, SourceKind::Vector),
		];
		let ranked = merge(&vector, &[], &[], &options(), &TitleBoost::default());
		let diversified = diversify(ranked, 1);
		let ids: Vec<&str> =
			diversified.iter().map(|result| result.passage.document_id.as_str()).collect();

		assert_eq!(ids, vec!["d1", "d2"]);
	}

	#[test]
	fn empty_inputs_merge_to_empty() {
		assert!(merge(&[], &[], &[], &options(), &TitleBoost::default()).is_empty());
	}
}
