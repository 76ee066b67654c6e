use unicode_segmentation::UnicodeSegmentation;

use lumen_config::LexicalScoring;

/// Distinct lowercased query terms with at least `min_term_chars` characters, in query order.
pub fn query_terms(query: &str, min_term_chars: usize) -> Vec<String> {
	let mut terms: Vec<String> = Vec::new();

	for word in query.unicode_words() {
		let term = word.to_lowercase();

		if term.chars().count() < min_term_chars {
			continue;
		}
		if terms.contains(&term) {
			continue;
		}

		terms.push(term);
	}

	terms
}

/// Relevance of `passage` for `query` in `0.0..=1.0`.
///
/// Exact word matches and substring-only matches ("pray" inside "prayer") are counted separately;
/// exact matches weigh double in the term frequency and alone earn the exact-match bonus. The
/// summed per-term contributions get an additive coverage bonus, then the whole sum is dampened by
/// the fraction of query terms that matched at all.
pub fn score(query: &str, passage: &str, cfg: &LexicalScoring) -> f64 {
	let terms = query_terms(query, cfg.min_term_chars);

	score_terms(&terms, passage, cfg)
}

pub fn score_terms(terms: &[String], passage: &str, cfg: &LexicalScoring) -> f64 {
	if terms.is_empty() {
		return 0.0;
	}

	let words: Vec<String> = passage.unicode_words().map(str::to_lowercase).collect();

	if words.is_empty() {
		return 0.0;
	}

	let word_count = words.len() as f64;
	let mut sum = 0.0;
	let mut matched = 0_usize;

	for term in terms {
		let mut exact = 0_usize;
		let mut substring = 0_usize;
		let mut first_position = None;

		for (idx, word) in words.iter().enumerate() {
			if word == term {
				exact += 1;
			} else if word.contains(term.as_str()) {
				substring += 1;
			} else {
				continue;
			}

			first_position.get_or_insert(idx);
		}

		let Some(first_position) = first_position else {
			continue;
		};
		let occurrences = (exact + substring) as f64;
		let term_frequency = (2.0 * exact as f64 + substring as f64) / word_count;
		let position_bonus = cfg.position_weight * (1.0 - first_position as f64 / word_count);
		let exact_bonus = if exact > 0 { cfg.exact_match_bonus } else { 0.0 };
		let frequency_bonus = (occurrences * cfg.frequency_step).min(cfg.frequency_cap);

		sum += term_frequency + position_bonus + exact_bonus + frequency_bonus;
		matched += 1;
	}

	let coverage = matched as f64 / terms.len() as f64;
	let total = (sum + coverage * cfg.coverage_weight) * coverage;

	if !total.is_finite() {
		return 0.0;
	}

	total.clamp(0.0, 1.0)
}
