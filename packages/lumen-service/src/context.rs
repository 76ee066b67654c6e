use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{FusedResult, options::RetrievalOptions};
use lumen_config::Context;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
	pub content: String,
	pub document_title: String,
	pub document_author: Option<String>,
	pub document_id: String,
	pub passage_id: String,
	pub chunk_index: i32,
	pub token_count: u32,
	pub score: f64,
	pub original_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
	pub items: Vec<ContextItem>,
	/// Chunks admitted by the relaxed second pass.
	pub relaxed_added: usize,
	pub token_count: u32,
}
impl AssembledContext {
	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Distinct document ids in context order.
	pub fn document_ids(&self) -> Vec<&str> {
		let mut seen = HashSet::new();

		self.items
			.iter()
			.map(|item| item.document_id.as_str())
			.filter(|id| seen.insert(*id))
			.collect()
	}
}

/// Builds the generation context from a ranked list.
///
/// A tight pass admits up to `max_per_document` chunks per document. If that leaves the budget
/// short, a relaxed pass admits up to `relaxed_extra_per_document` more chunks, only from
/// documents the tight pass already chose, in score order. Both passes respect `max_tokens`.
/// Items are grouped by document; groups are ordered by their best score.
pub fn assemble_context(results: &[FusedResult], cfg: &Context) -> AssembledContext {
	let budget = cfg.chunk_budget as usize;
	let tight_cap = cfg.max_per_document as usize;
	let relaxed_cap = tight_cap + cfg.relaxed_extra_per_document as usize;
	let mut selected = vec![false; results.len()];
	let mut counts: HashMap<&str, usize> = HashMap::new();
	let mut tokens = 0_u32;
	let mut chosen = 0_usize;

	for (idx, result) in results.iter().enumerate() {
		if chosen >= budget {
			break;
		}

		let count = counts.entry(result.passage.document_id.as_str()).or_default();

		if *count >= tight_cap || !fits_tokens(tokens, result.passage.token_count, cfg) {
			continue;
		}

		*count += 1;
		tokens += result.passage.token_count;
		chosen += 1;
		selected[idx] = true;
	}

	let tight_documents: HashSet<&str> = results
		.iter()
		.zip(&selected)
		.filter(|(_, picked)| **picked)
		.map(|(result, _)| result.passage.document_id.as_str())
		.collect();
	let mut relaxed_added = 0;

	if chosen < budget {
		for (idx, result) in results.iter().enumerate() {
			if chosen >= budget {
				break;
			}
			if selected[idx] || !tight_documents.contains(result.passage.document_id.as_str()) {
				continue;
			}

			let count = counts.entry(result.passage.document_id.as_str()).or_default();

			if *count >= relaxed_cap || !fits_tokens(tokens, result.passage.token_count, cfg) {
				continue;
			}

			*count += 1;
			tokens += result.passage.token_count;
			chosen += 1;
			relaxed_added += 1;
			selected[idx] = true;
		}
	}

	let mut group_order: Vec<&str> = Vec::new();
	let mut groups: HashMap<&str, Vec<ContextItem>> = HashMap::new();

	// Input is score-sorted, so first appearance is the group's best score.
	for (result, _) in results.iter().zip(&selected).filter(|(_, picked)| **picked) {
		let document_id = result.passage.document_id.as_str();

		if !groups.contains_key(document_id) {
			group_order.push(document_id);
		}

		groups.entry(document_id).or_default().push(context_item(result));
	}

	let items =
		group_order.into_iter().filter_map(|id| groups.remove(id)).flatten().collect::<Vec<_>>();

	AssembledContext { items, relaxed_added, token_count: tokens }
}

/// `(confidence, top_score)` for the quality gate.
///
/// Confidence is the mean of each item's pre-boost score as a fraction of the best achievable
/// fused score; the top score is the highest boosted score, clamped to `0.0..=1.0`.
pub fn confidence_signals(context: &AssembledContext, opts: &RetrievalOptions) -> (f64, f64) {
	if context.items.is_empty() {
		return (0.0, 0.0);
	}

	let weight_sum = opts.weight_sum();
	let confidence = if weight_sum > 0.0 {
		let total: f64 =
			context.items.iter().map(|item| (item.original_score / weight_sum).min(1.0)).sum();

		(total / context.items.len() as f64).clamp(0.0, 1.0)
	} else {
		0.0
	};
	let top_score = context
		.items
		.iter()
		.map(|item| item.score)
		.filter(|score| score.is_finite())
		.fold(0.0_f64, f64::max)
		.clamp(0.0, 1.0);

	(confidence, top_score)
}

fn fits_tokens(used: u32, next: u32, cfg: &Context) -> bool {
	match cfg.max_tokens {
		Some(max_tokens) => used.saturating_add(next) <= max_tokens,
		None => true,
	}
}

fn context_item(result: &FusedResult) -> ContextItem {
	ContextItem {
		content: result.passage.content.clone(),
		document_title: result.passage.document_title.clone(),
		document_author: result.passage.document_author.clone(),
		document_id: result.passage.document_id.clone(),
		passage_id: result.passage.id.clone(),
		chunk_index: result.passage.chunk_index,
		token_count: result.passage.token_count,
		score: result.fused_score,
		original_score: result.original_score,
	}
}
