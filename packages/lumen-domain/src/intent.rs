use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use lumen_config::Intent;

const FACTUAL_PATTERNS: &[&str] = &[
	r"\bwhat\b",
	r"\bwhen\b",
	r"\bwhere\b",
	r"\bwho\b",
	r"\bwhich\b",
	r"\bdefine\b",
	r"\bdefinition\b",
	r"\bmeaning of\b",
	r"\blist\b",
	r"^(is|are|was|were|does|do|did)\b",
];
const CONCEPTUAL_PATTERNS: &[&str] = &[
	r"\bhow\b",
	r"\bwhy\b",
	r"\bexplain\b",
	r"\bteach me\b",
	r"\bunderstand",
	r"\bdescribe\b",
	r"\bsignificance\b",
	r"\bimportance\b",
	r"\bpurpose\b",
	r"\bhelp me\b",
];
const COMPARATIVE_PATTERNS: &[&str] = &[
	r"\bcompar(e|ed|es|ing|ison)\b",
	r"\bversus\b",
	r"\bvs\b",
	r"\bdifference",
	r"\bdiffer\b",
	r"\bbetter\b",
	r"\bbetween\b.+\band\b",
	r"\bcontrast\b",
	r"\bsimilarit(y|ies)\b",
	r"\bpros and cons\b",
];
const EXPORT_VERB_PATTERN: &str =
	r"\b(export|download|generate|create|make|produce|build|convert|turn|save|render)\b";
const EXPORT_FORMAT_PATTERN: &str = r"\b(pdf|slides?|slide deck|powerpoint|pptx?|presentation|spreadsheet|excel|xlsx|csv|docx|word document)\b";
const TRANSFORM_REFERENCE_PATTERN: &str = r"\b(that|this|it|these|those)\b";
const SYNTHESIZE_PATTERN: &str = r"\b(outline|curriculum|syllabus|weekly|week-by-week|lesson plans?|framework|study plan|study guide|course plan)\b";
const BASIC_FACTUAL_PATTERN: &str = r"^(what|who|when|where) (is|are|was|were)\b|^define\b";
const TRANSFORM_VERBS: &[&str] = &[
	"add", "expand", "revise", "convert", "rewrite", "shorten", "summarize", "simplify", "rephrase",
	"edit", "update", "include", "remove", "extend", "condense", "adjust", "change", "translate",
	"format", "reorder",
];

static FACTUAL: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(FACTUAL_PATTERNS));
static CONCEPTUAL: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(CONCEPTUAL_PATTERNS));
static COMPARATIVE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(COMPARATIVE_PATTERNS));
static EXPORT_VERB: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(EXPORT_VERB_PATTERN).ok());
static EXPORT_FORMAT: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(EXPORT_FORMAT_PATTERN).ok());
static TRANSFORM_REFERENCE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(TRANSFORM_REFERENCE_PATTERN).ok());
static SYNTHESIZE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(SYNTHESIZE_PATTERN).ok());
static BASIC_FACTUAL: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(BASIC_FACTUAL_PATTERN).ok());

/// Drives source weight selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
	Factual,
	Conceptual,
	Comparative,
	General,
}
impl RetrievalStrategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Factual => "factual",
			Self::Conceptual => "conceptual",
			Self::Comparative => "comparative",
			Self::General => "general",
		}
	}
}

/// Drives gate thresholds and whether conversation state may stand in for fresh retrieval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
	RetrieveFromDocs,
	SynthesizeFromDocs,
	TransformPriorArtifact,
	GenerateDocument,
	BasicFactual,
}
impl ChatAction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RetrieveFromDocs => "retrieve_from_docs",
			Self::SynthesizeFromDocs => "synthesize_from_docs",
			Self::TransformPriorArtifact => "transform_prior_artifact",
			Self::GenerateDocument => "generate_document",
			Self::BasicFactual => "basic_factual",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResult {
	pub retrieval_strategy: RetrievalStrategy,
	pub chat_action: ChatAction,
}

pub fn classify(
	question: &str,
	has_history: bool,
	last_answer_len: usize,
	cfg: &Intent,
) -> IntentResult {
	let lowered = question.trim().to_lowercase();

	IntentResult {
		retrieval_strategy: classify_strategy(&lowered),
		chat_action: classify_chat_action(&lowered, has_history, last_answer_len, cfg),
	}
}

fn classify_strategy(lowered: &str) -> RetrievalStrategy {
	let factual = count_hits(&FACTUAL, lowered);
	let conceptual = count_hits(&CONCEPTUAL, lowered);
	let comparative = count_hits(&COMPARATIVE, lowered);
	let best = factual.max(conceptual).max(comparative);

	if best == 0 {
		return RetrievalStrategy::General;
	}

	let leaders = [factual, conceptual, comparative].iter().filter(|hits| **hits == best).count();

	if leaders > 1 {
		return RetrievalStrategy::General;
	}
	if factual == best {
		RetrievalStrategy::Factual
	} else if conceptual == best {
		RetrievalStrategy::Conceptual
	} else {
		RetrievalStrategy::Comparative
	}
}

fn classify_chat_action(
	lowered: &str,
	has_history: bool,
	last_answer_len: usize,
	cfg: &Intent,
) -> ChatAction {
	let word_count = lowered.split_whitespace().count();

	if is_match(&EXPORT_VERB, lowered) && is_match(&EXPORT_FORMAT, lowered) {
		return ChatAction::GenerateDocument;
	}
	if has_history
		&& last_answer_len > cfg.transform_min_prior_chars
		&& word_count <= cfg.transform_max_words
		&& starts_with_transform_verb(lowered)
		&& is_match(&TRANSFORM_REFERENCE, lowered)
	{
		return ChatAction::TransformPriorArtifact;
	}
	if is_match(&SYNTHESIZE, lowered) {
		return ChatAction::SynthesizeFromDocs;
	}
	if word_count <= cfg.basic_factual_max_words && is_match(&BASIC_FACTUAL, lowered) {
		return ChatAction::BasicFactual;
	}

	ChatAction::RetrieveFromDocs
}

fn starts_with_transform_verb(lowered: &str) -> bool {
	let mut words = lowered
		.split_whitespace()
		.map(|word| word.trim_matches(|ch: char| !ch.is_alphanumeric()));
	let Some(mut first) = words.next() else {
		return false;
	};

	if first == "please" {
		let Some(next) = words.next() else {
			return false;
		};

		first = next;
	}

	TRANSFORM_VERBS.contains(&first)
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
	patterns.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect()
}

fn count_hits(patterns: &[Regex], text: &str) -> usize {
	patterns.iter().filter(|re| re.is_match(text)).count()
}

fn is_match(re: &Option<Regex>, text: &str) -> bool {
	re.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use lumen_config::Intent;

	use crate::intent::{ChatAction, RetrievalStrategy, classify};

	fn fresh(question: &str) -> (RetrievalStrategy, ChatAction) {
		let result = classify(question, false, 0, &Intent::default());

		(result.retrieval_strategy, result.chat_action)
	}

	#[test]
	fn ties_fall_back_to_general() {
		// One factual hit ("what") and one conceptual hit ("why").
		assert_eq!(fresh("what and why").0, RetrievalStrategy::General);
		assert_eq!(fresh("fasting").0, RetrievalStrategy::General);
	}

	#[test]
	fn comparative_vocabulary_wins() {
		assert_eq!(
			fresh("What is the difference between lament and praise?").0,
			RetrievalStrategy::Comparative
		);
	}

	#[test]
	fn export_requires_a_format() {
		assert_eq!(fresh("Export this as a PDF").1, ChatAction::GenerateDocument);
		assert_eq!(fresh("Create slides from the outline").1, ChatAction::GenerateDocument);
		assert_eq!(fresh("Create a prayer for my neighbor").1, ChatAction::RetrieveFromDocs);
	}

	#[test]
	fn export_wins_over_transform() {
		let result = classify("Convert that into slides", true, 900, &Intent::default());

		assert_eq!(result.chat_action, ChatAction::GenerateDocument);
	}

	#[test]
	fn transform_requires_a_long_prior_answer() {
		let cfg = Intent::default();

		assert_eq!(
			classify("Expand that section", true, 120, &cfg).chat_action,
			ChatAction::RetrieveFromDocs
		);
		assert_eq!(
			classify("Please expand that section", true, 401, &cfg).chat_action,
			ChatAction::TransformPriorArtifact
		);
		assert_eq!(
			classify("Expand that section", false, 900, &cfg).chat_action,
			ChatAction::RetrieveFromDocs
		);
	}

	#[test]
	fn long_questions_are_not_basic_factual() {
		assert_eq!(
			fresh("What is the role of prayer in communities recovering from a long war").1,
			ChatAction::RetrieveFromDocs
		);
	}

	#[test]
	fn curriculum_vocabulary_synthesizes() {
		assert_eq!(
			fresh("Build a weekly study plan on the psalms").1,
			ChatAction::SynthesizeFromDocs
		);
	}
}
