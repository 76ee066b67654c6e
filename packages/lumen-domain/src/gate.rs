use serde::Serialize;

use lumen_config::{Gate, GateThresholds};

use crate::intent::ChatAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
	/// Transform intents run on the prior artifact and skip the numeric thresholds.
	PriorArtifact,
	/// Document generation has something to render from.
	DocumentSource,
	Sufficient,
	EmptyContext,
	BelowConfidenceFloor,
	WeakEvidence,
}

/// What the caller should answer with when the gate rejects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
	NotFoundInCorpus,
	Clarify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GateDecision {
	pub proceed: bool,
	pub reason: GateReason,
}
impl GateDecision {
	pub fn fallback(&self) -> Option<Fallback> {
		if self.proceed {
			return None;
		}

		match self.reason {
			GateReason::EmptyContext => Some(Fallback::NotFoundInCorpus),
			_ => Some(Fallback::Clarify),
		}
	}
}

pub fn thresholds_for(cfg: &Gate, chat_action: ChatAction) -> GateThresholds {
	match chat_action {
		ChatAction::SynthesizeFromDocs => cfg.synthesize,
		ChatAction::BasicFactual => cfg.basic_factual,
		_ => cfg.default,
	}
}

pub fn gate(
	cfg: &Gate,
	context_size: usize,
	confidence: f64,
	top_score: f64,
	chat_action: ChatAction,
	has_prior_artifact: bool,
) -> GateDecision {
	if chat_action == ChatAction::TransformPriorArtifact && has_prior_artifact {
		return GateDecision { proceed: true, reason: GateReason::PriorArtifact };
	}
	if chat_action == ChatAction::GenerateDocument && (has_prior_artifact || context_size > 0) {
		return GateDecision { proceed: true, reason: GateReason::DocumentSource };
	}
	if context_size == 0 {
		return GateDecision { proceed: false, reason: GateReason::EmptyContext };
	}
	// NaN compares false everywhere, so it must be rejected explicitly.
	if !confidence.is_finite() || confidence <= cfg.confidence_floor {
		return GateDecision { proceed: false, reason: GateReason::BelowConfidenceFloor };
	}

	let thresholds = thresholds_for(cfg, chat_action);
	let top_score = if top_score.is_finite() { top_score } else { 0.0 };

	if confidence < thresholds.min_confidence && top_score < thresholds.min_top_score {
		return GateDecision { proceed: false, reason: GateReason::WeakEvidence };
	}

	GateDecision { proceed: true, reason: GateReason::Sufficient }
}
