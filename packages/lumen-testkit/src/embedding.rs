use lumen_config::EmbeddingProviderConfig;
use lumen_service::{BoxFuture, EmbeddingProvider, Result};

/// Deterministic bag-of-words embedding: every term is hashed into one signed bucket and the
/// result is L2-normalized. Texts sharing terms get a positive cosine similarity.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashEmbedding;
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Ok(texts.iter().map(|text| embed_text(text, cfg.dimensions as usize)).collect())
		})
	}
}

pub fn embed_text(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimensions.max(1)];
	let normalized = lumen_domain::normalize::normalize_query_text(text);

	for term in lumen_domain::lexical::query_terms(&normalized, 1) {
		let hash = blake3::hash(term.as_bytes());
		let bytes = hash.as_bytes();
		let mut index_bytes = [0_u8; 8];

		index_bytes.copy_from_slice(&bytes[..8]);

		let index = (u64::from_le_bytes(index_bytes) % vector.len() as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[index] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

/// Cosine similarity of two unit vectors, mapped into `0.0..=1.0` by dropping negative values.
pub fn similarity(a: &[f32], b: &[f32]) -> f64 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();

	if dot.is_finite() { f64::from(dot).clamp(0.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
	use crate::embedding::{embed_text, similarity};

	#[test]
	fn identical_texts_have_full_similarity() {
		let a = embed_text("Prayer for orphans", 64);
		let b = embed_text("  PRAYER for   orphans ", 64);

		assert!((similarity(&a, &b) - 1.0).abs() < 1e-5);
	}

	#[test]
	fn empty_text_is_the_zero_vector() {
		let vector = embed_text("", 16);

		assert_eq!(vector.len(), 16);
		assert!(vector.iter().all(|value| *value == 0.0));
		assert_eq!(similarity(&vector, &embed_text("anything", 16)), 0.0);
	}
}
