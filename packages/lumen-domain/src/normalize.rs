use unicode_normalization::UnicodeNormalization;

/// Canonical form of a question used for cache keys.
///
/// NFKC-normalizes, strips zero-width characters, collapses whitespace runs to one space, trims,
/// and lowercases. Two phrasings that differ only in those respects produce the same string.
pub fn normalize_query_text(input: &str) -> String {
	let normalized: String = input.nfkc().filter(|ch| !is_zero_width(*ch)).collect();
	let mut out = String::with_capacity(normalized.len());

	for word in normalized.split_whitespace() {
		if !out.is_empty() {
			out.push(' ');
		}

		out.extend(word.chars().flat_map(char::to_lowercase));
	}

	out
}

pub fn is_zero_width(ch: char) -> bool {
	matches!(
		ch,
		'\u{00AD}' // soft hyphen
			| '\u{034F}' // combining grapheme joiner
			| '\u{061C}' // arabic letter mark
			| '\u{180E}' // mongolian vowel separator (deprecated)
			| '\u{200B}' // zero width space
			| '\u{200C}' // zero width non-joiner
			| '\u{200D}' // zero width joiner
			| '\u{2060}' // word joiner
			| '\u{FEFF}' // zero width no-break space
	)
}

#[cfg(test)]
mod tests {
	use crate::normalize::normalize_query_text;

	#[test]
	fn collapses_case_and_whitespace() {
		assert_eq!(normalize_query_text("  What   IS\tPrayer? \n"), "what is prayer?");
	}

	#[test]
	fn strips_zero_width_characters() {
		assert_eq!(normalize_query_text("pr\u{200B}ayer\u{FEFF}"), "prayer");
	}

	#[test]
	fn applies_compatibility_normalization() {
		// Fullwidth letters fold to ASCII under NFKC.
		assert_eq!(normalize_query_text("\u{FF30}rayer"), "prayer");
	}
}
