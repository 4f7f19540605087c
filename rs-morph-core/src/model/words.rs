//! Small word-level helpers shared by the generator.

/// True if the word ends with a clause or sentence boundary (`,` or `.`).
pub(crate) fn is_comma_or_stop(word: &str) -> bool {
	word.ends_with([',', '.'])
}

/// Splits text on whitespace.
pub(crate) fn split(text: &str) -> Vec<String> {
	text.split_whitespace().map(str::to_owned).collect()
}

/// Lowercases a word and strips one trailing `,` or `.`.
pub(crate) fn stem_word(word: &str) -> String {
	let mut stem = word.to_lowercase();
	if is_comma_or_stop(&stem) {
		stem.pop();
	}
	stem
}

/// Capitalizes the first character of a word.
pub(crate) fn make_first_word(word: &str) -> String {
	let mut chars = word.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

/// Number of words after the last word carrying a comma or period.
pub(crate) fn comma_len(words: &[String]) -> usize {
	words.iter().rev().take_while(|word| !is_comma_or_stop(word)).count()
}

/// Number of commas in the current sentence, i.e. since the last period.
pub(crate) fn commas_in_sentence(words: &[String]) -> usize {
	words.iter().rev().take_while(|word| !word.ends_with('.')).filter(|word| word.ends_with(',')).count()
}

/// The last `len` words, or all of them if there are fewer.
pub(crate) fn last_words(words: &[String], len: usize) -> &[String] {
	&words[words.len().saturating_sub(len)..]
}

#[cfg(test)]
mod tests {
	use super::*;

	fn words(list: &[&str]) -> Vec<String> {
		list.iter().map(|w| (*w).to_owned()).collect()
	}

	#[test]
	fn stemming_lowercases_and_strips_one_boundary() {
		assert_eq!(stem_word("Street."), "street");
		assert_eq!(stem_word("cat,"), "cat");
		assert_eq!(stem_word("Cat"), "cat");
		assert_eq!(stem_word(""), "");
	}

	#[test]
	fn first_word_is_capitalized() {
		assert_eq!(make_first_word("the"), "The");
		assert_eq!(make_first_word(""), "");
	}

	#[test]
	fn comma_len_counts_words_since_boundary() {
		assert_eq!(comma_len(&words(&["a", "b,", "c", "d"])), 2);
		assert_eq!(comma_len(&words(&["a", "b"])), 2);
		assert_eq!(comma_len(&words(&["a", "b."])), 0);
	}

	#[test]
	fn commas_are_counted_within_the_sentence_only() {
		assert_eq!(commas_in_sentence(&words(&["a,", "b.", "c,", "d", "e,"])), 2);
		assert_eq!(commas_in_sentence(&words(&["a,", "b."])), 0);
	}

	#[test]
	fn last_words_clamps_to_available() {
		let list = words(&["a", "b", "c"]);
		assert_eq!(last_words(&list, 2), &list[1..]);
		assert_eq!(last_words(&list, 5), &list[..]);
	}
}
