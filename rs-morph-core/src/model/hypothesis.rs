use std::cmp::Reverse;

use super::words::stem_word;

/// A candidate next word with the context words that produced it.
///
/// `words` ends with the predicted word. `len` is the evidence the
/// hypothesis adds on top of longer hypotheses ending the same way, so it
/// can be zero or negative when a longer, more specific hypothesis already
/// accounts for the same corpus occurrences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hypothesis {
	pub words: Vec<String>,
	pub len: i64,
}

impl Hypothesis {
	/// The predicted word.
	pub fn word(&self) -> &str {
		self.words.last().map(String::as_str).unwrap_or_default()
	}
}

/// Adds a verified hypothesis, returning the multiplicity it contributes.
///
/// - An existing hypothesis with identical words absorbs it (`+1`).
/// - Otherwise it is inserted with `1 - k`, where `k` is the multiplicity
///   already held by longer hypotheses it is a suffix of.
pub fn add_to_verified_list(list: &mut Vec<Hypothesis>, words: Vec<String>) -> i64 {
	let mut contained = 0;
	for verified in list.iter_mut() {
		if !verified.words.ends_with(&words) {
			continue;
		}
		if verified.words.len() == words.len() {
			verified.len += 1;
			return 1;
		}
		contained += verified.len;
	}
	list.push(Hypothesis { words, len: 1 - contained });
	1 - contained
}

/// Tail similarity between a hypothesis and the original words.
///
/// Walks the hypothesis context (all words but the predicted one) and the
/// original words from the end inward. Returns how many positions agree,
/// ignoring case and a trailing `,`/`.`, and a bitmask of the offsets that
/// agree.
pub fn dist(hypothesis: &[String], original: &[String]) -> (usize, u64) {
	let context = &hypothesis[..hypothesis.len().saturating_sub(1)];
	let mut same = 0;
	let mut pattern = 0u64;
	for (i, (hyp, orig)) in context.iter().rev().zip(original.iter().rev()).enumerate() {
		if stem_word(hyp) == stem_word(orig) {
			same += 1;
			pattern |= 1u64.checked_shl((original.len() - i) as u32).unwrap_or(0);
		}
	}
	(same, pattern)
}

/// Orders hypotheses by descending similarity to the original window.
///
/// The sort is stable: equally similar hypotheses keep their insertion order.
pub fn rank_by_dist(list: &mut [Hypothesis], original: &[String]) {
	list.sort_by_cached_key(|hypothesis| Reverse(dist(&hypothesis.words, original)));
}

/// Keeps the leading hypotheses whose multiplicities sum to `of_matches`.
///
/// The last kept hypothesis is reduced so that the sum is exact. A list
/// that never reaches `of_matches` is left untouched.
pub fn truncate_to_matches(list: &mut Vec<Hypothesis>, of_matches: i64) {
	let mut matched = 0;
	let cut = list.iter().position(|hypothesis| {
		matched += hypothesis.len;
		matched >= of_matches
	});
	if let Some(last) = cut {
		list[last].len -= matched - of_matches;
		list.truncate(last + 1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn words(text: &str) -> Vec<String> {
		text.split(' ').map(str::to_owned).collect()
	}

	fn total(list: &[Hypothesis]) -> i64 {
		list.iter().map(|h| h.len).sum()
	}

	#[test]
	fn identical_hypothesis_is_absorbed() {
		let mut list = Vec::new();
		assert_eq!(add_to_verified_list(&mut list, words("the cat sat")), 1);
		assert_eq!(add_to_verified_list(&mut list, words("the cat sat")), 1);
		assert_eq!(list, vec![Hypothesis { words: words("the cat sat"), len: 2 }]);
	}

	#[test]
	fn suffix_of_longer_hypotheses_adds_no_new_evidence() {
		let mut list = Vec::new();
		add_to_verified_list(&mut list, words("the cat sat"));
		add_to_verified_list(&mut list, words("a cat sat"));
		assert_eq!(add_to_verified_list(&mut list, words("cat sat")), -1);
		assert_eq!(add_to_verified_list(&mut list, words("cat sat")), 1);
		assert_eq!(total(&list), 2);
	}

	#[test]
	fn multiplicity_never_exceeds_raw_occurrences() {
		let raw = [
			"the cat sat", "cat sat", "sat", "a dog ran", "dog ran", "cat sat", "the cat sat", "ran", "dog sat", "sat",
		];
		let mut list = Vec::new();
		let mut raw_per_word: HashMap<String, i64> = HashMap::new();
		for hypothesis in raw {
			let hypothesis = words(hypothesis);
			*raw_per_word.entry(hypothesis.last().unwrap().clone()).or_default() += 1;
			add_to_verified_list(&mut list, hypothesis);
		}
		for (word, raw_count) in raw_per_word {
			let accounted: i64 = list.iter().filter(|h| h.word() == word).map(|h| h.len).sum();
			assert!(accounted <= raw_count, "{word}: {accounted} > {raw_count}");
		}
	}

	#[test]
	fn dist_counts_matching_tail_positions() {
		let original = words("walking down the");
		assert_eq!(dist(&words("down the street"), &original), (2, 0b1100));
		assert_eq!(dist(&words("up The street"), &original), (1, 0b1000));
		assert_eq!(dist(&words("street"), &original), (0, 0));
		assert_eq!(dist(&words("the, street"), &original), (1, 0b1000));
	}

	#[test]
	fn ranking_puts_closest_context_first() {
		let original = words("walking down the");
		let mut list = vec![
			Hypothesis { words: words("street"), len: 1 },
			Hypothesis { words: words("up the stairs"), len: 1 },
			Hypothesis { words: words("down the road"), len: 1 },
		];
		rank_by_dist(&mut list, &original);
		let order: Vec<&str> = list.iter().map(Hypothesis::word).collect();
		assert_eq!(order, vec!["road", "stairs", "street"]);
	}

	#[test]
	fn truncation_cuts_multiplicity_exactly() {
		let mut list = vec![
			Hypothesis { words: words("a"), len: 2 },
			Hypothesis { words: words("b"), len: 3 },
			Hypothesis { words: words("c"), len: 4 },
		];
		truncate_to_matches(&mut list, 4);
		assert_eq!(list.len(), 2);
		assert_eq!(list[1].len, 2);
		assert_eq!(total(&list), 4);
	}

	#[test]
	fn truncation_keeps_short_lists() {
		let mut list = vec![Hypothesis { words: words("a"), len: 1 }];
		truncate_to_matches(&mut list, 5);
		assert_eq!(list.len(), 1);
		assert_eq!(list[0].len, 1);
	}
}
