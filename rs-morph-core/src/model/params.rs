use serde::{Deserialize, Serialize};

use crate::error::{MorphError, Result};

/// Tunables of the text generator.
///
/// Every field has a default, so a parameter file only needs to name the
/// values it changes.
///
/// # Invariants (checked by `validate`)
/// - `window`, `verify`, `of_matches`, `pick_from_translates_bucket` and
///   `len_frequency_check_window` are at least 1
/// - `words_per_comma_or_period` is `[soft, hard]` with `soft <= hard`
/// - All coefficients are finite
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GeneratorParams {
	/// Longest context window used to look up the next word.
	pub window: usize,

	/// Number of literal words (context plus hypothesis) checked against the
	/// corpus before a hypothesis is accepted.
	pub verify: usize,

	/// Embedding neighbors added per window word when expanding candidates.
	pub of_translates: usize,

	/// Verified hypotheses to collect before narrowing the window stops.
	pub of_matches: usize,

	/// Window words nearest to the predicted word that are used literally.
	pub of_originals_near_next_word: usize,

	/// Commas allowed in one sentence before a period is forced.
	pub commas_per_sentence: usize,

	/// `[soft, hard]` words since the last comma/period: a boundary may be
	/// added from `soft` on (coin flip) and always is from `hard` on.
	pub words_per_comma_or_period: [usize; 2],

	/// `[m2, m1, incline]` of the word-rank score curve.
	pub common_word_coefficient: [f64; 3],

	/// `[y at window + 1, y at 1, incline]` of the hypothesis length curve.
	pub contextual_coefficient: [f64; 3],

	/// How many top-scored words the next word is sampled from.
	pub pick_from_translates_bucket: usize,

	/// Embedding neighbors of each new word inserted in the translates bucket.
	pub add_to_translates_bucket: usize,

	/// How many trailing windows are compared by the punctuation check.
	pub nof_frequency_check_candidates: usize,

	/// Length of each window compared by the punctuation check.
	pub len_frequency_check_window: usize,

	/// Seed of the sampling RNG. `None` seeds from the OS.
	pub rng_seed: Option<u64>,
}

impl Default for GeneratorParams {
	fn default() -> Self {
		Self {
			window: 4,
			verify: 2,
			of_translates: 2,
			of_matches: 1,
			of_originals_near_next_word: 0,
			commas_per_sentence: 2,
			words_per_comma_or_period: [4, 7],
			common_word_coefficient: [1.0, 100.0, 0.0011],
			contextual_coefficient: [1.0, 0.000001, 0.0002],
			pick_from_translates_bucket: 2,
			add_to_translates_bucket: 30,
			nof_frequency_check_candidates: 8,
			len_frequency_check_window: 2,
			rng_seed: None,
		}
	}
}

impl GeneratorParams {
	/// Checks the invariants listed on the struct.
	///
	/// # Errors
	/// Returns `MorphError::InvalidParams` naming the first offending field.
	pub fn validate(&self) -> Result<()> {
		let positive = [
			("window", self.window),
			("verify", self.verify),
			("of_matches", self.of_matches),
			("pick_from_translates_bucket", self.pick_from_translates_bucket),
			("len_frequency_check_window", self.len_frequency_check_window),
		];
		for (name, value) in positive {
			if value == 0 {
				return Err(MorphError::InvalidParams(format!("{name} must be >= 1")));
			}
		}
		let [soft, hard] = self.words_per_comma_or_period;
		if soft > hard {
			return Err(MorphError::InvalidParams(format!(
				"words_per_comma_or_period must be [soft, hard] with soft <= hard, got [{soft}, {hard}]"
			)));
		}

		let mut coefficients = self.common_word_coefficient.iter().chain(&self.contextual_coefficient);
		if coefficients.any(|c| !c.is_finite()) {
			return Err(MorphError::InvalidParams("coefficients must be finite".to_owned()));
		}
		Ok(())
	}

	/// Record length the corpus index must be built with.
	///
	/// Windows of `window` words are followed by the predicted word, and the
	/// verification prefix spans `verify` words.
	pub fn scan_window(&self) -> usize {
		(self.window + 1).max(self.verify)
	}

	/// Neighbors the embedding engine should cache per word.
	pub fn cache_min_count(&self) -> usize {
		self.of_translates.max(self.add_to_translates_bucket)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let params = GeneratorParams::default();
		assert!(params.validate().is_ok());
		assert_eq!(params.scan_window(), 5);
		assert_eq!(params.cache_min_count(), 30);
	}

	#[test]
	fn zero_window_is_rejected() {
		let params = GeneratorParams { window: 0, ..GeneratorParams::default() };
		assert!(matches!(params.validate(), Err(MorphError::InvalidParams(m)) if m.contains("window")));
	}

	#[test]
	fn inverted_comma_thresholds_are_rejected() {
		let params = GeneratorParams { words_per_comma_or_period: [5, 3], ..GeneratorParams::default() };
		assert!(params.validate().is_err());
	}

	#[test]
	fn non_finite_coefficients_are_rejected() {
		let params = GeneratorParams { contextual_coefficient: [1.0, f64::NAN, 2.3], ..GeneratorParams::default() };
		assert!(params.validate().is_err());
	}

	#[test]
	fn scan_window_covers_long_verification() {
		let params = GeneratorParams { window: 2, verify: 6, ..GeneratorParams::default() };
		assert_eq!(params.scan_window(), 6);
	}
}
