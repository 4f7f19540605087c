use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::curve::ExpCurve;
use crate::error::{MorphError, Result};
use crate::io::{cache_path, read_lines};

/// Rank list as cached on disk: words in rank order, most common first.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RankList {
	words: Vec<String>,
}

/// Static commonness score per word, derived from a frequency-rank list.
///
/// The score follows an exponential curve over the rank: the most common
/// word scores `m2`, the rarest listed word scores `m1`, and words missing
/// from the list score `m1` too. Rare words therefore pull harder on the
/// translates bucket than common ones.
///
/// # Invariants
/// - Read-only once built
#[derive(Debug, Clone)]
pub struct WordRank {
	scores: HashMap<String, f64>,
	default_score: f64,
}

impl WordRank {
	/// Loads the rank list from a text file, reusing a binary cache if one
	/// exists next to it and is not older than the text file.
	///
	/// - `coefficients` is `[m2, m1, incline]`.
	/// - Uses `postcard` for the cache; a broken cache is rebuilt.
	///
	/// # Errors
	/// Returns `MorphError::Io` if the text file cannot be read.
	pub fn new<P: AsRef<Path>>(filepath: P, coefficients: [f64; 3]) -> Result<Self> {
		let path = filepath.as_ref();
		log::info!("Loading common words from \"{}\"...", path.display());

		let cache_path = cache_path(path);
		let cached = if is_cache_fresh(path, &cache_path) {
			match read_cache(&cache_path) {
				Ok(list) => Some(list),
				Err(e) => {
					log::warn!("Ignoring word rank cache: {e}");
					None
				}
			}
		} else {
			None
		};

		let list = match cached {
			Some(list) => list,
			None => {
				let lines = read_lines(path).map_err(|e| MorphError::io(path, e))?;
				let list = RankList { words: parse_rank_list(&lines) };
				if let Err(e) = write_cache(&cache_path, &list) {
					log::warn!("Could not write word rank cache: {e}");
				}
				list
			}
		};

		let rank = Self::from_words(list.words, coefficients);
		log::info!("Common words loaded, {} words", rank.len());
		Ok(rank)
	}

	/// Scores words given in rank order (first is most common).
	///
	/// Repeated words keep their first rank.
	pub fn from_words<I, S>(words: I, coefficients: [f64; 3]) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut ranks: HashMap<String, usize> = HashMap::new();
		for word in words {
			let next = ranks.len() + 1;
			ranks.entry(word.into()).or_insert(next);
		}

		let [m2, m1, incline] = coefficients;
		let curve = ExpCurve::new(1.0, m1, ranks.len() as f64, m2, -incline);
		let scores = ranks
			.into_iter()
			.map(|(word, rank)| (word, m1 + m2 - curve.eval(rank as f64)))
			.collect();

		Self { scores, default_score: m1 }
	}

	/// Translation score of a word, or the default for unlisted words.
	pub fn score(&self, word: &str) -> f64 {
		self.scores.get(word).copied().unwrap_or(self.default_score)
	}

	pub fn len(&self) -> usize {
		self.scores.len()
	}

	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}
}

/// Extracts ranked words from the list lines.
///
/// - Lines starting with `#` (after indentation) are comments
/// - Only lines holding exactly one token count
/// - Words are lowercased; the first occurrence keeps its rank
fn parse_rank_list(lines: &[String]) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut words = Vec::new();
	for line in lines {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') || line.contains(char::is_whitespace) {
			continue;
		}
		let word = line.to_lowercase();
		if seen.insert(word.clone()) {
			words.push(word);
		}
	}
	words
}

fn is_cache_fresh(source: &Path, cache: &Path) -> bool {
	let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
	match (modified(source), modified(cache)) {
		(Some(source), Some(cache)) => cache >= source,
		_ => false,
	}
}

fn read_cache(path: &Path) -> Result<RankList> {
	let bytes = std::fs::read(path).map_err(|e| MorphError::io(path, e))?;
	Ok(postcard::from_bytes(&bytes)?)
}

fn write_cache(path: &Path, list: &RankList) -> Result<()> {
	let bytes = postcard::to_stdvec(list)?;
	std::fs::write(path, bytes).map_err(|e| MorphError::io(path, e))
}

#[cfg(test)]
mod tests {
	use super::*;

	const COEFFICIENTS: [f64; 3] = [0.000001, 40.0, 0.00001];

	#[test]
	fn rank_list_skips_comments_and_multi_token_lines() {
		let lines: Vec<String> = ["#header", "  The", "of", "two words", "", "the", "  # note", "AND"]
			.iter()
			.map(|l| (*l).to_owned())
			.collect();
		assert_eq!(parse_rank_list(&lines), vec!["the", "of", "and"]);
	}

	#[test]
	fn common_words_score_lower_than_rare_ones() {
		let rank = WordRank::from_words(["the", "of", "and", "cat", "meteor"], COEFFICIENTS);
		assert!(rank.score("the") < rank.score("of"));
		assert!(rank.score("cat") < rank.score("meteor"));
		assert!((rank.score("the") - COEFFICIENTS[0]).abs() < 1e-7);
		assert!((rank.score("meteor") - COEFFICIENTS[1]).abs() < 1e-6);
	}

	#[test]
	fn unknown_words_get_the_default_score() {
		let rank = WordRank::from_words(["the"], COEFFICIENTS);
		assert_eq!(rank.score("zebra"), COEFFICIENTS[1]);
		assert!(rank.score("the").is_finite());
	}

	#[test]
	fn repeated_words_keep_their_first_rank() {
		let rank = WordRank::from_words(["a", "b", "a", "c"], COEFFICIENTS);
		assert_eq!(rank.len(), 3);
		assert!(rank.score("a") < rank.score("b"));
	}
}
