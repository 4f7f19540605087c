use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{Duration, Instant};

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::corpus_index::CorpusIndex;
use super::curve::ExpCurve;
use super::embedding::EmbeddingEngine;
use super::hypothesis::{Hypothesis, add_to_verified_list, dist, rank_by_dist, truncate_to_matches};
use super::params::GeneratorParams;
use super::word_rank::WordRank;
use super::words::{
	comma_len, commas_in_sentence, is_comma_or_stop, last_words, make_first_word, split, stem_word,
};
use crate::error::Result;

/// Time spent in each engine since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timings {
	pub embedding: Duration,
	pub index: Duration,
}

/// Outcome of one `morph_seed` run.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphReport {
	/// Seed words followed by the generated words.
	pub words: Vec<String>,
	/// Number of words generated.
	pub predicted: usize,
	/// True if a step could not predict any word.
	pub stopped_early: bool,
	pub timings: Timings,
	pub total_time: Duration,
}

impl MorphReport {
	pub fn sentence(&self) -> String {
		self.words.join(" ")
	}
}

/// Sentence generator driving the corpus index and the embedding engine.
///
/// Each step slides a window over the end of the sentence, expands the window
/// words with their embedding neighbors, collects the corpus continuations of
/// every expanded window, keeps only those the corpus confirms after the
/// literal context, scores them and samples the next word.
///
/// # Responsibilities
/// - Predict the next word of a sentence (`predict`)
/// - Grow a seed sentence word by word (`morph_seed`)
/// - Maintain the translates bucket, reset at every `morph_seed`
/// - Add commas and periods where the corpus suggests a boundary
///
/// # Notes
/// - The corpus index is shared read-only; the embedding engine is borrowed
///   mutably because its neighbor cache grows during generation.
/// - Sampling weights are clamped at zero: multiplicities of subsumed
///   hypotheses can push a score below zero.
pub struct TextGenerator<'a> {
	params: GeneratorParams,
	embedding: &'a mut EmbeddingEngine,
	corpus: &'a CorpusIndex,
	word_rank: WordRank,
	/// Accumulated weight of every embedding neighbor of the sentence words.
	translates_bucket: HashMap<String, f64>,
	/// Lowercased sentence of the current step.
	seed_words: Vec<String>,
	rng: StdRng,
	timings: Timings,
}

impl<'a> TextGenerator<'a> {
	/// Creates a generator, loading the word-rank list from `common_words_path`.
	///
	/// # Errors
	/// - `MorphError::InvalidParams` if `params` does not validate
	/// - `MorphError::Io` if the word-rank list cannot be read
	pub fn new<P: AsRef<Path>>(
		params: GeneratorParams,
		embedding: &'a mut EmbeddingEngine,
		corpus: &'a CorpusIndex,
		common_words_path: P,
	) -> Result<Self> {
		params.validate()?;
		let word_rank = WordRank::new(common_words_path, params.common_word_coefficient)?;
		Self::with_word_rank(params, embedding, corpus, word_rank)
	}

	/// Creates a generator from an already built word-rank table.
	pub fn with_word_rank(
		params: GeneratorParams,
		embedding: &'a mut EmbeddingEngine,
		corpus: &'a CorpusIndex,
		word_rank: WordRank,
	) -> Result<Self> {
		params.validate()?;
		let rng = match params.rng_seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_os_rng(),
		};
		Ok(Self {
			params,
			embedding,
			corpus,
			word_rank,
			translates_bucket: HashMap::new(),
			seed_words: Vec::new(),
			rng,
			timings: Timings::default(),
		})
	}

	pub fn params(&self) -> &GeneratorParams {
		&self.params
	}

	pub fn translates_bucket(&self) -> &HashMap<String, f64> {
		&self.translates_bucket
	}

	/// Extends `seed` by up to `length` words.
	///
	/// The translates bucket is rebuilt from the seed words first. Generation
	/// stops early, without error, as soon as a step predicts nothing.
	pub fn morph_seed(&mut self, seed: &str, length: usize) -> MorphReport {
		self.timings = Timings::default();
		let mut words = split(seed);

		self.translates_bucket.clear();
		for word in &words {
			let stem = stem_word(word);
			for neighbor in self.make_glove(&stem, self.params.add_to_translates_bucket) {
				self.insert_to_translates_bucket(&neighbor, &stem);
			}
		}
		log::info!("translates glove time: {:.3} s", self.timings.embedding.as_secs_f64());

		let start = Instant::now();
		let mut predicted = 0;
		let mut stopped_early = false;
		for _ in 0..length {
			log::info!("Seed={}", words.join(" "));
			let before = self.timings;
			let word_start = Instant::now();

			let next = self.predict(&words);
			if let Some(word) = &next {
				self.add_next_word(&mut words, word);
				predicted += 1;
			}

			log::info!("glove time: {:.3} s", (self.timings.embedding - before.embedding).as_secs_f64());
			log::info!("tree time: {:.3} s", (self.timings.index - before.index).as_secs_f64());
			log::info!("word time: {:.3} s", word_start.elapsed().as_secs_f64());
			if next.is_none() {
				log::info!("can't predict next word and end morphing.");
				stopped_early = true;
				break;
			}
		}

		let total_time = start.elapsed();
		if !stopped_early {
			log::info!("Seed={}", words.join(" "));
		}
		log::info!("total glove time: {:.3} s", self.timings.embedding.as_secs_f64());
		log::info!("total tree time: {:.3} s", self.timings.index.as_secs_f64());
		log::info!("total time: {:.3} s", total_time.as_secs_f64());

		MorphReport { words, predicted, stopped_early, timings: self.timings, total_time }
	}

	/// Predicts the word following `sentence`, or `None` if the corpus
	/// confirms no hypothesis at any window length.
	pub fn predict(&mut self, sentence: &[String]) -> Option<String> {
		let corpus = self.corpus;
		self.seed_words = sentence.iter().map(|word| word.to_lowercase()).collect();
		let seed_words = self.seed_words.clone();
		let of_matches = self.params.of_matches as i64;

		let mut verified: Vec<Hypothesis> = Vec::new();
		let mut total_verified: i64 = 0;
		let mut window_len = seed_words.len().min(self.params.window);
		while window_len > 0 && total_verified < of_matches {
			let window = last_words(&seed_words, window_len);
			let lists = self.candidate_lists(window);
			log::debug!("Lists of {} word window = {:?}", window_len, lists);

			let start = Instant::now();
			let mut cursor = corpus.cursor();
			for (position, list) in lists.iter().enumerate() {
				cursor.update_words(position, list);
			}
			let hypotheses = cursor.get_words(window_len);
			log::trace!("Hypotheses = {:?}", hypotheses);

			let verify_len = self.params.verify.min(window_len + 1);
			let prefix: String = last_words(window, verify_len - 1).iter().map(|word| format!("{word} ")).collect();
			for hypothesis in hypotheses {
				let Some(word) = hypothesis.last() else {
					continue;
				};
				let candidate = format!("{prefix}{word}");
				let confirmed = [" ", ", ", ". "]
					.iter()
					.any(|boundary| corpus.contains(&format!("{candidate}{boundary}")));
				if confirmed {
					total_verified += add_to_verified_list(&mut verified, hypothesis);
				}
			}
			self.timings.index += start.elapsed();
			log::trace!("Verified = {:?}", verified);

			window_len -= 1;
		}

		if total_verified <= 0 {
			log::trace!("Matches = []");
			return None;
		}

		let window = last_words(&seed_words, self.params.window);
		rank_by_dist(&mut verified, window);
		truncate_to_matches(&mut verified, total_verified.min(of_matches));
		log::trace!("Matches = {:?}", verified);

		self.pick_next_word(&verified)
	}

	/// Candidate words for each window position.
	///
	/// Words before the last `,`/`.` of the window are stemmed, the rest are
	/// kept literal. The last `of_originals_near_next_word` positions are used
	/// as is; every other position is expanded with its embedding neighbors.
	fn candidate_lists(&mut self, window: &[String]) -> Vec<Vec<String>> {
		let comma_pos = window.iter().rposition(|word| is_comma_or_stop(word));
		let expanded = window.len().saturating_sub(self.params.of_originals_near_next_word);
		let mut lists = Vec::with_capacity(window.len());
		for (i, word) in window.iter().enumerate() {
			let word = if comma_pos.is_some_and(|pos| i < pos) { stem_word(word) } else { word.clone() };
			if i < expanded {
				lists.push(self.make_glove(&word, self.params.of_translates));
			} else {
				lists.push(vec![word]);
			}
		}
		lists
	}

	/// Scores every predicted word and samples one among the best.
	///
	/// `score = trans + max_len + contextual + originals`, where `contextual`
	/// weighs each supporting hypothesis by the length curve times its
	/// multiplicity and `originals` further weighs that term by how many
	/// context words literally match the sentence.
	fn pick_next_word(&mut self, hypotheses: &[Hypothesis]) -> Option<String> {
		let mut by_word: BTreeMap<&str, Vec<&Hypothesis>> = BTreeMap::new();
		for hypothesis in hypotheses {
			by_word.entry(hypothesis.word()).or_default().push(hypothesis);
		}

		let [at_window, at_one, incline] = self.params.contextual_coefficient;
		let curve = ExpCurve::new(1.0, at_one, (self.params.window + 1) as f64, at_window, incline);

		log::debug!(
			"{:<20}: {:<10}: {:<10}, {:<10}, {:<10}, {:<10}",
			"word",
			"score",
			"TransScore",
			"LenScore",
			"Contextual",
			"Originals"
		);
		let mut scored: Vec<(&str, f64)> = Vec::with_capacity(by_word.len());
		for (word, supporting) in &by_word {
			let mut max_len = 0;
			let mut contextual = 0.0;
			let mut originals = 0.0;
			for hypothesis in supporting {
				let len = hypothesis.words.len();
				max_len = max_len.max(len);
				let coefficient = curve.eval(len as f64) * hypothesis.len as f64;
				contextual += coefficient;
				originals += coefficient * dist(&hypothesis.words, &self.seed_words).0 as f64;
			}
			let trans = self.translates_bucket.get(*word).copied().unwrap_or(0.0);
			let score = trans + max_len as f64 + contextual + originals;
			log::debug!(
				"{:<20}: {:10.4}: {:10.4}, {:10}, {:10.4}, {:10.4}",
				word,
				score,
				trans,
				max_len,
				contextual,
				originals
			);
			scored.push((*word, score));
		}

		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.truncate(self.params.pick_from_translates_bucket);

		let weights: Vec<f64> = scored.iter().map(|(_, score)| score.max(0.0)).collect();
		let choice = match WeightedIndex::new(&weights) {
			Ok(distribution) => distribution.sample(&mut self.rng),
			Err(e) => {
				log::debug!("No positive score among top candidates ({e}), taking the best one");
				0
			}
		};
		scored.get(choice).map(|(word, _)| (*word).to_owned())
	}

	/// Appends a predicted word, updates the translates bucket and decides
	/// whether a comma or period follows it.
	fn add_next_word(&mut self, words: &mut Vec<String>, next_word: &str) {
		let starts_sentence = words.last().is_some_and(|word| word.ends_with('.'));
		words.push(if starts_sentence { make_first_word(next_word) } else { next_word.to_owned() });

		for neighbor in self.make_glove(next_word, self.params.add_to_translates_bucket) {
			self.insert_to_translates_bucket(&neighbor, next_word);
		}

		if !self.is_last_candidate_most_frequent(words) {
			log::trace!("we can't add comma due to last word frequency rule.");
			return;
		}

		let since_boundary = comma_len(words);
		let [soft, hard] = self.params.words_per_comma_or_period;
		let should_add = since_boundary >= soft && (since_boundary >= hard || self.rng.random_bool(0.5));
		if !should_add {
			log::trace!("we can't add comma due to WordsPerCommaOrPeriod rule.");
			return;
		}

		let mark = if commas_in_sentence(words) >= self.params.commas_per_sentence { '.' } else { ',' };
		log::trace!("add real comma/stop: {mark}");
		if let Some(last) = words.last_mut() {
			last.push(mark);
		}
	}

	/// True if the newest window is a better boundary point than the windows
	/// just before it.
	///
	/// For each trailing window the boundary frequency is the share of its
	/// corpus occurrences followed by `,` or `.`. The newest window must beat
	/// every other checked window.
	fn is_last_candidate_most_frequent(&mut self, words: &[String]) -> bool {
		log::trace!("Checking if last word is most frequent for hypo -> {}", words.join(" "));
		let window = self.params.len_frequency_check_window;
		let Some(last_window) = words.len().checked_sub(window) else {
			return false;
		};

		let start = Instant::now();
		let mut last_frequency = 0.0;
		let mut most_frequency: f64 = 0.0;
		for i in 0..self.params.nof_frequency_check_candidates.min(last_window + 1) {
			let from = last_window - i;
			let candidate = words[from..from + window].iter().map(|word| stem_word(word)).collect::<Vec<_>>().join(" ");

			let empty_count = self.corpus.frequency(&format!("{candidate} "));
			let comma_count = self.corpus.frequency(&format!("{candidate}, "));
			let stop_count = self.corpus.frequency(&format!("{candidate}. "));
			let total_count = empty_count + comma_count + stop_count;
			let frequency =
				if total_count > 0 { (comma_count + stop_count) as f64 / total_count as f64 } else { 0.0 };
			log::trace!(
				"\"{candidate},\": {comma_count},\t\"{candidate}.\": {stop_count},\tTotal: {total_count},\tFreq: {frequency}"
			);

			if i == 0 {
				last_frequency = frequency;
			} else {
				most_frequency = most_frequency.max(frequency);
			}
		}
		self.timings.index += start.elapsed();
		last_frequency > most_frequency
	}

	/// The word followed by its embedding neighbors.
	///
	/// A trailing `,`/`.` is removed before the lookup and put back on every
	/// returned word.
	fn make_glove(&mut self, word: &str, count: usize) -> Vec<String> {
		let start = Instant::now();
		let suffix = word.chars().last().filter(|&c| matches!(c, ',' | '.'));
		let stem = match suffix {
			Some(c) => &word[..word.len() - c.len_utf8()],
			None => word,
		};

		let mut list = Vec::with_capacity(count + 1);
		list.push(stem.to_owned());
		list.extend(self.embedding.similar_by_word(stem, count));
		if let Some(suffix) = suffix {
			for word in &mut list {
				word.push(suffix);
			}
		}
		self.timings.embedding += start.elapsed();
		list
	}

	fn insert_to_translates_bucket(&mut self, insert_word: &str, seed_word: &str) {
		*self.translates_bucket.entry(insert_word.to_owned()).or_default() += self.word_rank.score(seed_word);
	}
}
