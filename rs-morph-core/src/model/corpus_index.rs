use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::{MorphError, Result};
use crate::io::read_nul_strings;

/// Upper bound on the record capacity reserved up front when loading.
///
/// The count stored in the file is trusted for the loop, not for allocation.
const MAX_PREALLOCATED_RECORDS: usize = 1 << 24;

/// Half-open range `[from, to)` over the sorted record array.
///
/// All records inside an interval share the prefix that produced it.
/// Intervals order by `(from, to)`, which is the order used when merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
	from: usize,
	to: usize,
}

impl Interval {
	pub fn new(from: usize, to: usize) -> Self {
		debug_assert!(from <= to);
		Self { from, to }
	}

	pub fn from(&self) -> usize {
		self.from
	}

	pub fn to(&self) -> usize {
		self.to
	}

	pub fn len(&self) -> usize {
		self.to - self.from
	}

	pub fn is_empty(&self) -> bool {
		self.from == self.to
	}

	pub fn range(&self) -> Range<usize> {
		self.from..self.to
	}
}

/// Staging structure turning corpus text into fixed-width word windows.
///
/// Tokens are lowercased. A token survives only if it is purely alphabetic,
/// optionally followed by a single `,` or `.`. Any other token breaks the
/// rolling window, so no record ever spans it.
pub struct CorpusIndexBuilder {
	scan_window: usize,
	records: Vec<String>,
	last_words: VecDeque<String>,
}

impl CorpusIndexBuilder {
	pub fn new(scan_window: usize) -> Self {
		let scan_window = scan_window.max(1);
		Self { scan_window, records: Vec::new(), last_words: VecDeque::with_capacity(scan_window) }
	}

	/// Feeds a chunk of corpus text. The window carries over between calls.
	pub fn add_text(&mut self, text: &str) {
		for token in text.split_ascii_whitespace() {
			match normalize_token(token) {
				Some(word) => self.add_word(word),
				None => self.last_words.clear(),
			}
		}
	}

	fn add_word(&mut self, word: String) {
		if self.last_words.len() == self.scan_window {
			self.last_words.pop_front();
		}
		self.last_words.push_back(word);
		if self.last_words.len() == self.scan_window {
			let record = self.last_words.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
			self.records.push(record);
		}
	}

	/// Sorts the collected records and freezes them into a `CorpusIndex`.
	///
	/// Duplicate records are kept: their count is the corpus frequency.
	pub fn build(self) -> CorpusIndex {
		CorpusIndex::from_records(self.records)
	}
}

/// Lowercases a corpus token, or rejects it if it must break the window.
fn normalize_token(token: &str) -> Option<String> {
	let bytes = token.as_bytes();
	match bytes.iter().position(|b| !b.is_ascii_alphabetic()) {
		None => Some(token.to_ascii_lowercase()),
		Some(pos) if pos > 0 && pos + 1 == bytes.len() && matches!(bytes[pos], b',' | b'.') => {
			Some(token.to_ascii_lowercase())
		}
		_ => None,
	}
}

/// Immutable, lexicographically sorted array of corpus records.
///
/// Every query is an exact-prefix search on the sorted array: all records
/// starting with a key form one contiguous interval.
///
/// # Invariants
/// - `records` is sorted by byte order, and stays sorted through persistence
/// - Every record holds exactly the scan window's number of words
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
	records: Vec<String>,
}

impl CorpusIndex {
	/// Creates an index from unsorted records.
	pub fn from_records(mut records: Vec<String>) -> Self {
		records.sort_unstable();
		Self { records }
	}

	/// Builds the index from a corpus text file.
	///
	/// The file is streamed line by line; invalid UTF-8 is replaced rather
	/// than rejected, which only ever breaks a window.
	///
	/// # Errors
	/// Returns `MorphError::Io` if the corpus cannot be opened or read.
	pub fn build<P: AsRef<Path>>(filepath: P, scan_window: usize) -> Result<Self> {
		let path = filepath.as_ref();
		log::info!("Building corpus index from \"{}\"...", path.display());

		let file = File::open(path).map_err(|e| MorphError::io(path, e))?;
		let mut reader = BufReader::new(file);
		let mut builder = CorpusIndexBuilder::new(scan_window);
		let mut line = Vec::new();
		loop {
			line.clear();
			let read = reader.read_until(b'\n', &mut line).map_err(|e| MorphError::io(path, e))?;
			if read == 0 {
				break;
			}
			builder.add_text(&String::from_utf8_lossy(&line));
		}

		let index = builder.build();
		log::info!("Corpus index built, {} records", index.len());
		Ok(index)
	}

	/// Writes `[u64 count][record NUL]...` in sorted order.
	pub fn save_to_file<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
		let path = filepath.as_ref();
		log::info!("Saving corpus index to \"{}\"...", path.display());
		self.write_records(path).map_err(|e| MorphError::io(path, e))?;
		log::info!("Corpus index saved");
		Ok(())
	}

	fn write_records(&self, path: &Path) -> io::Result<()> {
		let mut writer = BufWriter::new(File::create(path)?);
		writer.write_all(&(self.records.len() as u64).to_le_bytes())?;
		for record in &self.records {
			writer.write_all(record.as_bytes())?;
			writer.write_all(&[0])?;
		}
		writer.flush()
	}

	/// Loads an index written by `save_to_file`.
	///
	/// The stored order is trusted and not re-verified.
	pub fn load_from_file<P: AsRef<Path>>(filepath: P) -> Result<Self> {
		let path = filepath.as_ref();
		log::info!("Loading corpus index from \"{}\"...", path.display());
		let records = Self::read_records(path).map_err(|e| MorphError::io(path, e))?;
		log::info!("Corpus index loaded, {} records", records.len());
		Ok(Self { records })
	}

	fn read_records(path: &Path) -> io::Result<Vec<String>> {
		let mut reader = BufReader::new(File::open(path)?);
		let mut header = [0u8; 8];
		reader.read_exact(&mut header)?;
		let count = usize::try_from(u64::from_le_bytes(header)).unwrap_or(usize::MAX);

		let records = read_nul_strings(&mut reader, count.min(MAX_PREALLOCATED_RECORDS))?;
		if records.len() != count {
			log::warn!("Corpus index header announces {} records, read {}", count, records.len());
		}
		Ok(records)
	}

	pub fn records(&self) -> &[String] {
		&self.records
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Returns the maximal interval of records starting with `key`.
	pub fn find_interval(&self, key: &str) -> Interval {
		self.find_interval_within(key, Interval::new(0, self.records.len()))
	}

	/// Equal-range search for `key` restricted to `bounds`.
	///
	/// Records compare on their first `key.len()` bytes only.
	fn find_interval_within(&self, key: &str, bounds: Interval) -> Interval {
		let slice = &self.records[bounds.range()];
		let lower = slice.partition_point(|record| compare_prefix(record, key) == Ordering::Less);
		let upper = slice.partition_point(|record| compare_prefix(record, key) != Ordering::Greater);
		Interval::new(bounds.from + lower, bounds.from + upper)
	}

	pub fn contains(&self, key: &str) -> bool {
		!self.find_interval(key).is_empty()
	}

	pub fn frequency(&self, key: &str) -> usize {
		self.find_interval(key).len()
	}

	/// Most frequent word following `prefix`, with its count.
	///
	/// Records of one interval are sorted, so equal next words form
	/// consecutive runs. The first maximal run wins a tie, which is the
	/// lexicographically smallest word among the most frequent ones.
	/// Returns `None` if no record starts with `prefix`.
	pub fn most_frequent_next_word(&self, prefix: &str) -> Option<(String, usize)> {
		let interval = self.find_interval(prefix);
		let mut best: Option<(&str, usize)> = None;
		let mut current: Option<(&str, usize)> = None;

		for record in &self.records[interval.range()] {
			let word = next_word_at(record, prefix.len());
			match current {
				Some((run_word, count)) if run_word == word => current = Some((run_word, count + 1)),
				_ => {
					if let Some((_, count)) = current {
						if best.is_none_or(|(_, best_count)| count > best_count) {
							best = current;
						}
					}
					current = Some((word, 1));
				}
			}
		}

		if let Some((_, count)) = current {
			if best.is_none_or(|(_, best_count)| count > best_count) {
				best = current;
			}
		}
		best.map(|(word, count)| (word.to_owned(), count))
	}

	/// Starts an incremental narrowing over this index.
	pub fn cursor(&self) -> PrefixCursor<'_> {
		PrefixCursor { index: self, intervals: Vec::new() }
	}
}

/// Compares the first `key.len()` bytes of `record` against `key`.
fn compare_prefix(record: &str, key: &str) -> Ordering {
	let record = record.as_bytes();
	let head = &record[..record.len().min(key.len())];
	head.cmp(key.as_bytes())
}

/// Word starting at byte `pos`, up to the next space found after `pos`.
fn next_word_at(record: &str, pos: usize) -> &str {
	let Some(rest) = record.get(pos..) else {
		return "";
	};
	match rest.bytes().skip(1).position(|b| b == b' ') {
		Some(i) => &rest[..i + 1],
		None => rest,
	}
}

/// First `count` words of a record, without the trailing separator.
fn leading_words(record: &str, count: usize) -> &str {
	if count == 0 {
		return "";
	}
	match record.match_indices(' ').nth(count - 1) {
		Some((i, _)) => &record[..i],
		None => record,
	}
}

/// True if `a` and `b` agree on their first `position + 1` words.
fn is_same_cluster(a: &str, b: &str, position: usize) -> bool {
	let (a, b) = (a.as_bytes(), b.as_bytes());
	let mut remaining = position;
	let mut i = 0;
	loop {
		let (ca, cb) = (a.get(i), b.get(i));
		if ca != cb {
			return false;
		}
		match ca {
			None => return remaining == 0,
			Some(b' ') => {
				if remaining == 0 {
					return true;
				}
				remaining -= 1;
			}
			Some(_) => {}
		}
		i += 1;
	}
}

/// Sorts candidate intervals and merges overlapping ones of the same cluster.
///
/// Two intervals merge when they touch or overlap and their first records
/// agree on the words fixed so far. Merging an already merged set is a no-op.
pub(crate) fn merge_intervals(records: &[String], mut candidates: Vec<Interval>, position: usize) -> Vec<Interval> {
	candidates.sort_unstable();
	let mut merged: Vec<Interval> = Vec::with_capacity(candidates.len());
	for candidate in candidates {
		match merged.last_mut() {
			Some(back)
				if candidate.from <= back.to
					&& is_same_cluster(&records[back.from], &records[candidate.from], position) =>
			{
				back.to = back.to.max(candidate.to);
			}
			_ => merged.push(candidate),
		}
	}
	merged
}

/// Incremental, trie-like descent over a `CorpusIndex`.
///
/// Each call to `update_words` fixes one more word position, searching only
/// inside the intervals matched by the previous positions. The cursor owns
/// its interval set, so the index itself stays immutable and shareable.
#[derive(Debug, Clone)]
pub struct PrefixCursor<'a> {
	index: &'a CorpusIndex,
	intervals: Vec<Interval>,
}

impl<'a> PrefixCursor<'a> {
	/// Narrows the intervals with the candidate words for slot `position`.
	///
	/// At position 0 the whole index is searched for every candidate. Later
	/// positions rebuild the key from the matched context of each interval
	/// and search within that interval only.
	pub fn update_words(&mut self, position: usize, words: &[String]) {
		let records = &self.index.records;
		let mut candidates = Vec::new();

		if position == 0 {
			for word in words {
				let interval = self.index.find_interval(&format!("{word} "));
				if !interval.is_empty() {
					candidates.push(interval);
				}
			}
		} else {
			for interval in &self.intervals {
				let context = leading_words(&records[interval.from], position);
				for word in words {
					let key = format!("{context} {word} ");
					let found = self.index.find_interval_within(&key, *interval);
					if !found.is_empty() {
						candidates.push(found);
					}
				}
			}
		}

		log::trace!("Candidates at position {}: {:?}", position, candidates);
		self.intervals = merge_intervals(records, candidates, position);
	}

	/// Extracts one hypothesis per matched record.
	///
	/// Each hypothesis is the record's first `position` words followed by
	/// the word in slot `position`, stripped of a trailing `,` or `.`.
	/// A lone punctuation mark is never a predicted word.
	pub fn get_words(&self, position: usize) -> Vec<Vec<String>> {
		let mut result = Vec::new();
		for interval in &self.intervals {
			for record in &self.index.records[interval.range()] {
				let tokens: Vec<&str> = record.split(' ').collect();
				let Some(&word) = tokens.get(position) else {
					continue;
				};
				let word = match word.strip_suffix(|c: char| c == ',' || c == '.') {
					Some("") => continue,
					Some(stripped) => stripped,
					None => word,
				};
				let mut words: Vec<String> = tokens[..position].iter().map(|w| (*w).to_owned()).collect();
				words.push(word.to_owned());
				result.push(words);
			}
		}
		result
	}

	pub fn intervals(&self) -> &[Interval] {
		&self.intervals
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tiny_index() -> CorpusIndex {
		let mut builder = CorpusIndexBuilder::new(2);
		builder.add_text("the cat sat. the cat ran. the dog sat.");
		builder.build()
	}

	fn words(list: &[&str]) -> Vec<String> {
		list.iter().map(|w| (*w).to_owned()).collect()
	}

	#[test]
	fn builds_sorted_windows_across_punctuation() {
		let index = tiny_index();
		let mut expected = words(&[
			"the cat", "cat sat.", "sat. the", "the cat", "cat ran.", "ran. the", "the dog", "dog sat.",
		]);
		expected.sort();
		assert_eq!(index.records(), expected.as_slice());
	}

	#[test]
	fn prefix_interval_covers_all_matching_records() {
		let index = tiny_index();
		let interval = index.find_interval("the ");
		assert_eq!(interval.len(), 3);
		for record in &index.records()[interval.range()] {
			assert!(record.starts_with("the "));
		}
		assert_eq!(index.frequency("the cat"), 2);
		assert_eq!(index.frequency("cat sat. "), 0);
		assert!(index.contains("dog sat."));
		assert!(!index.contains("bird"));
	}

	#[test]
	fn find_interval_matches_a_linear_scan() {
		let mut builder = CorpusIndexBuilder::new(3);
		builder.add_text("a b c a b d a c b b a c a b c d d a b a b c");
		let index = builder.build();
		for key in ["a ", "a b ", "a b c", "b", "c a ", "d d a", "e", "", "a b c d"] {
			let interval = index.find_interval(key);
			let expected: Vec<usize> = (0..index.len()).filter(|&i| index.records()[i].starts_with(key)).collect();
			let found: Vec<usize> = interval.range().collect();
			assert_eq!(found, expected, "key {key:?}");
		}
	}

	#[test]
	fn tokens_with_inner_punctuation_break_the_window() {
		let mut builder = CorpusIndexBuilder::new(2);
		builder.add_text("Hello wor*ld how are you, yo-u do . ok");
		let index = builder.build();
		assert_eq!(index.records(), words(&["are you,", "how are"]).as_slice());
	}

	#[test]
	fn window_continues_across_text_chunks() {
		let mut builder = CorpusIndexBuilder::new(2);
		builder.add_text("the cat");
		builder.add_text("sat");
		assert!(builder.build().contains("cat sat"));
	}

	#[test]
	fn most_frequent_next_word_prefers_first_maximal_run() {
		let index = CorpusIndex::from_records(words(&["a x", "a y", "a y", "a z", "a z", "b q"]));
		assert_eq!(index.most_frequent_next_word("a "), Some(("y".to_owned(), 2)));
		assert_eq!(index.most_frequent_next_word("b "), Some(("q".to_owned(), 1)));
		assert_eq!(index.most_frequent_next_word("c "), None);
	}

	#[test]
	fn cursor_descends_through_candidate_lists() {
		let mut builder = CorpusIndexBuilder::new(3);
		builder.add_text("the cat sat. the dog sat. a cat ran.");
		let index = builder.build();
		let mut cursor = index.cursor();
		cursor.update_words(0, &words(&["the", "a"]));
		cursor.update_words(1, &words(&["cat", "dog"]));
		let mut hypotheses = cursor.get_words(2);
		hypotheses.sort();
		assert_eq!(
			hypotheses,
			vec![words(&["a", "cat", "ran"]), words(&["the", "cat", "sat"]), words(&["the", "dog", "sat"])]
		);
	}

	#[test]
	fn cursor_search_stays_inside_matched_context() {
		let mut builder = CorpusIndexBuilder::new(3);
		builder.add_text("red fox runs. blue fox hides.");
		let index = builder.build();
		let mut cursor = index.cursor();
		cursor.update_words(0, &words(&["blue"]));
		cursor.update_words(1, &words(&["fox"]));
		assert_eq!(cursor.get_words(2), vec![words(&["blue", "fox", "hides"])]);
	}

	#[test]
	fn unknown_first_word_empties_the_cursor() {
		let index = tiny_index();
		let mut cursor = index.cursor();
		cursor.update_words(0, &words(&["bird"]));
		assert!(cursor.intervals().is_empty());
		assert!(cursor.get_words(1).is_empty());
	}

	#[test]
	fn merge_collapses_duplicate_candidates_and_is_idempotent() {
		let index = tiny_index();
		let the = index.find_interval("the ");
		let cat = index.find_interval("cat ");
		let merged = merge_intervals(index.records(), vec![the, cat, the, cat], 0);
		assert_eq!(merged.len(), 2);
		let again = merge_intervals(index.records(), merged.clone(), 0);
		assert_eq!(again, merged);
	}

	#[test]
	fn merge_keeps_overlapping_intervals_of_distinct_clusters() {
		let records = words(&["a b", "a c", "a d"]);
		let merged = merge_intervals(&records, vec![Interval::new(0, 2), Interval::new(1, 3)], 1);
		assert_eq!(merged, vec![Interval::new(0, 2), Interval::new(1, 3)]);
		let merged = merge_intervals(&records, vec![Interval::new(0, 2), Interval::new(1, 3)], 0);
		assert_eq!(merged, vec![Interval::new(0, 3)]);
	}

	#[test]
	fn same_cluster_compares_position_plus_one_words() {
		assert!(is_same_cluster("a b c", "a b d", 1));
		assert!(!is_same_cluster("a b c", "a x c", 1));
		assert!(is_same_cluster("a b", "a b", 1));
		assert!(!is_same_cluster("a b", "a b", 2));
	}

	#[test]
	fn predicted_word_loses_trailing_punctuation_only() {
		let index = CorpusIndex::from_records(words(&["x y.", "x ."]));
		let mut cursor = index.cursor();
		cursor.update_words(0, &words(&["x"]));
		assert_eq!(cursor.get_words(1), vec![words(&["x", "y"])]);
	}
}
