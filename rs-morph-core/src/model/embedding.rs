use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::thread;

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{MorphError, Result};
use crate::io::read_nul_strings;

/// Vocabulary size from which similarities are computed in parallel shards.
const PARALLEL_MIN_WORDS: usize = 1 << 16;

/// Number of floats decoded per read when loading the binary form.
const FLOATS_PER_READ: usize = 16384;

/// Upper bound on what a binary header may reserve before any data is read.
const MAX_PREALLOCATED_ITEMS: usize = 1 << 24;

/// Word-embedding similarity engine.
///
/// Holds one unit-length vector per vocabulary word, stored as the rows of a
/// dense `words × planes` matrix, so the cosine similarity of a query word to
/// the whole vocabulary is a single matrix–vector product.
///
/// # Responsibilities
/// - Load vectors from the text form (normalizing them) or the binary form
/// - Save the binary form
/// - Rank the vocabulary by similarity to a word, caching the ranking
///
/// # Invariants
/// - `values` has exactly one row per entry of `words`
/// - Rows are L2-normalized once, at text load time
/// - A cached ranking never contains the word itself
#[derive(Debug, Clone)]
pub struct EmbeddingEngine {
	words: Vec<String>,
	word_indexes: HashMap<String, usize>,
	values: Array2<f32>,
	/// Minimum number of neighbors stored per cache entry.
	cache_min_count: usize,
	cache: HashMap<String, Vec<usize>>,
}

impl EmbeddingEngine {
	/// Creates an engine from raw vectors, normalizing each of them.
	///
	/// # Errors
	/// Returns `MorphError::Format` if the vectors do not all have the same
	/// number of planes.
	pub fn from_vectors<I, S>(entries: I, cache_min_count: usize) -> Result<Self>
	where
		I: IntoIterator<Item = (S, Vec<f64>)>,
		S: Into<String>,
	{
		let mut words = Vec::new();
		let mut values = Vec::new();
		let mut planes = None;
		for (word, vector) in entries {
			let word = word.into();
			match planes {
				None => planes = Some(vector.len()),
				Some(p) if p != vector.len() => {
					return Err(MorphError::Format(format!(
						"\"{}\" has {} planes instead of {}",
						word,
						vector.len(),
						p
					)));
				}
				Some(_) => {}
			}
			push_normalized(&mut values, &vector);
			words.push(word);
		}
		Self::from_parts(words, values, planes.unwrap_or(0), cache_min_count)
	}

	fn from_parts(words: Vec<String>, values: Vec<f32>, planes: usize, cache_min_count: usize) -> Result<Self> {
		let values = Array2::from_shape_vec((words.len(), planes), values)?;
		let mut word_indexes = HashMap::with_capacity(words.len());
		for (index, word) in words.iter().enumerate() {
			match word_indexes.entry(word.clone()) {
				Entry::Occupied(_) => log::warn!("Duplicate vocabulary word \"{}\", keeping its first vector", word),
				Entry::Vacant(entry) => {
					entry.insert(index);
				}
			}
		}
		Ok(Self { words, word_indexes, values, cache_min_count, cache: HashMap::new() })
	}

	/// Loads the whitespace-separated text form.
	///
	/// The optional first line `wordCount planeCount` is a header. With no
	/// plane count (or `0`), the count is inferred from the first word and
	/// enforced for every later word.
	///
	/// # Errors
	/// - `MorphError::Io` if the file cannot be read
	/// - `MorphError::Format` on an inconsistent plane count
	pub fn load_from_text_file<P: AsRef<Path>>(filepath: P, cache_min_count: usize) -> Result<Self> {
		let path = filepath.as_ref();
		log::info!("Loading embedding model from \"{}\"...", path.display());

		let file = File::open(path).map_err(|e| MorphError::io(path, e))?;
		let mut lines = BufReader::new(file).lines();
		let first = lines.next().transpose().map_err(|e| MorphError::io(path, e))?.unwrap_or_default();
		let (expected_words, planes) = parse_header(&first);
		let mut parser = TextVectorParser::new(planes.unwrap_or(0));
		if expected_words.is_none() {
			parser.push_line(&first)?;
		}
		for line in lines {
			parser.push_line(&line.map_err(|e| MorphError::io(path, e))?)?;
		}

		let (words, values, planes) = parser.finish()?;
		if let Some(expected) = expected_words {
			if expected != words.len() {
				log::warn!("Embedding header announces {} words, read {}", expected, words.len());
			}
		}
		log::info!("Embedding model loaded, {} words, {} planes", words.len(), planes);
		Self::from_parts(words, values, planes, cache_min_count)
	}

	/// Loads the binary form written by `save_to_bin_file`.
	///
	/// Vectors are taken as stored, without renormalization.
	pub fn load_from_bin_file<P: AsRef<Path>>(filepath: P, cache_min_count: usize) -> Result<Self> {
		let path = filepath.as_ref();
		log::info!("Loading embedding model from \"{}\"...", path.display());

		let file = File::open(path).map_err(|e| MorphError::io(path, e))?;
		let mut reader = BufReader::new(file);
		let count = read_dimension(&mut reader).map_err(|e| MorphError::io(path, e))?;
		let planes = read_dimension(&mut reader).map_err(|e| MorphError::io(path, e))?;
		let (Some(count), Some(planes)) = (count, planes) else {
			return Err(MorphError::Format(format!("negative dimensions in \"{}\"", path.display())));
		};

		let size = count
			.checked_mul(planes)
			.ok_or_else(|| MorphError::Format(format!("{} x {} values overflow", count, planes)))?;
		let values = read_floats(&mut reader, size).map_err(|e| MorphError::io(path, e))?;
		let words = read_nul_strings(&mut reader, count.min(MAX_PREALLOCATED_ITEMS))
			.map_err(|e| MorphError::io(path, e))?;
		if words.len() != count {
			return Err(MorphError::Format(format!("expected {} words, found {}", count, words.len())));
		}

		log::info!("Embedding model loaded, {} words, {} planes", words.len(), planes);
		Self::from_parts(words, values, planes, cache_min_count)
	}

	/// Writes `[i32 words][i32 planes][f32 values...][word NUL]...`.
	pub fn save_to_bin_file<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
		let path = filepath.as_ref();
		log::info!("Saving embedding model to \"{}\"...", path.display());

		let count = i32::try_from(self.words.len())
			.map_err(|_| MorphError::Format(format!("{} words do not fit the header", self.words.len())))?;
		let planes = i32::try_from(self.planes())
			.map_err(|_| MorphError::Format(format!("{} planes do not fit the header", self.planes())))?;
		self.write_bin(path, count, planes).map_err(|e| MorphError::io(path, e))?;

		log::info!("Embedding model saved");
		Ok(())
	}

	fn write_bin(&self, path: &Path, count: i32, planes: i32) -> io::Result<()> {
		let mut writer = BufWriter::new(File::create(path)?);
		writer.write_all(&count.to_le_bytes())?;
		writer.write_all(&planes.to_le_bytes())?;
		for value in self.values.iter() {
			writer.write_all(&value.to_le_bytes())?;
		}
		for word in &self.words {
			writer.write_all(word.as_bytes())?;
			writer.write_all(&[0])?;
		}
		writer.flush()
	}

	pub fn len(&self) -> usize {
		self.words.len()
	}

	pub fn is_empty(&self) -> bool {
		self.words.is_empty()
	}

	pub fn planes(&self) -> usize {
		self.values.ncols()
	}

	pub fn words(&self) -> &[String] {
		&self.words
	}

	pub fn vector(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
		self.word_indexes.get(word).map(|&index| self.values.row(index))
	}

	/// Returns up to `count` vocabulary words most similar to `word`.
	///
	/// The word itself is never part of the result. Exactly `count` words are
	/// returned whenever the vocabulary holds more than `count` other words;
	/// an unknown word yields an empty list.
	///
	/// # Notes
	/// - A cached ranking is reused only if it is long enough for `count`;
	///   otherwise it is recomputed and replaced.
	/// - At least `cache_min_count` neighbors are cached per computation.
	/// - Equal similarities rank by vocabulary index.
	pub fn similar_by_word(&mut self, word: &str, count: usize) -> Vec<String> {
		let wanted = count.min(self.words.len().saturating_sub(1));
		if let Some(cached) = self.cache.get(word) {
			if cached.len() >= wanted {
				return cached[..wanted].iter().map(|&i| self.words[i].clone()).collect();
			}
			log::debug!("Too few similar words cached for \"{}\": {} instead of {}", word, cached.len(), count);
		}

		let Some(&index) = self.word_indexes.get(word) else {
			return Vec::new();
		};
		let similar = self.calc_similar(index, count.max(self.cache_min_count));
		let result = similar.iter().take(count).map(|&i| self.words[i].clone()).collect();
		self.cache.insert(word.to_owned(), similar);
		result
	}

	/// Ranks the `count` nearest neighbors of row `index`, excluding itself.
	fn calc_similar(&self, index: usize, count: usize) -> Vec<usize> {
		let product = self.similarities(self.values.row(index));
		let by_similarity = |a: &usize, b: &usize| product[*b].total_cmp(&product[*a]).then(a.cmp(b));

		let mut indexes: Vec<usize> = (0..self.words.len()).collect();
		let keep = (count + 1).min(indexes.len());
		if keep == 0 {
			return Vec::new();
		}
		if keep < indexes.len() {
			indexes.select_nth_unstable_by(keep - 1, by_similarity);
			indexes.truncate(keep);
		}
		indexes.sort_unstable_by(by_similarity);

		match indexes.iter().position(|&i| i == index) {
			Some(pos) => {
				indexes.remove(pos);
			}
			None => indexes.truncate(count),
		}
		indexes
	}

	/// Dot product of `query` with every vocabulary vector.
	fn similarities(&self, query: ArrayView1<'_, f32>) -> Array1<f32> {
		let rows = self.values.nrows();
		let shards = num_cpus::get();
		if rows < PARALLEL_MIN_WORDS || shards < 2 {
			return self.values.dot(&query);
		}
		self.sharded_similarities(query, rows.div_ceil(shards))
	}

	/// Computes the product over contiguous row shards, one thread each.
	///
	/// Shards are concatenated in row order, so the result is identical to
	/// the single product.
	fn sharded_similarities(&self, query: ArrayView1<'_, f32>, shard_rows: usize) -> Array1<f32> {
		let parts: Vec<Array1<f32>> = thread::scope(|scope| {
			let handles: Vec<_> = self
				.values
				.axis_chunks_iter(Axis(0), shard_rows.max(1))
				.map(|shard| scope.spawn(move || shard.dot(&query)))
				.collect();
			handles
				.into_iter()
				.map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
				.collect()
		});

		let mut product = Vec::with_capacity(self.values.nrows());
		for part in parts {
			product.extend(part.iter().copied());
		}
		Array1::from_vec(product)
	}
}

/// Reads the optional `wordCount [planeCount]` header line.
fn parse_header(line: &str) -> (Option<usize>, Option<usize>) {
	let tokens: Vec<&str> = line.split_whitespace().collect();
	if tokens.is_empty() || tokens.len() > 2 {
		return (None, None);
	}
	let numbers: Option<Vec<usize>> = tokens.iter().map(|t| t.parse().ok()).collect();
	match numbers.as_deref() {
		Some([words]) => (Some(*words), None),
		Some([words, planes]) => (Some(*words), Some(*planes)),
		_ => (None, None),
	}
}

/// Appends `vector` divided by its L2 norm. A zero vector is kept as is.
fn push_normalized(values: &mut Vec<f32>, vector: &[f64]) {
	let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
	let scale = if norm > 0.0 { norm } else { 1.0 };
	values.extend(vector.iter().map(|v| (v / scale) as f32));
}

/// Token stream state machine for the text form: `word v1 .. vP word ...`.
struct TextVectorParser {
	planes: usize,
	words: Vec<String>,
	values: Vec<f32>,
	current: Vec<f64>,
	reading_values: bool,
}

impl TextVectorParser {
	fn new(planes: usize) -> Self {
		Self { planes, words: Vec::new(), values: Vec::new(), current: Vec::new(), reading_values: false }
	}

	fn current_word(&self) -> &str {
		self.words.last().map(String::as_str).unwrap_or_default()
	}

	fn push_line(&mut self, line: &str) -> Result<()> {
		line.split_whitespace().try_for_each(|token| self.push_token(token))
	}

	fn push_token(&mut self, token: &str) -> Result<()> {
		if self.reading_values {
			match token.parse::<f64>() {
				Ok(value) => {
					self.current.push(value);
					if self.current.len() == self.planes {
						self.flush_vector();
					}
					return Ok(());
				}
				Err(_) if self.planes == 0 && !self.current.is_empty() => {
					self.planes = self.current.len();
					log::debug!("Inferred {} planes from \"{}\"", self.planes, self.current_word());
					self.flush_vector();
				}
				Err(_) => {
					return Err(MorphError::Format(format!(
						"error converting \"{}\": \"{}\" has {} of {} values",
						token,
						self.current_word(),
						self.current.len(),
						self.planes
					)));
				}
			}
		}
		self.words.push(token.to_owned());
		self.current.clear();
		self.reading_values = true;
		Ok(())
	}

	fn flush_vector(&mut self) {
		push_normalized(&mut self.values, &self.current);
		self.current.clear();
		self.reading_values = false;
	}

	fn finish(mut self) -> Result<(Vec<String>, Vec<f32>, usize)> {
		if self.reading_values {
			if self.planes == 0 && !self.current.is_empty() {
				self.planes = self.current.len();
				self.flush_vector();
			} else {
				return Err(MorphError::Format(format!(
					"truncated vector for \"{}\": {} of {} values",
					self.current_word(),
					self.current.len(),
					self.planes
				)));
			}
		}
		Ok((self.words, self.values, self.planes))
	}
}

fn read_dimension<R: Read>(reader: &mut R) -> io::Result<Option<usize>> {
	let mut bytes = [0u8; 4];
	reader.read_exact(&mut bytes)?;
	Ok(usize::try_from(i32::from_le_bytes(bytes)).ok())
}

fn read_floats<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<f32>> {
	let mut values = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
	let mut buffer = vec![0u8; FLOATS_PER_READ * 4];
	let mut remaining = count;
	while remaining > 0 {
		let chunk = remaining.min(FLOATS_PER_READ);
		let bytes = &mut buffer[..chunk * 4];
		reader.read_exact(bytes)?;
		values.extend(bytes.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])));
		remaining -= chunk;
	}
	Ok(values)
}
