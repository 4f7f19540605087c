use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::{Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};

use rs_morph_core::model::corpus_index::CorpusIndex;
use rs_morph_core::model::embedding::EmbeddingEngine;
use rs_morph_core::model::generator::TextGenerator;
use rs_morph_core::model::params::GeneratorParams;

/// Grows seed sentences from a corpus and word embeddings.
#[derive(Parser, Debug)]
#[command(name = "rs-morph", version, about)]
struct Cli {
	/// Corpus text file. Its index is cached next to it as `.bin`.
	#[arg(long)]
	corpus: PathBuf,

	/// Embedding vectors, text format or `.bin`.
	#[arg(long)]
	embedding: PathBuf,

	/// Common words, one per line, most frequent first.
	#[arg(long = "common-words")]
	common_words: PathBuf,

	/// JSON generator parameters. Missing fields take their defaults.
	#[arg(long)]
	params: Option<PathBuf>,

	/// Words to generate per seed.
	#[arg(long, default_value_t = 200)]
	length: usize,

	/// Also log to this file.
	#[arg(long = "log-file")]
	log_file: Option<PathBuf>,

	/// Console verbosity: 0 info, 1 debug, 2 trace.
	#[arg(long = "console-level", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
	console_level: u8,

	/// Log file verbosity: 0 info, 1 debug, 2 trace.
	#[arg(long = "file-level", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=2))]
	file_level: u8,
}

/// Console and file sinks, each with its own threshold.
struct DualLogger {
	console: env_logger::Logger,
	file: Option<env_logger::Logger>,
}

impl Log for DualLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		self.console.enabled(metadata) || self.file.as_ref().is_some_and(|file| file.enabled(metadata))
	}

	fn log(&self, record: &Record) {
		self.console.log(record);
		if let Some(file) = &self.file {
			file.log(record);
		}
	}

	fn flush(&self) {
		self.console.flush();
		if let Some(file) = &self.file {
			file.flush();
		}
	}
}

fn level_filter(level: u8) -> LevelFilter {
	match level {
		0 => LevelFilter::Info,
		1 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	}
}

fn init_logger(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
	let console = env_logger::Builder::new().filter_level(level_filter(cli.console_level)).target(Target::Stderr).build();

	let file = match &cli.log_file {
		Some(path) => {
			let sink = File::create(path)?;
			Some(
				env_logger::Builder::new()
					.filter_level(level_filter(cli.file_level))
					.write_style(WriteStyle::Never)
					.target(Target::Pipe(Box::new(sink)))
					.build(),
			)
		}
		None => None,
	};

	let max_level = file.as_ref().map_or(console.filter(), |file| console.filter().max(file.filter()));
	log::set_boxed_logger(Box::new(DualLogger { console, file }))?;
	log::set_max_level(max_level);
	Ok(())
}

/// Parameters of the interactive entry point when no file is given.
fn tuned_params() -> GeneratorParams {
	GeneratorParams {
		window: 7,
		verify: 2,
		of_translates: 200,
		of_matches: 70,
		of_originals_near_next_word: 1,
		commas_per_sentence: 1,
		words_per_comma_or_period: [4, 4],
		common_word_coefficient: [0.000001, 40.0, 0.00001],
		contextual_coefficient: [0.2, 1.0, 2.3],
		pick_from_translates_bucket: 2,
		..GeneratorParams::default()
	}
}

fn load_params(path: Option<&Path>) -> Result<GeneratorParams, Box<dyn std::error::Error>> {
	let params = match path {
		Some(path) => serde_json::from_reader(io::BufReader::new(File::open(path)?))?,
		None => tuned_params(),
	};
	params.validate()?;
	Ok(params)
}

/// Binary cache sitting next to `path`: `corpus.txt` caches to `corpus.txt.bin`.
fn cache_path(path: &Path) -> PathBuf {
	let mut name = path.as_os_str().to_owned();
	name.push(".bin");
	PathBuf::from(name)
}

/// Loads the corpus index from its `.bin` cache, or builds and caches it.
fn load_corpus(path: &Path, scan_window: usize) -> Result<CorpusIndex, Box<dyn std::error::Error>> {
	let cache_path = cache_path(path);
	if cache_path.exists() {
		log::info!("Loading corpus index from {}", cache_path.display());
		let index = CorpusIndex::load_from_file(&cache_path)?;
		let width = index.records().first().map_or(scan_window, |record| record.split(' ').count());
		if width == scan_window {
			return Ok(index);
		}
		log::warn!("Cached corpus index holds {width}-word records, rebuilding with {scan_window}");
	}

	log::info!("Building corpus index from {} (window {scan_window})", path.display());
	let index = CorpusIndex::build(path, scan_window)?;
	if let Err(e) = index.save_to_file(&cache_path) {
		log::warn!("Could not cache corpus index: {e}");
	}
	Ok(index)
}

/// Loads embeddings from `.bin`, or parses the text file and caches it.
fn load_embedding(path: &Path, cache_min_count: usize) -> Result<EmbeddingEngine, Box<dyn std::error::Error>> {
	if path.extension().is_some_and(|ext| ext == "bin") {
		return Ok(EmbeddingEngine::load_from_bin_file(path, cache_min_count)?);
	}

	let cache_path = cache_path(path);
	if cache_path.exists() {
		log::info!("Loading embeddings from {}", cache_path.display());
		return Ok(EmbeddingEngine::load_from_bin_file(&cache_path, cache_min_count)?);
	}

	log::info!("Parsing embeddings from {}", path.display());
	let engine = EmbeddingEngine::load_from_text_file(path, cache_min_count)?;
	if let Err(e) = engine.save_to_bin_file(&cache_path) {
		log::warn!("Could not cache embeddings: {e}");
	}
	Ok(engine)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let cli = Cli::parse();
	init_logger(&cli)?;

	let params = load_params(cli.params.as_deref())?;
	let corpus = load_corpus(&cli.corpus, params.scan_window())?;
	log::info!("Corpus index: {} records", corpus.len());
	let mut embedding = load_embedding(&cli.embedding, params.cache_min_count())?;
	log::info!("Embeddings: {} words x {} planes", embedding.len(), embedding.planes());

	let mut generator = TextGenerator::new(params, &mut embedding, &corpus, &cli.common_words)?;

	run_seeds(&mut generator, io::stdin().lock(), io::stdout(), cli.length)?;
	Ok(())
}

/// Reads seeds line by line until end of input and prints each generated sentence.
///
/// Blank lines are skipped.
fn run_seeds<R: BufRead, W: Write>(
	generator: &mut TextGenerator<'_>,
	mut input: R,
	mut output: W,
	length: usize,
) -> io::Result<()> {
	loop {
		write!(output, "seed> ")?;
		output.flush()?;

		let mut line = String::new();
		if input.read_line(&mut line)? == 0 {
			return Ok(());
		}
		let seed = line.trim();
		if seed.is_empty() {
			continue;
		}

		let report = generator.morph_seed(seed, length);
		writeln!(output, "{}", report.sentence())?;
		if report.stopped_early {
			writeln!(output, "(stopped after {} words)", report.predicted)?;
		}
		writeln!(
			output,
			"embedding {:.3} s, index {:.3} s, total {:.3} s",
			report.timings.embedding.as_secs_f64(),
			report.timings.index.as_secs_f64(),
			report.total_time.as_secs_f64()
		)?;
	}
}
