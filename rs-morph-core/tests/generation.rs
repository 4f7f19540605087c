use std::collections::HashSet;
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

use rs_morph_core::model::corpus_index::CorpusIndex;
use rs_morph_core::model::embedding::EmbeddingEngine;
use rs_morph_core::model::generator::TextGenerator;
use rs_morph_core::model::params::GeneratorParams;

const CORPUS: &str = "the cat sat on the mat. the dog sat on the rug. \
	the cat ran to the dog, then the dog ran to the mat. \
	a cat slept on the rug. the dog slept on the mat.\n";
const VECTORS: &str = "cat 1 0 0\ndog 0.9 0.1 0\nmat 0 1 0.1\nrug 0.1 0.9 0.1\nsat 0 0.1 1\nslept 0.1 0 0.9\n";
const COMMON: &str = "the\non\nto\na\ncat\ndog\n";

struct Fixture {
	_dir: TempDir,
	corpus: CorpusIndex,
	embedding: EmbeddingEngine,
	common: std::path::PathBuf,
}

fn fixture(params: &GeneratorParams) -> Fixture {
	let dir = tempdir().unwrap();
	let write = |name: &str, contents: &str| {
		let path = dir.path().join(name);
		fs::write(&path, contents).unwrap();
		path
	};
	let corpus_path = write("corpus.txt", CORPUS);
	let vectors_path = write("vectors.txt", VECTORS);
	let common = write("common.txt", COMMON);

	let corpus = CorpusIndex::build(&corpus_path, params.scan_window()).unwrap();
	let embedding = EmbeddingEngine::load_from_text_file(&vectors_path, params.cache_min_count()).unwrap();
	Fixture { _dir: dir, corpus, embedding, common }
}

fn params() -> GeneratorParams {
	GeneratorParams { window: 3, of_matches: 5, rng_seed: Some(42), ..GeneratorParams::default() }
}

fn vocabulary(text: &str) -> HashSet<String> {
	text.split_whitespace().map(|w| w.trim_end_matches([',', '.']).to_lowercase()).collect()
}

fn morph(params: GeneratorParams, seed: &str, length: usize, common: &Path, fixture: &mut Fixture) -> Vec<String> {
	let mut generator = TextGenerator::new(params, &mut fixture.embedding, &fixture.corpus, common).unwrap();
	generator.morph_seed(seed, length).words
}

#[test]
fn generated_words_come_from_the_corpus() {
	let params = params();
	let mut fixture = fixture(&params);
	let common = fixture.common.clone();
	let vocabulary = vocabulary(CORPUS);

	let words = morph(params, "The cat", 12, &common, &mut fixture);
	assert_eq!(&words[..2], &["The".to_owned(), "cat".to_owned()]);
	assert!(words.len() > 2);
	for word in &words[2..] {
		let stem = word.trim_end_matches([',', '.']).to_lowercase();
		assert!(vocabulary.contains(&stem), "{word} is not a corpus word");
	}
}

#[test]
fn first_prediction_follows_the_seed_context() {
	let params = params();
	let mut fixture = fixture(&params);
	let common = fixture.common.clone();

	let words = morph(params, "the cat", 1, &common, &mut fixture);
	assert_eq!(words.len(), 3);
	let next = words[2].trim_end_matches([',', '.']);
	assert!(fixture.corpus.contains(&format!("cat {next} ")), "\"cat {next}\" never occurs");
}

#[test]
fn fixed_seed_is_reproducible() {
	let params = params();
	let mut first = fixture(&params);
	let mut second = fixture(&params);
	let (first_common, second_common) = (first.common.clone(), second.common.clone());

	let a = morph(params.clone(), "the dog", 10, &first_common, &mut first);
	let b = morph(params, "the dog", 10, &second_common, &mut second);
	assert_eq!(a, b);
}

#[test]
fn boundaries_follow_the_comma_budget() {
	let params = GeneratorParams {
		commas_per_sentence: 1,
		words_per_comma_or_period: [2, 3],
		..params()
	};
	let mut fixture = fixture(&params);
	let common = fixture.common.clone();

	let words = morph(params, "the cat", 30, &common, &mut fixture);
	let mut commas = 0;
	for word in &words {
		if word.ends_with(',') {
			commas += 1;
		}
		assert!(commas <= 1, "two commas in one sentence: {}", words.join(" "));
		if word.ends_with('.') {
			commas = 0;
		}
	}
	for pair in words.windows(2) {
		if pair[0].ends_with('.') {
			assert!(pair[1].starts_with(char::is_uppercase), "{} after a period", pair[1]);
		}
	}
}

#[test]
fn unknown_seed_stops_without_error() {
	let params = params();
	let mut fixture = fixture(&params);
	let mut generator =
		TextGenerator::new(params, &mut fixture.embedding, &fixture.corpus, &fixture.common).unwrap();

	let report = generator.morph_seed("purple zebras", 5);
	assert!(report.stopped_early);
	assert_eq!(report.predicted, 0);
	assert_eq!(report.sentence(), "purple zebras");
}
