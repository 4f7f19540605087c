use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MorphError>;

/// Failures surfaced by the loaders, builders and the generator.
///
/// Prediction failure is not part of this enum: a step that cannot predict
/// a word returns `None` and the generation loop stops early.
#[derive(Error, Debug)]
pub enum MorphError {
	#[error("IO error on \"{}\": {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Format error: {0}")]
	Format(String),

	#[error("Vector table shape error: {0}")]
	Shape(#[from] ndarray::ShapeError),

	#[error("Word rank cache error: {0}")]
	Cache(#[from] postcard::Error),

	#[error("Invalid parameters: {0}")]
	InvalidParams(String),
}

impl MorphError {
	/// Wraps an I/O error with the path it happened on.
	pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}
}
