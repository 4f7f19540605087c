use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Size of the scoped buffer used when reading NUL-terminated strings.
pub(crate) const READ_BUFFER_SIZE: usize = 65536;

/// Reads the lines of a text file, without their line terminators.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn read_lines<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut reader = BufReader::new(File::open(filename)?);
	let mut lines = Vec::new();
	let mut line = Vec::new();
	while reader.read_until(b'\n', &mut line)? > 0 {
		let text = String::from_utf8_lossy(&line);
		lines.push(text.trim_end_matches(['\n', '\r']).to_owned());
		line.clear();
	}
	Ok(lines)
}

/// Binary cache path kept next to a source file.
///
/// The extension is appended, never swapped, so a cache can not shadow its
/// source: `data/common.txt` → `data/common.txt.bin`.
pub(crate) fn cache_path<P: AsRef<Path>>(source: P) -> PathBuf {
	let mut name = source.as_ref().as_os_str().to_owned();
	name.push(".bin");
	PathBuf::from(name)
}

/// Fixed-size buffer extracting NUL-terminated strings from a binary stream.
///
/// The buffer is refilled in place: unread bytes are moved to the front and
/// the free tail is filled from the stream. A string longer than the buffer
/// can never be extracted and stops the refill loop.
pub(crate) struct NulReader {
	buffer: Vec<u8>,
	begin: usize,
	end: usize,
}

impl NulReader {
	pub(crate) fn new(size: usize) -> Self {
		Self { buffer: vec![0; size], begin: 0, end: 0 }
	}

	/// Compacts pending bytes and reads more data from `reader`.
	///
	/// Returns `Ok(false)` when the stream is exhausted or the buffer is full
	/// of a single unterminated string.
	pub(crate) fn refill<R: Read>(&mut self, reader: &mut R) -> io::Result<bool> {
		self.buffer.copy_within(self.begin..self.end, 0);
		self.end -= self.begin;
		self.begin = 0;
		if self.end == self.buffer.len() {
			return Ok(false);
		}

		let read = loop {
			match reader.read(&mut self.buffer[self.end..]) {
				Ok(n) => break n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e),
			}
		};
		if read == 0 {
			return Ok(false);
		}
		self.end += read;
		Ok(true)
	}

	/// Extracts the next complete string, or `None` if no NUL is buffered.
	pub(crate) fn next_string(&mut self) -> Option<String> {
		let data = &self.buffer[self.begin..self.end];
		let nul = data.iter().position(|&b| b == 0)?;
		let s = String::from_utf8_lossy(&data[..nul]).into_owned();
		self.begin += nul + 1;
		Some(s)
	}

	/// Number of buffered bytes not yet returned as a string.
	pub(crate) fn pending(&self) -> usize {
		self.end - self.begin
	}
}

/// Reads NUL-terminated strings until the stream ends.
///
/// Trailing bytes without a terminating NUL are dropped with a warning.
pub(crate) fn read_nul_strings<R: Read>(reader: &mut R, capacity: usize) -> io::Result<Vec<String>> {
	let mut strings = Vec::with_capacity(capacity);
	let mut nul_reader = NulReader::new(READ_BUFFER_SIZE);
	while nul_reader.refill(reader)? {
		while let Some(s) = nul_reader.next_string() {
			strings.push(s);
		}
	}
	if nul_reader.pending() > 0 {
		log::warn!("Dropping {} trailing bytes without NUL terminator", nul_reader.pending());
	}
	Ok(strings)
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Reader handing out at most `step` bytes per call.
	struct Trickle<'a> {
		data: &'a [u8],
		step: usize,
	}

	impl Read for Trickle<'_> {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let n = self.step.min(buf.len()).min(self.data.len());
			buf[..n].copy_from_slice(&self.data[..n]);
			self.data = &self.data[n..];
			Ok(n)
		}
	}

	#[test]
	fn strings_split_across_refills_are_reassembled() {
		let mut source = Trickle { data: b"the cat\0cat sat.\0sat. the\0", step: 3 };
		let mut reader = NulReader::new(16);
		let mut out = Vec::new();
		while reader.refill(&mut source).unwrap() {
			while let Some(s) = reader.next_string() {
				out.push(s);
			}
		}
		assert_eq!(out, vec!["the cat", "cat sat.", "sat. the"]);
		assert_eq!(reader.pending(), 0);
	}

	#[test]
	fn unterminated_tail_is_dropped() {
		let mut source: &[u8] = b"alpha\0beta";
		let strings = read_nul_strings(&mut source, 0).unwrap();
		assert_eq!(strings, vec!["alpha"]);
	}

	#[test]
	fn string_longer_than_buffer_stops_refill() {
		let mut source: &[u8] = b"abcdefgh\0";
		let mut reader = NulReader::new(4);
		assert!(reader.refill(&mut source).unwrap());
		assert_eq!(reader.next_string(), None);
		assert!(!reader.refill(&mut source).unwrap());
	}

	#[test]
	fn cache_path_appends_to_the_source_name() {
		assert_eq!(cache_path("data/common.txt"), PathBuf::from("data/common.txt.bin"));
		assert_eq!(cache_path("data/common.bin"), PathBuf::from("data/common.bin.bin"));
	}

	#[test]
	fn lines_lose_their_terminators() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("lines.txt");
		std::fs::write(&path, b"one\r\ntwo\n\nthr\xffee").unwrap();
		assert_eq!(read_lines(&path).unwrap(), vec!["one", "two", "", "thr\u{fffd}ee"]);
	}
}
