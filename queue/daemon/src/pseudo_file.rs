//! Repeated reads of pseudo-files
//!
//! Proc files keep their identity while their content changes between reads,
//! so a [`PseudoFileReader`] opens its file once, rewinds it on every pass and
//! reads into a buffer allocated at construction.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

/// Receives the raw bytes of one pass over a pseudo-file
pub trait DataHandler {
    /// Called once per filled chunk, in file order
    fn handle_data(&mut self, data: &[u8]);

    /// Called after the last chunk of a successful pass
    fn no_further_data(&mut self) {}
}

/// Reader for a fixed-identity pseudo-file
pub struct PseudoFileReader {
    path: PathBuf,
    file: Option<File>,
    buffer: Box<[u8]>,
}

impl PseudoFileReader {
    /// Create a reader for `path` with a read buffer of `capacity` bytes
    ///
    /// The file is not opened until the first [`run`](Self::run).
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            file: None,
            buffer: vec![0; capacity.max(1)].into_boxed_slice(),
        }
    }

    /// Path of the pseudo-file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file from offset zero, handing each chunk to `handler`
    ///
    /// A chunk may end mid-line. On failure the handle is dropped so the next
    /// pass reopens the file.
    pub fn run<H: DataHandler + ?Sized>(&mut self, handler: &mut H) -> io::Result<()> {
        let result = self.read_pass(handler);
        if result.is_err() {
            self.file = None;
        }
        result
    }

    fn read_pass<H: DataHandler + ?Sized>(&mut self, handler: &mut H) -> io::Result<()> {
        let file = match self.file.take() {
            Some(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                file
            }
            None => File::open(&self.path)?,
        };
        let file = self.file.insert(file);

        loop {
            let read = match file.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            handler.handle_data(&self.buffer[..read]);
        }

        handler.no_further_data();
        Ok(())
    }
}

/// Reassembles whole lines from chunked data
///
/// A line split across chunks is carried in a caller-owned buffer whose
/// capacity survives between passes. The trailing newline is not included.
pub struct LineSplitter<'a, F> {
    carry: &'a mut Vec<u8>,
    on_line: F,
}

impl<'a, F: FnMut(&[u8])> LineSplitter<'a, F> {
    pub fn new(carry: &'a mut Vec<u8>, on_line: F) -> Self {
        carry.clear();
        Self { carry, on_line }
    }
}

impl<F: FnMut(&[u8])> DataHandler for LineSplitter<'_, F> {
    fn handle_data(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let line = &rest[..newline];
            if self.carry.is_empty() {
                (self.on_line)(line);
            } else {
                self.carry.extend_from_slice(line);
                (self.on_line)(self.carry.as_slice());
                self.carry.clear();
            }
            rest = &rest[newline + 1..];
        }
        self.carry.extend_from_slice(rest);
    }

    fn no_further_data(&mut self) {
        if !self.carry.is_empty() {
            (self.on_line)(self.carry.as_slice());
            self.carry.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct Capture {
        bytes: Vec<u8>,
        chunks: usize,
        largest_chunk: usize,
        finished: bool,
    }

    impl DataHandler for Capture {
        fn handle_data(&mut self, data: &[u8]) {
            self.bytes.extend_from_slice(data);
            self.chunks += 1;
            self.largest_chunk = self.largest_chunk.max(data.len());
        }

        fn no_further_data(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn test_rereads_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udp");
        fs::write(&path, "a considerably longer first version\n").unwrap();

        let mut reader = PseudoFileReader::new(&path, 4096);

        let mut first = Capture::default();
        reader.run(&mut first).unwrap();
        assert_eq!(first.bytes, b"a considerably longer first version\n");
        assert!(first.finished);

        fs::write(&path, "short\n").unwrap();

        let mut second = Capture::default();
        reader.run(&mut second).unwrap();
        assert_eq!(second.bytes, b"short\n");
    }

    #[test]
    fn test_small_buffer_delivers_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("softnet_stat");
        fs::write(&path, "0123456789abcdef").unwrap();

        let mut reader = PseudoFileReader::new(&path, 4);
        let mut capture = Capture::default();
        reader.run(&mut capture).unwrap();

        assert_eq!(capture.bytes, b"0123456789abcdef");
        assert_eq!(capture.largest_chunk, 4);
        assert!(capture.chunks >= 4);
    }

    #[test]
    fn test_missing_file_fails_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late");

        let mut reader = PseudoFileReader::new(&path, 64);
        let mut capture = Capture::default();
        assert!(reader.run(&mut capture).is_err());
        assert!(!capture.finished);

        fs::write(&path, "now present").unwrap();
        let mut capture = Capture::default();
        reader.run(&mut capture).unwrap();
        assert_eq!(capture.bytes, b"now present");
    }

    #[test]
    fn test_line_splitter_joins_split_rows() {
        let mut carry = Vec::new();
        let mut lines: Vec<String> = Vec::new();
        {
            let mut splitter = LineSplitter::new(&mut carry, |line: &[u8]| {
                lines.push(String::from_utf8_lossy(line).into_owned())
            });
            splitter.handle_data(b"first row\nsec");
            splitter.handle_data(b"ond ");
            splitter.handle_data(b"row\nthird");
            splitter.no_further_data();
        }

        assert_eq!(lines, vec!["first row", "second row", "third"]);
        assert!(carry.is_empty());
    }

    #[test]
    fn test_line_splitter_discards_stale_carry() {
        let mut carry = b"left over from a failed pass".to_vec();
        let mut lines = 0;
        {
            let mut splitter = LineSplitter::new(&mut carry, |_: &[u8]| lines += 1);
            splitter.handle_data(b"row\n");
            splitter.no_further_data();
        }

        assert_eq!(lines, 1);
    }
}
