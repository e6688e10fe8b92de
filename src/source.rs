use std::fs::File;
use std::io::Read;
use std::path::Path;

use pcore::buf::read_chunk;

// Marker on the command line for reading the archive off stdin
pub const STDIN: &str = "-";

/// Hands out the input one buffer at a time, in order.
pub trait ByteSource {
    /// Next buffer of up to `max` bytes, only the last one may be short.
    /// `None` once the stream is exhausted, buffers are never empty.
    fn read_next(&mut self, max: usize) -> std::io::Result<Option<Vec<u8>>>;
}

pub struct ReadSource<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        ReadSource {
            inner: reader,
            done: false,
        }
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read_next(&mut self, max: usize) -> std::io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let chunk = read_chunk(&mut self.inner, max)?;
        if chunk.is_none() {
            self.done = true;
        }
        Ok(chunk)
    }
}

pub fn open(path: &str) -> std::io::Result<ReadSource<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if path == STDIN {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(File::open(Path::new(path))?)
    };
    Ok(ReadSource::new(reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn hands_out_parts_in_order() {
        let mut source = ReadSource::new(Cursor::new((0u8..10).collect::<Vec<u8>>()));

        assert_eq!(source.read_next(4).unwrap(), Some(vec![0, 1, 2, 3]));
        assert_eq!(source.read_next(4).unwrap(), Some(vec![4, 5, 6, 7]));
        assert_eq!(source.read_next(4).unwrap(), Some(vec![8, 9]));
        assert_eq!(source.read_next(4).unwrap(), None);
        assert_eq!(source.read_next(4).unwrap(), None);
    }

    #[test]
    fn open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Test Data").unwrap();
        file.flush().unwrap();

        let mut source = open(file.path().to_str().unwrap()).unwrap();
        assert_eq!(source.read_next(1024).unwrap(), Some(b"Test Data".to_vec()));
        assert_eq!(source.read_next(1024).unwrap(), None);
    }

    #[test]
    fn open_stdin() {
        // Only opened, reading would block on the test harness
        assert!(open(STDIN).is_ok());
    }

    #[test]
    fn open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        assert!(open(missing.to_str().unwrap()).is_err());
    }
}
