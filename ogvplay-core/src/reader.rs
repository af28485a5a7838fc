//! Chunk Reader
//!
//! Pulls raw container bytes from any `Read` source on demand. The demuxer
//! never reads on its own; the control loop calls [`ChunkReader::read`] when
//! the intake buffer runs dry.

use std::io::{self, ErrorKind, Read};

use bytes::Bytes;

/// Default chunk size handed to the demuxer per read.
pub const BUFFER_SIZE: usize = 4096;

pub struct ChunkReader<R: Read> {
    source: R,
    buf: Vec<u8>,
    total_read: u64,
    exhausted: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, BUFFER_SIZE)
    }

    pub fn with_buffer_size(source: R, buffer_size: usize) -> Self {
        Self {
            source,
            buf: vec![0u8; buffer_size.max(1)],
            total_read: 0,
            exhausted: false,
        }
    }

    /// Read up to one buffer of bytes. An empty chunk means end of source.
    ///
    /// `Interrupted` is retried; any other I/O error is returned to the caller,
    /// which treats it as fatal.
    pub fn read(&mut self) -> io::Result<Bytes> {
        if self.exhausted {
            return Ok(Bytes::new());
        }

        let n = loop {
            match self.source.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if n == 0 {
            self.exhausted = true;
            tracing::debug!("Source exhausted after {} bytes", self.total_read);
            return Ok(Bytes::new());
        }

        self.total_read += n as u64;
        Ok(Bytes::copy_from_slice(&self.buf[..n]))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn total_read(&self) -> u64 {
        self.total_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FlakySource {
        data: Cursor<Vec<u8>>,
        interrupts: u32,
    }

    impl Read for FlakySource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(io::Error::new(ErrorKind::Interrupted, "signal"));
            }
            self.data.read(buf)
        }
    }

    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_reads_in_bounded_chunks() {
        let mut reader = ChunkReader::with_buffer_size(Cursor::new(vec![7u8; 10]), 4);
        assert_eq!(reader.read().unwrap().len(), 4);
        assert_eq!(reader.read().unwrap().len(), 4);
        assert_eq!(reader.read().unwrap().len(), 2);
        assert!(reader.read().unwrap().is_empty());
        assert!(reader.is_exhausted());
        assert_eq!(reader.total_read(), 10);
        // Stays empty once exhausted
        assert!(reader.read().unwrap().is_empty());
    }

    #[test]
    fn test_interrupted_is_retried() {
        let source = FlakySource {
            data: Cursor::new(b"OggS".to_vec()),
            interrupts: 3,
        };
        let mut reader = ChunkReader::new(source);
        assert_eq!(&reader.read().unwrap()[..], b"OggS");
    }

    #[test]
    fn test_hard_error_propagates() {
        let mut reader = ChunkReader::new(BrokenSource);
        let err = reader.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}
