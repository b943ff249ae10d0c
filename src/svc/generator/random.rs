//! # Random module
//!
//! This module provide sources of random bytes used to generate key material.
//! A source could be shared between concurrent reconciliations, so each
//! implementation serializes its own accesses.

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, ErrorKind, Read},
    sync::Mutex,
};

use rand::{rngs::StdRng, RngCore, SeedableRng};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("random source exhausted, read {read} bytes out of {requested}")]
    Exhausted { read: usize, requested: usize },
    #[error("failed to draw bytes from random number generator, {0}")]
    Source(rand::Error),
    #[error("failed to read bytes from random source, {0}")]
    Io(io::Error),
    #[error("random source lock is poisoned")]
    Poisoned,
}

// -----------------------------------------------------------------------------
// RandomSource trait

/// provides random bytes, implementations must be safe to call from several
/// tasks at once
pub trait RandomSource: Send + Sync {
    /// fill the whole buffer or fail, no partial read is considered a success
    fn read(&self, buf: &mut [u8]) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// SystemRandom structure

/// cryptographically secure source seeded from the operating system
pub struct SystemRandom {
    rng: Mutex<StdRng>,
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Debug for SystemRandom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRandom").finish_non_exhaustive()
    }
}

impl RandomSource for SystemRandom {
    fn read(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut rng = self.rng.lock().map_err(|_| Error::Poisoned)?;

        rng.try_fill_bytes(buf).map_err(Error::Source)
    }
}

// -----------------------------------------------------------------------------
// ReaderSource structure

/// deterministic source reading from the wrapped reader, the position is kept
/// between calls
pub struct ReaderSource<R> {
    reader: Mutex<R>,
}

impl<R> ReaderSource<R>
where
    R: Read + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl<R> Debug for ReaderSource<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSource").finish_non_exhaustive()
    }
}

impl<R> RandomSource for ReaderSource<R>
where
    R: Read + Send,
{
    fn read(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut reader = self.reader.lock().map_err(|_| Error::Poisoned)?;
        let requested = buf.len();
        let mut read = 0;

        while read < requested {
            match reader.read(&mut buf[read..]) {
                Ok(0) => return Err(Error::Exhausted { read, requested }),
                Ok(n) => read += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(Error::Io(err)),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reader_source_yields_the_stream_in_order() {
        let source = ReaderSource::new(Cursor::new(b"0123456789abcdef".to_vec()));

        let mut first = [0u8; 10];
        source.read(&mut first).expect("10 bytes to be available");
        assert_eq!(&first, b"0123456789");

        let mut second = [0u8; 6];
        source.read(&mut second).expect("6 bytes to be available");
        assert_eq!(&second, b"abcdef");
    }

    #[test]
    fn reader_source_reports_exhaustion() {
        let source = ReaderSource::new(&b"short"[..]);
        let mut buf = [0u8; 32];

        match source.read(&mut buf) {
            Err(Error::Exhausted { read, requested }) => {
                assert_eq!(read, 5);
                assert_eq!(requested, 32);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn empty_buffer_is_always_satisfied() {
        let source = ReaderSource::new(io::empty());

        assert!(source.read(&mut []).is_ok());
    }

    #[test]
    fn system_random_fills_buffers() {
        let source = SystemRandom::default();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        source.read(&mut a).expect("system random to never be exhausted");
        source.read(&mut b).expect("system random to never be exhausted");
        assert_ne!(a, b);
    }
}
