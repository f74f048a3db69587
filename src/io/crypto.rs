use crate::error::Result;
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

/// Passes bytes through to `inner` and hashes everything written.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes `inner` and returns it with the hex digest.
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut sink = HashingWriter::new(io::sink());
    io::copy(&mut File::open(path)?, &mut sink)?;
    let (_, digest) = sink.finish()?;
    Ok(digest)
}

pub fn digest_matches(got: &str, expected_hex: &str) -> bool {
    got.eq_ignore_ascii_case(expected_hex)
}

/// `Ok(false)` for a missing file, so callers can treat it as "download".
pub fn verify_sha256(path: &Path, expected_hex: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    Ok(digest_matches(&sha256_file(path)?, expected_hex))
}
