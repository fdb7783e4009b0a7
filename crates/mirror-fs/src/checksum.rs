//! Archive digests published in `dist`
//!
//! npm clients verify downloads with two values: the legacy `shasum`
//! (SHA-1, lowercase hex) and the SRI `integrity` string
//! (`sha512-<base64>`). Both are computed in a single pass over the file.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

/// Prefix of SRI strings produced by this module
const INTEGRITY_PREFIX: &str = "sha512-";

/// Content digests of one archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDigest {
    /// SHA-1 of the file, lowercase hex
    pub shasum: String,
    /// SHA-512 of the file as an SRI string
    pub integrity: String,
}

impl ArchiveDigest {
    /// Digest in-memory content.
    pub fn of_bytes(content: &[u8]) -> Self {
        let mut sha1 = Sha1::new();
        let mut sha512 = Sha512::new();
        sha1.update(content);
        sha512.update(content);
        Self::finish(sha1, sha512)
    }

    /// Digest a file's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read, including
    /// when it does not exist.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut sha1 = Sha1::new();
        let mut sha512 = Sha512::new();
        let mut buf = [0u8; 64 * 1024];

        loop {
            let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
            if n == 0 {
                break;
            }
            sha1.update(&buf[..n]);
            sha512.update(&buf[..n]);
        }

        Ok(Self::finish(sha1, sha512))
    }

    fn finish(sha1: Sha1, sha512: Sha512) -> Self {
        Self {
            shasum: format!("{:x}", sha1.finalize()),
            integrity: format!("{}{}", INTEGRITY_PREFIX, STANDARD.encode(sha512.finalize())),
        }
    }
}
