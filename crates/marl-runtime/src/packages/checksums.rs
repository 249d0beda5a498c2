//! Checksums for package integrity verification

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, EvalResult};

/// SHA-256 checksum set, hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksums {
    pub sha256: String,
}

impl Checksums {
    pub fn new(sha256: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
        }
    }

    /// Parse the `sha256:<hex>` form used in URI suffixes
    pub fn parse(s: &str) -> EvalResult<Self> {
        match s.strip_prefix("sha256:") {
            Some(hash) => Ok(Self::new(hash)),
            None => Err(ErrorKind::InvalidPackageUri(format!(
                "bad checksum `{}`, expected sha256:<hex>",
                s
            ))
            .into()),
        }
    }

    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::new(hex::encode(hasher.finalize()))
    }

    /// Compare against the checksum of `data`; a mismatch is a hard
    /// integrity error naming both digests.
    pub fn verify(&self, uri: &str, data: &[u8]) -> EvalResult<()> {
        let computed = Self::compute(data);
        if self.sha256 != computed.sha256 {
            return Err(ErrorKind::Integrity {
                uri: uri.to_string(),
                expected: self.sha256.clone(),
                actual: computed.sha256,
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Checksums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.sha256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let sums = Checksums::compute(b"hello world");
        assert_eq!(
            sums.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn verify_reports_both_digests() {
        let sums = Checksums::new("0000");
        let err = sums.verify("package://e.com/p@1.0.0", b"data").unwrap_err();
        match err.kind {
            ErrorKind::Integrity {
                expected, actual, ..
            } => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, Checksums::compute(b"data").sha256);
            }
            other => panic!("unexpected error kind: {:?}", other),
        }
    }
}
