// Offline Media Core - offline media downloads for mobile playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Streaming SHA-256 verification

use crate::error::{OfflineError, Result};
use sha2::{Digest, Sha256};

/// Incremental digest fed with every byte written to the target file
#[derive(Debug, Clone, Default)]
pub struct ChecksumVerifier {
    hasher: Sha256,
    bytes: u64,
}

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes hashed so far
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finish and compare against `expected` (hex, case-insensitive)
    ///
    /// Returns the computed digest on success.
    pub fn verify(self, expected: &str) -> Result<String> {
        let actual = self.finalize_hex();
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(actual)
        } else {
            Err(OfflineError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut verifier = ChecksumVerifier::new();
        verifier.update(b"a");
        verifier.update(b"");
        verifier.update(b"bc");
        assert_eq!(verifier.bytes_hashed(), 3);
        assert_eq!(verifier.finalize_hex(), ABC_SHA256);
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let mut verifier = ChecksumVerifier::new();
        verifier.update(b"abc");
        let digest = verifier.verify(&ABC_SHA256.to_uppercase()).unwrap();
        assert_eq!(digest, ABC_SHA256);
    }

    #[test]
    fn test_verify_mismatch() {
        let mut verifier = ChecksumVerifier::new();
        verifier.update(b"abc");
        match verifier.verify("deadbeef") {
            Err(OfflineError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, ABC_SHA256);
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            ChecksumVerifier::new().finalize_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
