// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Content fingerprints of resolved segments and programs.
//!
//! A fingerprint is the SHA-1 digest of a canonical serialization. Floats are
//! serialized through their normalized bit patterns, so `0.0` and `-0.0`
//! produce the same fingerprint while any other change of value does not.
//! Equal fingerprints are taken as proof that the hardware content is equal;
//! this is what makes skipping an upload sound.
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Length of the abbreviated hex form used in logs.
    const SHORT_LEN: usize = 7;

    /// Fingerprint of the canonical JSON serialization of `value`.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        let serialized = serde_json::to_vec(value)
            .expect("Internal error: Fingerprint serialization of plain data failed");
        let mut hasher = FingerprintHasher::new();
        hasher.update(&serialized);
        hasher.finish()
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Abbreviated hex form, for log messages.
    pub fn short(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(Self::SHORT_LEN);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Incremental fingerprint over raw byte chunks, used for hash-of-hashes.
pub(crate) struct FingerprintHasher(Sha1);

impl FingerprintHasher {
    pub(crate) fn new() -> Self {
        Self(Sha1::new())
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub(crate) fn finish(self) -> Fingerprint {
        let digest = self.0.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        Fingerprint(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::of(&("tone", 1.0e6, 42u32));
        let b = Fingerprint::of(&("tone", 1.0e6, 42u32));
        assert_eq!(a, b);
        assert_ne!(a, Fingerprint::of(&("tone", 1.0e6, 43u32)));
    }

    #[test]
    fn test_display() {
        // SHA-1 of `null`
        let fp = Fingerprint::of(&());
        assert_eq!(fp.to_string(), "2be88ca4242c76e8253ac62474851065032d6833");
        assert_eq!(fp.short(), "2be88ca");
        assert_eq!(format!("{fp:?}"), "Fingerprint(2be88ca)");
    }
}
