//! Content identifiers for canonical record bytes.
//!
//! A [`Cid`] is a CIDv1 over the raw codec with a SHA-256 multihash,
//! rendered in lowercase base32 (multibase prefix `b`). The text form is
//! always 59 characters: one multibase prefix plus 58 base32 characters
//! covering the 36-byte binary form.
//!
//! CIDs are never cached inside records; they are recomputed from canonical
//! bytes so that deserialized records keep the determinism guarantee.

use base32::Alphabet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical;
use crate::error::{Error, Result};
use crate::record::Record;

/// CIDv1 version byte.
const CID_VERSION: u8 = 0x01;
/// Multicodec code for raw binary content.
const CODEC_RAW: u8 = 0x55;
/// Multihash code for SHA2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;
/// SHA-256 digest length in bytes.
const SHA2_256_LEN: u8 = 0x20;
/// Multibase prefix for lowercase base32 (RFC 4648, no padding).
const MULTIBASE_BASE32_LOWER: char = 'b';

/// Length of the binary CID: version + codec + multihash header + digest.
const BINARY_LEN: usize = 2 + 2 + 32;
/// Length of the text form: multibase prefix + base32 of the binary form.
pub const TEXT_LEN: usize = 59;

/// A validated content identifier.
///
/// Compares and hashes as its text form. Construct via
/// [`Cid::from_canonical_bytes`], [`Cid::for_record`] or [`Cid::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    /// Computes the CID of a canonical byte string.
    #[must_use]
    pub fn from_canonical_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);

        let mut binary = Vec::with_capacity(BINARY_LEN);
        binary.push(CID_VERSION);
        binary.push(CODEC_RAW);
        binary.push(MULTIHASH_SHA2_256);
        binary.push(SHA2_256_LEN);
        binary.extend_from_slice(&digest);

        let encoded =
            base32::encode(Alphabet::Rfc4648Lower { padding: false }, &binary);
        Self(format!("{MULTIBASE_BASE32_LOWER}{encoded}"))
    }

    /// Computes the CID of a record by canonicalizing it first.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures ([`Error::InvalidRecord`]).
    pub fn for_record(record: &Record) -> Result<Self> {
        let bytes = canonical::canonical(record)?;
        Ok(Self::from_canonical_bytes(&bytes))
    }

    /// Parses and validates a CID text form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the string is not a
    /// base32-lowercase CIDv1 with a SHA-256 multihash.
    pub fn parse(s: &str) -> Result<Self> {
        let binary = Self::decode_binary(s)?;
        debug_assert_eq!(binary.len(), BINARY_LEN);
        Ok(Self(s.to_string()))
    }

    /// Returns the text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the raw SHA-256 digest carried in the multihash payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the stored text form fails to
    /// decode (only possible for refs received off the wire).
    pub fn sha256_digest(&self) -> Result<[u8; 32]> {
        let binary = Self::decode_binary(&self.0)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&binary[4..]);
        Ok(digest)
    }

    /// Maps the CID onto its OCI digest form, `sha256:<hex>`.
    ///
    /// The discovery-tag strategy guarantees the CID itself is also applied
    /// as a tag, so either the digest or the CID tag resolves the manifest.
    ///
    /// # Errors
    ///
    /// Propagates [`Cid::sha256_digest`] failures.
    pub fn to_oci_digest(&self) -> Result<String> {
        let digest = self.sha256_digest()?;
        Ok(format!("sha256:{}", hex::encode(digest)))
    }

    fn decode_binary(s: &str) -> Result<Vec<u8>> {
        if s.len() != TEXT_LEN {
            return Err(Error::InvalidRequest(format!(
                "CID must be {TEXT_LEN} characters, got {}",
                s.len()
            )));
        }
        let Some(rest) = s.strip_prefix(MULTIBASE_BASE32_LOWER) else {
            return Err(Error::InvalidRequest(format!(
                "CID must use the base32-lowercase multibase prefix, got {s:.8}..."
            )));
        };
        let binary = base32::decode(Alphabet::Rfc4648Lower { padding: false }, rest)
            .ok_or_else(|| Error::InvalidRequest("CID is not valid base32".to_string()))?;
        if binary.len() != BINARY_LEN {
            return Err(Error::InvalidRequest(format!(
                "CID payload must be {BINARY_LEN} bytes, got {}",
                binary.len()
            )));
        }
        if binary[0] != CID_VERSION || binary[1] != CODEC_RAW {
            return Err(Error::InvalidRequest(
                "CID must be CIDv1 over the raw codec".to_string(),
            ));
        }
        if binary[2] != MULTIHASH_SHA2_256 || binary[3] != SHA2_256_LEN {
            return Err(Error::InvalidRequest(
                "CID must carry a SHA-256 multihash".to_string(),
            ));
        }
        Ok(binary)
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
