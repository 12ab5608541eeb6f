//! Execution signatures
//!
//! Provides [`ExecutionSignature`], the opaque token binding an envelope to the
//! context that produced it, and [`SignatureGenerator`], the only place such
//! tokens are minted.
//!
//! A signature is an audit/correlation token, not a credential: it is unique
//! per call because the creation instant is part of the hashed material, but it
//! is not collision-free across processes.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};

/// Number of hex characters kept from the SHA-256 digest
pub const SIGNATURE_HEX_LEN: usize = 32;

/// Separator between the hashed components
const DELIMITER: char = ':';

/// Opaque execution signature (32 lowercase hex characters when generated)
///
/// There is no public constructor. Signatures come from
/// [`SignatureGenerator`] or from an envelope that passed
/// [`Envelope::validate`](crate::Envelope::validate).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionSignature(String);

impl ExecutionSignature {
    /// Wrap a signature read back from a validated envelope
    #[inline]
    pub(crate) fn from_validated(value: String) -> Self {
        Self(value)
    }

    /// Borrow the signature text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the signature text
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for ExecutionSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExecutionSignature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ExecutionSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Mints execution signatures
///
/// `sha256("{agent_id}:{blueprint_id}:{schema_version}:{instant}")`, truncated
/// to [`SIGNATURE_HEX_LEN`] hex characters. The instant is rendered as
/// RFC 3339 with nanosecond precision, so distinct instants never share
/// hashed material.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureGenerator;

impl SignatureGenerator {
    /// Sign with the current wall-clock instant
    #[must_use]
    pub fn sign(agent_id: &str, blueprint_id: &str, schema_version: &str) -> ExecutionSignature {
        Self::sign_at(agent_id, blueprint_id, schema_version, Utc::now())
    }

    /// Sign with an explicit instant
    ///
    /// Identical inputs at the same instant always produce the same signature.
    #[must_use]
    pub fn sign_at(
        agent_id: &str,
        blueprint_id: &str,
        schema_version: &str,
        instant: DateTime<Utc>,
    ) -> ExecutionSignature {
        let material = format!(
            "{agent_id}{DELIMITER}{blueprint_id}{DELIMITER}{schema_version}{DELIMITER}{}",
            instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let digest = Sha256::digest(material.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(SIGNATURE_HEX_LEN);
        ExecutionSignature(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
            + chrono::Duration::nanoseconds(i64::from(nanos))
    }

    #[test]
    fn signature_is_32_lowercase_hex() {
        let sig = SignatureGenerator::sign("system", "default", "1.0.0");
        assert_eq!(sig.as_str().len(), SIGNATURE_HEX_LEN);
        assert!(sig
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn same_inputs_same_instant_match() {
        let a = SignatureGenerator::sign_at("rtrvr", "search", "1.0.0", instant(0));
        let b = SignatureGenerator::sign_at("rtrvr", "search", "1.0.0", instant(0));
        assert_eq!(a, b);
    }

    #[test]
    fn nanosecond_apart_differs() {
        let a = SignatureGenerator::sign_at("rtrvr", "search", "1.0.0", instant(0));
        let b = SignatureGenerator::sign_at("rtrvr", "search", "1.0.0", instant(1));
        assert_ne!(a, b);
    }

    #[test]
    fn agent_is_part_of_material() {
        let a = SignatureGenerator::sign_at("apify", "search", "1.0.0", instant(0));
        let b = SignatureGenerator::sign_at("rtrvr", "search", "1.0.0", instant(0));
        assert_ne!(a, b);
    }

    #[test]
    fn matches_known_digest_prefix() {
        let at = instant(0);
        let material = format!(
            "system:default:1.0.0:{}",
            at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let expected = &hex::encode(Sha256::digest(material.as_bytes()))[..SIGNATURE_HEX_LEN];
        let sig = SignatureGenerator::sign_at("system", "default", "1.0.0", at);
        assert_eq!(sig.as_str(), expected);
    }

    #[test]
    fn serializes_as_plain_string() {
        let sig = SignatureGenerator::sign_at("system", "default", "1.0.0", instant(0));
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json, serde_json::Value::String(sig.to_string()));
    }
}
