// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signed request envelopes for the Aurora RPC surface.
//!
//! A [`Signature`] is an RSA-PSS-SHA256 signature over the decimal string of
//! a unix-nanosecond timestamp. Daemons verify incoming signatures against a
//! directory of authorized public keys ([`Keys`]); the filename of the
//! matching key becomes the caller's authenticated identity. Clients and
//! builders produce signatures with a [`Signer`] loaded from a private key
//! file.
//!
//! Signatures are replay-protected: anything older (or more skewed) than
//! [`SIGNATURE_TTL`] is rejected before any key is tried.
#![deny(unsafe_code)]

mod keys;
mod signer;

pub use keys::Keys;
pub use signer::Signer;

use chrono::{DateTime, Utc};
use rsa::pss::{Signature as PssSignature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

/// How long a signature stays acceptable after (or before) `time`.
pub const SIGNATURE_TTL: Duration = Duration::from_secs(30);

/// A single-use request signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Unix nanoseconds at signing time; also the signed message.
    pub time: i64,
    /// RSA-PSS-SHA256 signature over the decimal string of `time`.
    #[serde(with = "base64_bytes")]
    pub sign: Vec<u8>,
}

impl Signature {
    /// Sign the current time with `key`.
    pub fn new(key: &RsaPrivateKey) -> Result<Self, SignatureError> {
        let time = Utc::now()
            .timestamp_nanos_opt()
            .ok_or(SignatureError::Clock)?;

        let signing_key = SigningKey::<Sha256>::new(key.clone());
        let sign = signing_key
            .sign_with_rng(&mut rand::thread_rng(), Self::message(time).as_bytes())
            .to_vec();

        Ok(Self { time, sign })
    }

    /// Verify the signature against `key`.
    ///
    /// This checks the cryptographic binding only; freshness is the
    /// acceptance-path concern of [`Keys::verify`].
    pub fn verify(&self, key: &RsaPublicKey) -> Result<(), SignatureError> {
        let signature = PssSignature::try_from(self.sign.as_slice())
            .map_err(|_| SignatureError::Malformed)?;

        VerifyingKey::<Sha256>::new(key.clone())
            .verify(Self::message(self.time).as_bytes(), &signature)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Whether `time` lies within [`SIGNATURE_TTL`] of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Some(now_nanos) = now.timestamp_nanos_opt() else {
            return false;
        };
        let age = (i128::from(now_nanos) - i128::from(self.time)).unsigned_abs();
        age <= SIGNATURE_TTL.as_nanos()
    }

    fn message(time: i64) -> String {
        time.to_string()
    }
}

/// Failures producing, parsing, or checking a [`Signature`] or its keys.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// System clock is outside the representable nanosecond range.
    #[error("system clock is out of range for a signature timestamp")]
    Clock,

    /// The signature bytes are not a valid PSS signature.
    #[error("malformed signature bytes")]
    Malformed,

    /// The signature does not verify under the given key.
    #[error("signature does not match")]
    Mismatch,

    /// The signature timestamp is outside the freshness window.
    #[error("signature expired (older than {}s)", SIGNATURE_TTL.as_secs())]
    Expired,

    /// A key file could not be read.
    #[error("unable to read key file {path}")]
    KeyRead {
        /// Path of the offending file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A key file could not be parsed in any supported encoding.
    #[error("unable to parse key file {path}: {reason}")]
    KeyParse {
        /// Path of the offending file.
        path: String,
        /// What the parsers reported.
        reason: String,
    },

    /// The key parsed but is not an RSA key.
    #[error("unsupported key type in {path}, expected RSA")]
    KeyNotRsa {
        /// Path of the offending file.
        path: String,
    },
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
