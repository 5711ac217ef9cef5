// SPDX-License-Identifier: MIT OR Apache-2.0

use aurora_proto::{RequestWhoAmI, ResponseWhoAmI};
use aurora_signature::{Keys, Signature};
use std::path::Path;

/// Identity resolution for the other services.
///
/// Wraps the authorized-keys directory; other services delegate their
/// signature checks here so "who is calling" has exactly one definition.
pub struct AuthService {
    keys: Keys,
}

impl AuthService {
    /// Load the authorized keys from `dir`.
    pub fn new(dir: &Path) -> Result<Self, aurora_signature::SignatureError> {
        Ok(Self {
            keys: Keys::read_authorized_keys(dir)?,
        })
    }

    /// Build the service from already-loaded keys.
    pub fn with_keys(keys: Keys) -> Self {
        Self { keys }
    }

    /// Resolve a signature to a signer name; `None` is anonymous.
    pub fn verify(&self, signature: Option<&Signature>) -> Option<&str> {
        self.keys.verify(signature)
    }

    /// `AuthService.WhoAmI` — never errors; anonymous callers get an empty
    /// name.
    pub fn who_am_i(&self, request: &RequestWhoAmI) -> ResponseWhoAmI {
        ResponseWhoAmI {
            name: self
                .verify(request.signature.as_ref())
                .unwrap_or_default()
                .to_string(),
        }
    }
}
