// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Signature, SignatureError};
use chrono::Utc;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use std::fs;
use std::path::Path;

/// One authorized identity: the key file's basename plus its public key.
#[derive(Clone, Debug)]
struct Key {
    name: String,
    public: RsaPublicKey,
}

/// The set of identities allowed to call privileged RPC methods.
///
/// Loaded once at daemon startup from a directory where each file is a
/// public key and each filename is the identity it authenticates.
#[derive(Clone, Debug, Default)]
pub struct Keys {
    keys: Vec<Key>,
}

impl Keys {
    /// Load every key file under `dir`.
    ///
    /// Supported encodings: OpenSSH single-line (`ssh-rsa AAAA…`), PKCS#1
    /// PEM (`RSA PUBLIC KEY`) and SPKI PEM (`PUBLIC KEY`). An unparseable
    /// file fails the whole load; a daemon with a broken keys directory
    /// must not come up half-authorized.
    pub fn read_authorized_keys(dir: &Path) -> Result<Self, SignatureError> {
        let entries = fs::read_dir(dir).map_err(|source| SignatureError::KeyRead {
            path: dir.display().to_string(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SignatureError::KeyRead {
                path: dir.display().to_string(),
                source,
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let raw = fs::read_to_string(&path).map_err(|source| SignatureError::KeyRead {
                path: path.display().to_string(),
                source,
            })?;

            let public = parse_public_key(&path, &raw)?;
            keys.push(Key { name, public });
        }

        Ok(Self { keys })
    }

    /// Number of loaded identities.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the authorized set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolve a signature to an authenticated identity.
    ///
    /// Returns `None` for an absent signature, a stale one, or one no
    /// authorized key verifies. This never errors: anonymity is a valid
    /// outcome, the caller decides whether it is acceptable.
    pub fn verify(&self, signature: Option<&Signature>) -> Option<&str> {
        let signature = signature?;

        if !signature.is_fresh(Utc::now()) {
            return None;
        }

        self.keys
            .iter()
            .find(|key| signature.verify(&key.public).is_ok())
            .map(|key| key.name.as_str())
    }
}

fn parse_public_key(path: &Path, raw: &str) -> Result<RsaPublicKey, SignatureError> {
    let trimmed = raw.trim();

    if trimmed.starts_with("ssh-") {
        let key = ssh_key::PublicKey::from_openssh(trimmed).map_err(|err| {
            SignatureError::KeyParse {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;

        let rsa = key.key_data().rsa().ok_or_else(|| SignatureError::KeyNotRsa {
            path: path.display().to_string(),
        })?;

        return RsaPublicKey::try_from(rsa).map_err(|_| SignatureError::KeyNotRsa {
            path: path.display().to_string(),
        });
    }

    RsaPublicKey::from_pkcs1_pem(trimmed)
        .or_else(|_| RsaPublicKey::from_public_key_pem(trimmed))
        .map_err(|err| SignatureError::KeyParse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs1::{EncodeRsaPublicKey, LineEnding};

    fn write_key(dir: &Path, name: &str, key: &RsaPrivateKey) {
        let pem = RsaPublicKey::from(key).to_pkcs1_pem(LineEnding::LF).unwrap();
        fs::write(dir.join(name), pem).unwrap();
    }

    #[test]
    fn filename_becomes_identity() {
        let dir = tempfile::tempdir().unwrap();
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        write_key(dir.path(), "alice", &key);

        let keys = Keys::read_authorized_keys(dir.path()).unwrap();
        assert_eq!(keys.len(), 1);

        let signature = Signature::new(&key).unwrap();
        assert_eq!(keys.verify(Some(&signature)), Some("alice"));
    }

    #[test]
    fn unauthorized_key_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let authorized = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        write_key(dir.path(), "alice", &authorized);

        let stranger = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let keys = Keys::read_authorized_keys(dir.path()).unwrap();
        let signature = Signature::new(&stranger).unwrap();
        assert_eq!(keys.verify(Some(&signature)), None);
    }

    #[test]
    fn stale_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        write_key(dir.path(), "alice", &key);

        let keys = Keys::read_authorized_keys(dir.path()).unwrap();
        let mut signature = Signature::new(&key).unwrap();
        // Push the timestamp outside the freshness window; the signature no
        // longer verifies either, but freshness must reject it first.
        signature.time -= 60 * 1_000_000_000;
        assert_eq!(keys.verify(Some(&signature)), None);
    }

    #[test]
    fn missing_signature_is_anonymous() {
        let keys = Keys::default();
        assert_eq!(keys.verify(None), None);
    }

    #[test]
    fn garbage_key_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken"), "not a key").unwrap();
        assert!(Keys::read_authorized_keys(dir.path()).is_err());
    }
}
