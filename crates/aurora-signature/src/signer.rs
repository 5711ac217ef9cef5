// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Signature, SignatureError};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use std::fmt;
use std::fs;
use std::path::Path;

/// A signing identity backed by a private RSA key file.
#[derive(Clone)]
pub struct Signer {
    name: String,
    key: RsaPrivateKey,
}

impl Signer {
    /// Load a signer from a private key file.
    ///
    /// Supported encodings: PKCS#1 PEM (`RSA PRIVATE KEY`), PKCS#8 PEM
    /// (`PRIVATE KEY`), and OpenSSH (`OPENSSH PRIVATE KEY`, unencrypted).
    /// The local `name` is informational; the authenticated name is always
    /// derived server-side from the authorized-keys directory.
    pub fn from_key_file(path: &Path) -> Result<Self, SignatureError> {
        let raw = fs::read_to_string(path).map_err(|source| SignatureError::KeyRead {
            path: path.display().to_string(),
            source,
        })?;

        let key = parse_private_key(path, &raw)?;

        Ok(Self {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            key,
        })
    }

    /// Produce a fresh signature for a request.
    pub fn sign(&self) -> Result<Signature, SignatureError> {
        Signature::new(&self.key)
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose key material through Debug.
        f.debug_struct("Signer").field("name", &self.name).finish()
    }
}

fn parse_private_key(path: &Path, raw: &str) -> Result<RsaPrivateKey, SignatureError> {
    let trimmed = raw.trim();

    if trimmed.contains("OPENSSH PRIVATE KEY") {
        let key = ssh_key::PrivateKey::from_openssh(trimmed).map_err(|err| {
            SignatureError::KeyParse {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;

        if key.is_encrypted() {
            return Err(SignatureError::KeyParse {
                path: path.display().to_string(),
                reason: "password protected keys are not supported".into(),
            });
        }

        let ssh_key::private::KeypairData::Rsa(keypair) = key.key_data() else {
            return Err(SignatureError::KeyNotRsa {
                path: path.display().to_string(),
            });
        };

        return RsaPrivateKey::try_from(keypair).map_err(|_| SignatureError::KeyNotRsa {
            path: path.display().to_string(),
        });
    }

    RsaPrivateKey::from_pkcs1_pem(trimmed)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(trimmed))
        .map_err(|err| SignatureError::KeyParse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPublicKey;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};

    #[test]
    fn loads_pkcs1_pem_and_signs() {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        fs::write(&path, key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();

        let signer = Signer::from_key_file(&path).unwrap();
        let signature = signer.sign().unwrap();
        signature.verify(&RsaPublicKey::from(&key)).unwrap();
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = Signer::from_key_file(Path::new("/nonexistent/id_rsa")).unwrap_err();
        assert!(matches!(err, SignatureError::KeyRead { .. }));
    }

    #[test]
    fn garbage_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        fs::write(&path, "garbage").unwrap();

        let err = Signer::from_key_file(&path).unwrap_err();
        assert!(matches!(err, SignatureError::KeyParse { .. }));
    }
}
