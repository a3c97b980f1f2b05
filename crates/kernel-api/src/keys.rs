//! Hex-encoded ed25519 key storage for sealed-input verification.
//!
//! A signing key lives in a single file as 64 hex characters; its public
//! half is mirrored next to it with a `.pub` suffix so verifiers never need
//! the secret file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use tracing::info;

#[derive(Debug)]
pub enum KeyError {
    Io(std::io::Error),
    MalformedKey(PathBuf),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "key file i/o failed: {err}"),
            Self::MalformedKey(path) => {
                write!(f, "key file '{}' is not a 32-byte hex key", path.display())
            }
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::MalformedKey(_) => None,
        }
    }
}

impl From<std::io::Error> for KeyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn public_key_path(secret_path: &Path) -> PathBuf {
    let mut name = secret_path.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

fn decode_key_bytes(path: &Path) -> Result<[u8; SECRET_KEY_LENGTH], KeyError> {
    let raw = fs::read_to_string(path)?;
    let bytes = hex::decode(raw.trim()).map_err(|_| KeyError::MalformedKey(path.to_path_buf()))?;
    bytes
        .try_into()
        .map_err(|_| KeyError::MalformedKey(path.to_path_buf()))
}

/// Load the signing key at `path`, generating and persisting a fresh one
/// (plus its `.pub` mirror) when the file does not exist.
pub fn load_or_generate_signing_key(path: &Path) -> Result<SigningKey, KeyError> {
    if path.exists() {
        let bytes = decode_key_bytes(path)?;
        return Ok(SigningKey::from_bytes(&bytes));
    }

    let signing_key = SigningKey::generate(&mut OsRng);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, hex::encode(signing_key.to_bytes()))?;
    fs::write(
        public_key_path(path),
        hex::encode(signing_key.verifying_key().to_bytes()),
    )?;
    info!(path = %path.display(), "generated new signing key");
    Ok(signing_key)
}

/// Load a verification key from a hex file, accepting either a `.pub`
/// mirror or a raw 32-byte public key file.
pub fn load_verify_key(path: &Path) -> Result<VerifyingKey, KeyError> {
    let bytes = decode_key_bytes(path)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::MalformedKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.key");

        let generated = load_or_generate_signing_key(&path).unwrap();
        let reloaded = load_or_generate_signing_key(&path).unwrap();
        assert_eq!(generated.to_bytes(), reloaded.to_bytes());

        let verify = load_verify_key(&public_key_path(&path)).unwrap();
        assert_eq!(verify, generated.verifying_key());
    }

    #[test]
    fn rejects_garbage_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, "not hex at all").unwrap();
        assert!(matches!(
            load_or_generate_signing_key(&path),
            Err(KeyError::MalformedKey(_))
        ));
        assert!(matches!(load_verify_key(&path), Err(KeyError::MalformedKey(_))));
    }
}
