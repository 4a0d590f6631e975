//! RSA key pair for the platform's services

use crate::error::{CoreError, Result};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_KEY_BITS: usize = 2048;
const PRIVATE_KEY_FILE: &str = "key.pem";
const PUBLIC_KEY_FILE: &str = "key.pub";

/// Paths of a written key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Generate a key pair into `dir` as `key.pem` (PKCS#8) and `key.pub`
/// (SubjectPublicKeyInfo). An existing pair is only replaced with `force`.
pub fn generate_keys(dir: &Path, bits: usize, force: bool) -> Result<KeyPair> {
    let pair = KeyPair {
        private_key: dir.join(PRIVATE_KEY_FILE),
        public_key: dir.join(PUBLIC_KEY_FILE),
    };
    if !force && (pair.private_key.exists() || pair.public_key.exists()) {
        return Err(CoreError::KeysExist(dir.to_path_buf()));
    }

    info!("Generating {}-bit RSA key pair", bits);
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;

    std::fs::create_dir_all(dir)?;
    std::fs::write(&pair.private_key, private_pem.as_bytes())?;
    restrict_permissions(&pair.private_key)?;
    std::fs::write(&pair.public_key, public_pem.as_bytes())?;

    info!("Keys written to {}", dir.display());
    Ok(pair)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
