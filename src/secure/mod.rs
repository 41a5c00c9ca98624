//! At-rest encryption for produced files.
//!
//! Each file is sealed whole with AES-256-GCM under the run's single key.
//! On disk an encrypted file is `nonce (12 bytes) || ciphertext || tag`,
//! written next to the source under `encrypted/<name>.enc`; the plaintext is
//! then removed. Restoring writes to a sibling `decrypted/` directory.

pub mod key;

use anyhow::{anyhow, Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument};

pub use key::{resolve_key, KeySource, SecretKey};

pub const ENCRYPTED_DIR: &str = "encrypted";
pub const DECRYPTED_DIR: &str = "decrypted";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("decryption failed: key might be incorrect or the file is corrupted")]
    Decrypt,
}

/// Seals and opens whole files under one key.
pub struct Vault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Vault {
    pub fn new(key: &SecretKey) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key.bytes())
            .map_err(|_| VaultError::InvalidKey("rejected by AES-256-GCM".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build from configuration, creating and persisting a key if none is set.
    pub fn from_config(
        configured: Option<&SecretKey>,
        env_path: &Path,
    ) -> Result<(Self, KeySource)> {
        let (key, source) = resolve_key(configured, env_path)?;
        Ok((Self::new(&key)?, source))
    }

    /// Encrypt `plaintext` as a single payload.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("system RNG unavailable"))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| anyhow!("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Decrypt and authenticate a payload produced by `seal`.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(VaultError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| VaultError::Decrypt)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Decrypt)?;
        Ok(plaintext.to_vec())
    }

    /// Encrypt `path` into `encrypted/<name>.enc` beside it and delete the original.
    ///
    /// Returns `Ok(None)` without touching the filesystem when `path` does not exist.
    #[instrument(level = "info", skip(self))]
    pub fn secure(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            error!(path = %path.display(), "file not found for encryption");
            return Ok(None);
        }
        let name = path
            .file_name()
            .with_context(|| format!("{:?} has no file name", path))?
            .to_string_lossy()
            .into_owned();

        let data = fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let sealed = self.seal(&data)?;

        let dir = path.parent().unwrap_or(Path::new("")).join(ENCRYPTED_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
        let out = dir.join(format!("{name}{ENCRYPTED_SUFFIX}"));
        fs::write(&out, sealed).with_context(|| format!("writing {:?}", out))?;
        fs::remove_file(path).with_context(|| format!("removing plaintext {:?}", path))?;

        info!(locked = %out.display(), "file locked");
        Ok(Some(out))
    }

    /// Decrypt `path` into a `decrypted/` directory next to its `encrypted/` parent,
    /// dropping the `.enc` suffix.
    ///
    /// Returns `Ok(None)` and writes nothing if the file is missing or fails
    /// authentication.
    #[instrument(level = "info", skip(self))]
    pub fn restore(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            error!(path = %path.display(), "encrypted file not found");
            return Ok(None);
        }
        let sealed = fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let plaintext = match self.open(&sealed) {
            Ok(p) => p,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot restore file");
                return Ok(None);
            }
        };

        let name = path
            .file_name()
            .with_context(|| format!("{:?} has no file name", path))?
            .to_string_lossy()
            .into_owned();
        let restored_name = name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(&name);

        let base = path.parent().and_then(Path::parent).unwrap_or(Path::new(""));
        let dir = base.join(DECRYPTED_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
        let out = dir.join(restored_name);
        fs::write(&out, plaintext).with_context(|| format!("writing {:?}", out))?;

        info!(restored = %out.display(), "file restored");
        Ok(Some(out))
    }
}
