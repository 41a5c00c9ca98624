// src/secure/key.rs

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use std::{fmt, path::Path};
use tracing::{info, warn};

use super::VaultError;
use crate::config::{env_file, ENCRYPTION_KEY_VAR};

pub const KEY_LEN: usize = 32;

/// The single symmetric key that secures every file of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| anyhow!("system RNG unavailable"))?;
        Ok(Self(bytes))
    }

    /// Parse the URL-safe base64 text form.
    pub fn from_encoded(text: &str) -> Result<Self, VaultError> {
        let bytes = URL_SAFE
            .decode(text.trim())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            VaultError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Where the run's key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Supplied by configuration.
    Configured,
    /// Freshly generated and written to the env file.
    Generated,
    /// Not configured, but the env file already held one; that one is used.
    Stored,
}

/// Use the configured key, or generate one and persist it to `env_path`.
///
/// A non-empty value already in the file is never overwritten.
pub fn resolve_key(
    configured: Option<&SecretKey>,
    env_path: &Path,
) -> Result<(SecretKey, KeySource)> {
    if let Some(key) = configured {
        info!("using existing encryption key from configuration");
        return Ok((key.clone(), KeySource::Configured));
    }

    info!(env = %env_path.display(), "no encryption key configured; generating and persisting a new one");
    let key = SecretKey::generate()?;
    if env_file::persist_if_unset(env_path, ENCRYPTION_KEY_VAR, &key.encode())
        .context("persisting encryption key")?
    {
        info!("encryption key persisted");
        return Ok((key, KeySource::Generated));
    }

    warn!("env file already holds an encryption key; using it instead of the generated one");
    let stored = env_file::load(env_path)?
        .remove(ENCRYPTION_KEY_VAR)
        .context("stored encryption key disappeared")?;
    Ok((SecretKey::from_encoded(&stored)?, KeySource::Stored))
}
