// ABOUTME: RSA signing key registry with filename-derived integer key ids
// ABOUTME: Built once at startup from a key directory scan; immutable thereafter
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Signing Key Registry
//!
//! Keys are RSA PEM files in a single directory. The filename pattern carries
//! the key id in a numeric capture group (`private.id.7.pem` → id 7); a file
//! that matches the pattern without a usable capture gets id 0. Id 0 doubles
//! as the slot for tokens issued before key ids existed, so their signatures
//! still verify after a rotation.
//!
//! Rotation is a deploy-time event: drop a new numbered key file into the
//! directory, point `USERADM_SERVER_PRIV_KEY_PATH` at it, restart. The
//! registry is never mutated at runtime, so concurrent lookups need no
//! locking.

use crate::config::KeysConfig;
use crate::errors::{AuthError, AuthResult};
use jsonwebtoken::{DecodingKey, EncodingKey};
use regex::Regex;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Key id reserved for the default key and for tokens without a `kid` header
pub const KEY_ID_ZERO: u32 = 0;

/// One loaded RSA keypair with its registry id
pub struct SigningKey {
    /// Registry id, derived from the source filename
    pub id: u32,
    /// File the key material came from
    pub source: PathBuf,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load a PEM private key (PKCS#8 or PKCS#1) and derive both halves
    ///
    /// # Errors
    /// Returns [`AuthError::Signing`] if the file is unreadable or does not
    /// parse as an RSA private key.
    pub fn load(path: &Path, id: u32) -> AuthResult<Self> {
        let pem = fs::read_to_string(path)
            .map_err(|e| AuthError::Signing(format!("cannot read {}: {e}", path.display())))?;
        Self::from_pem(&pem, id, path.to_path_buf())
    }

    /// Build a signing key from in-memory PEM material
    ///
    /// # Errors
    /// Returns [`AuthError::Signing`] if the PEM does not parse.
    pub fn from_pem(pem: &str, id: u32, source: PathBuf) -> AuthResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| {
                AuthError::Signing(format!("invalid RSA key {}: {e}", source.display()))
            })?;
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::Signing(format!("private key PEM export failed: {e}")))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::Signing(format!("public key PEM export failed: {e}")))?;

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::Signing(format!("encoding key creation failed: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::Signing(format!("decoding key creation failed: {e}")))?;

        Ok(Self {
            id,
            source,
            encoding,
            decoding,
        })
    }

    /// Key for JWT signing
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    /// Key for JWT signature verification
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Derive a key id from a file path using the configured filename pattern.
///
/// The first capture group of `pattern`, applied to the filename, yields the
/// id. A pattern without a capture group, a non-numeric capture, or a
/// non-matching filename all yield [`KEY_ID_ZERO`].
#[must_use]
pub fn key_id_from_path(path: &Path, pattern: &Regex) -> u32 {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return KEY_ID_ZERO;
    };
    pattern
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(KEY_ID_ZERO)
}

/// Immutable registry of verification keys plus the active signing key id
pub struct KeyRegistry {
    keys: HashMap<u32, SigningKey>,
    fallback: Option<SigningKey>,
    active: u32,
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<u32> = self.keys.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("KeyRegistry")
            .field("key_ids", &ids)
            .field("active", &self.active)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl KeyRegistry {
    /// Scan the key directory and build the registry.
    ///
    /// Load order: directory scan, conventional default (only if the scan
    /// produced no id 0), then the explicitly configured signing key, which
    /// always wins its id slot — newest configuration beats the scan. The
    /// fallback key loads last and lives outside the id map.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] on a malformed pattern, an unreadable
    /// directory, an invalid explicitly-configured fallback key, or when no
    /// key could be loaded at all.
    pub fn load(config: &KeysConfig) -> AuthResult<Self> {
        let pattern = Regex::new(&config.filename_pattern).map_err(|e| {
            AuthError::Config(format!(
                "invalid key filename pattern {:?}: {e}",
                config.filename_pattern
            ))
        })?;

        let dir = config
            .priv_key_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(|| {
                AuthError::Config(format!(
                    "signing key path {} has no parent directory",
                    config.priv_key_path.display()
                ))
            })?;

        let mut keys = Self::scan_directory(dir, &pattern)?;

        // Pre-kid tokens verify against id 0, conventionally the unnumbered
        // default file. A missing default is tolerated: after a rotation the
        // active key may only exist under a numbered name.
        if !keys.contains_key(&KEY_ID_ZERO) {
            match SigningKey::load(&config.default_key_path, KEY_ID_ZERO) {
                Ok(key) => {
                    info!(path = %config.default_key_path.display(), "loaded default signing key id=0");
                    keys.insert(KEY_ID_ZERO, key);
                }
                Err(e) => {
                    info!(
                        path = %config.default_key_path.display(),
                        "no conventional default key: {e}"
                    );
                }
            }
        }

        let active = Self::apply_configured_key(config, &pattern, &mut keys)?;

        let fallback = match &config.fallback_key_path {
            Some(path) => {
                // An operator who configured a fallback expects it honored;
                // failing to load it is fatal, unlike scan skips.
                let key = SigningKey::load(path, KEY_ID_ZERO).map_err(|e| {
                    AuthError::Config(format!(
                        "fallback key {} failed to load: {e}",
                        path.display()
                    ))
                })?;
                info!(path = %path.display(), "loaded fallback verification key");
                Some(key)
            }
            None => None,
        };

        if keys.is_empty() {
            return Err(AuthError::Config(format!(
                "no usable signing keys in {}",
                dir.display()
            )));
        }

        Ok(Self {
            keys,
            fallback,
            active,
        })
    }

    fn scan_directory(dir: &Path, pattern: &Regex) -> AuthResult<HashMap<u32, SigningKey>> {
        let entries = fs::read_dir(dir).map_err(|e| {
            AuthError::Config(format!("cannot read key directory {}: {e}", dir.display()))
        })?;

        let mut keys = HashMap::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| AuthError::Config(format!("key directory read error: {e}")))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !pattern.is_match(name) {
                continue;
            }
            let id = key_id_from_path(&path, pattern);
            match SigningKey::load(&path, id) {
                Ok(key) => {
                    info!(id, path = %path.display(), "loaded private key");
                    keys.insert(id, key);
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping unparsable key file: {e}");
                }
            }
        }
        Ok(keys)
    }

    /// Load the explicitly configured signing key and make it active.
    ///
    /// The configured path's key overwrites whatever the scan put under its
    /// derived id. An id-0 collision gets a warning: it usually means the
    /// configured filename does not match the pattern, which silently drops
    /// backward compatibility for pre-kid tokens.
    fn apply_configured_key(
        config: &KeysConfig,
        pattern: &Regex,
        keys: &mut HashMap<u32, SigningKey>,
    ) -> AuthResult<u32> {
        if config.priv_key_path == config.default_key_path {
            return Ok(KEY_ID_ZERO);
        }

        let id = key_id_from_path(&config.priv_key_path, pattern);
        match SigningKey::load(&config.priv_key_path, id) {
            Ok(key) => {
                if id == KEY_ID_ZERO && keys.contains_key(&KEY_ID_ZERO) {
                    warn!(
                        path = %config.priv_key_path.display(),
                        "configured signing key derives id=0; overriding the default key handler"
                    );
                }
                keys.insert(id, key);
                Ok(id)
            }
            Err(e) => {
                // The scan may already have picked the same file up under its
                // derived id; only a completely absent active key is fatal.
                if keys.contains_key(&id) {
                    warn!(
                        path = %config.priv_key_path.display(),
                        "configured signing key reload failed, using scanned copy: {e}"
                    );
                    Ok(id)
                } else {
                    Err(AuthError::Config(format!(
                        "configured signing key {} failed to load: {e}",
                        config.priv_key_path.display()
                    )))
                }
            }
        }
    }

    /// Look up a verification key by id
    #[must_use]
    pub fn lookup(&self, id: u32) -> Option<&SigningKey> {
        self.keys.get(&id)
    }

    /// The key used to sign new tokens
    ///
    /// # Errors
    /// Returns [`AuthError::Signing`] when the active id has no loaded key,
    /// which happens when neither the conventional default nor a configured
    /// override could be loaded (startup tolerates that; issuance cannot).
    pub fn default_key(&self) -> AuthResult<&SigningKey> {
        self.keys.get(&self.active).ok_or_else(|| {
            AuthError::Signing(format!("active signing key id={} not loaded", self.active))
        })
    }

    /// Verification-only fallback key, if configured
    #[must_use]
    pub const fn fallback(&self) -> Option<&SigningKey> {
        self.fallback.as_ref()
    }

    /// All loaded key ids, for startup logging
    #[must_use]
    pub fn key_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.keys.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
