// ABOUTME: Shared test helpers: RSA key generation, key directory setup, a frozen clock
// ABOUTME: Pulled into the integration test binaries under tests/ via `mod common`
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use useradm::config::{KeysConfig, DEFAULT_PRIV_KEY_FILENAME_PATTERN};
use useradm::token::Clock;

/// Generate a fresh RSA private key as PKCS#8 PEM
pub fn generate_rsa_pem() -> String {
    let mut rng = OsRng;
    let key = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation");
    key.to_pkcs8_pem(LineEnding::LF)
        .expect("PEM export")
        .to_string()
}

/// Write a fresh RSA key into `dir` under `name` and return its path
pub fn write_key(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, generate_rsa_pem()).expect("write key file");
    path
}

/// Key loading settings pointing at `priv_key_path` with the stock pattern
pub fn keys_config(priv_key_path: PathBuf) -> KeysConfig {
    let dir = priv_key_path.parent().expect("key dir").to_path_buf();
    KeysConfig {
        priv_key_path,
        filename_pattern: DEFAULT_PRIV_KEY_FILENAME_PATTERN.into(),
        default_key_path: dir.join("private.pem"),
        fallback_key_path: None,
    }
}

/// bcrypt hash at minimum cost, fast enough for tests
pub fn hash_password(password: &str) -> String {
    bcrypt::hash(password, 4).expect("bcrypt hash")
}

/// Clock that only moves when a test advances it
pub struct FrozenClock {
    now: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn at_epoch() -> Self {
        Self::new(DateTime::from_timestamp(1_700_000_000, 0).expect("epoch"))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now = *now + by;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}
