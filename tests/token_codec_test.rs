// ABOUTME: Integration tests for JWT issuance and verification with key-id resolution
// ABOUTME: Expiry runs against a frozen clock so the tests are deterministic
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use common::{generate_rsa_pem, FrozenClock};
use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, Header};
use std::path::PathBuf;
use std::sync::Arc;
use useradm::keys::SigningKey;
use useradm::token::{Claims, Clock, TokenCodec};
use useradm::AuthError;
use uuid::Uuid;

fn signing_key(id: u32) -> SigningKey {
    SigningKey::from_pem(&generate_rsa_pem(), id, PathBuf::from("test.pem")).unwrap()
}

fn codec(clock: Arc<FrozenClock>) -> TokenCodec {
    TokenCodec::new("useradm".into(), 3600, clock)
}

#[test]
fn test_issue_and_verify_roundtrip() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(Arc::clone(&clock));
    let key = signing_key(3);
    let user_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    let token = codec
        .issue(user_id, Some("acme".into()), session_id, &key)
        .unwrap();
    let claims = codec
        .verify(&token, |kid| (kid == 3).then_some(&key), None)
        .unwrap();

    assert_eq!(claims.sub, user_id.to_string());
    assert_eq!(claims.jti, session_id.to_string());
    assert_eq!(claims.tenant.as_deref(), Some("acme"));
    assert_eq!(claims.iss, "useradm");
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[test]
fn test_expired_token_rejected_by_injected_clock() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(Arc::clone(&clock));
    let key = signing_key(0);

    let token = codec
        .issue(Uuid::new_v4(), None, Uuid::new_v4(), &key)
        .unwrap();

    clock.advance(Duration::seconds(3599));
    assert!(codec.verify(&token, |_| Some(&key), None).is_ok());

    clock.advance(Duration::seconds(2));
    let result = codec.verify(&token, |_| Some(&key), None);
    assert!(matches!(result, Err(AuthError::ExpiredToken { .. })));
}

#[test]
fn test_unknown_key_id_without_fallback() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(clock);
    let key = signing_key(7);

    let token = codec
        .issue(Uuid::new_v4(), None, Uuid::new_v4(), &key)
        .unwrap();
    let result = codec.verify(&token, |_| None, None);

    assert!(matches!(result, Err(AuthError::UnknownKey { kid: 7 })));
}

#[test]
fn test_fallback_consulted_only_on_registry_miss() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(clock);
    let signer = signing_key(7);
    let wrong = signing_key(7);

    let token = codec
        .issue(Uuid::new_v4(), None, Uuid::new_v4(), &signer)
        .unwrap();

    // registry miss, fallback has the signer: verifies
    assert!(codec.verify(&token, |_| None, Some(&signer)).is_ok());

    // registry hit wins even when its key cannot verify the signature
    let result = codec.verify(&token, |_| Some(&wrong), Some(&signer));
    assert!(matches!(result, Err(AuthError::InvalidToken(_))));
}

#[test]
fn test_wrong_key_signature_rejected() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(clock);
    let signer = signing_key(1);
    let other = signing_key(1);

    let token = codec
        .issue(Uuid::new_v4(), None, Uuid::new_v4(), &signer)
        .unwrap();
    let result = codec.verify(&token, |_| Some(&other), None);

    assert!(matches!(result, Err(AuthError::InvalidToken(_))));
}

#[test]
fn test_garbage_token_is_malformed() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(clock);
    let key = signing_key(0);

    let result = codec.verify("not-a-jwt", |_| Some(&key), None);
    assert!(matches!(result, Err(AuthError::MalformedToken(_))));
}

#[test]
fn test_token_without_kid_resolves_to_id_zero() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(Arc::clone(&clock));
    let key = signing_key(0);

    let now = clock.now();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        iss: "useradm".into(),
        tenant: None,
        iat: now.timestamp(),
        exp: now.timestamp() + 600,
        jti: Uuid::new_v4().to_string(),
    };
    // header with no kid at all, as pre-key-id deployments minted
    let token = encode(&Header::new(Algorithm::RS256), &claims, key.encoding_key()).unwrap();

    let verified = codec
        .verify(&token, |kid| (kid == 0).then_some(&key), None)
        .unwrap();
    assert_eq!(verified.sub, claims.sub);
}

#[test]
fn test_non_decimal_kid_is_malformed() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let codec = codec(Arc::clone(&clock));
    let key = signing_key(0);

    let now = clock.now();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        iss: "useradm".into(),
        tenant: None,
        iat: now.timestamp(),
        exp: now.timestamp() + 600,
        jti: Uuid::new_v4().to_string(),
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("not-a-number".into());
    let token = encode(&header, &claims, key.encoding_key()).unwrap();

    let result = codec.verify(&token, |_| Some(&key), None);
    assert!(matches!(result, Err(AuthError::MalformedToken(_))));
}

#[test]
fn test_issuer_mismatch_rejected() {
    let clock = Arc::new(FrozenClock::at_epoch());
    let issuing = TokenCodec::new("other-service".into(), 3600, clock.clone());
    let verifying = codec(clock);
    let key = signing_key(0);

    let token = issuing
        .issue(Uuid::new_v4(), None, Uuid::new_v4(), &key)
        .unwrap();
    let result = verifying.verify(&token, |_| Some(&key), None);

    assert!(matches!(result, Err(AuthError::InvalidToken(_))));
}
