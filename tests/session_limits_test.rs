// ABOUTME: Integration tests for per-user session/token caps and last-used refresh gating
// ABOUTME: Includes a concurrency test asserting the cap holds under parallel admissions
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod common;

use common::FrozenClock;
use chrono::Duration;
use std::sync::Arc;
use useradm::limits::{LimitsConfig, SessionLimiter};
use useradm::models::{Session, TokenRecord};
use useradm::store::{AuthStore, MemoryStore};
use useradm::token::Clock;
use uuid::Uuid;

fn limiter_with(
    max_sessions: usize,
    max_tokens: usize,
) -> (SessionLimiter, Arc<MemoryStore>, Arc<FrozenClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FrozenClock::at_epoch());
    let limiter = SessionLimiter::new(
        Arc::clone(&store) as Arc<dyn AuthStore>,
        LimitsConfig {
            max_sessions_per_user: max_sessions,
            max_tokens_per_user: max_tokens,
            last_used_refresh_interval: Duration::minutes(5),
        },
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    (limiter, store, clock)
}

#[tokio::test]
async fn test_oldest_session_evicted_at_cap() {
    let (limiter, store, clock) = limiter_with(2, 0);
    let user = Uuid::new_v4();

    let first = limiter.admit(user).await.unwrap();
    clock.advance(Duration::seconds(10));
    let second = limiter.admit(user).await.unwrap();
    clock.advance(Duration::seconds(10));
    let third = limiter.admit(user).await.unwrap();

    let mut live: Vec<Uuid> = store
        .sessions_by_user(user)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    live.sort();
    let mut expected = vec![second.id, third.id];
    expected.sort();

    assert_eq!(live, expected);
    assert!(store.get_session(first.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_zero_cap_disables_enforcement() {
    let (limiter, store, _clock) = limiter_with(0, 0);
    let user = Uuid::new_v4();

    for _ in 0..25 {
        limiter.admit(user).await.unwrap();
    }

    assert_eq!(store.sessions_by_user(user).await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_cap_holds_under_concurrent_admissions() {
    let (limiter, store, _clock) = limiter_with(5, 0);
    let limiter = Arc::new(limiter);
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move { limiter.admit(user).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(store.sessions_by_user(user).await.unwrap().len() <= 5);
}

#[tokio::test]
async fn test_caps_are_per_user() {
    let (limiter, store, _clock) = limiter_with(2, 0);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    for _ in 0..2 {
        limiter.admit(alice).await.unwrap();
        limiter.admit(bob).await.unwrap();
    }

    assert_eq!(store.sessions_by_user(alice).await.unwrap().len(), 2);
    assert_eq!(store.sessions_by_user(bob).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_oldest_token_record_evicted_at_cap() {
    let (limiter, store, clock) = limiter_with(0, 2);
    let user = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let now = clock.now();
        let record = TokenRecord {
            id: Uuid::new_v4(),
            user_id: user,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        };
        ids.push(record.id);
        limiter.record_token(record).await.unwrap();
        clock.advance(Duration::seconds(10));
    }

    let live: Vec<Uuid> = store
        .tokens_by_user(user)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();

    assert_eq!(live.len(), 2);
    assert!(!live.contains(&ids[0]));
}

#[tokio::test]
async fn test_touch_is_rate_limited() {
    let (limiter, store, clock) = limiter_with(0, 0);
    let user = Uuid::new_v4();
    let session = limiter.admit(user).await.unwrap();
    let created = session.last_used_at;

    // inside the refresh interval: no write
    clock.advance(Duration::minutes(1));
    limiter.touch(session.id, clock.now()).await.unwrap();
    let unchanged = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(unchanged.last_used_at, created);

    // past the interval: refreshed
    clock.advance(Duration::minutes(5));
    let later = clock.now();
    limiter.touch(session.id, later).await.unwrap();
    let refreshed = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(refreshed.last_used_at, later);
}

#[tokio::test]
async fn test_touch_on_missing_session_is_noop() {
    let (limiter, _store, clock) = limiter_with(0, 0);
    limiter.touch(Uuid::new_v4(), clock.now()).await.unwrap();
}

#[tokio::test]
async fn test_expired_rows_are_purged_on_admission() {
    // caps disabled: purge alone must keep the store from growing unbounded
    let (limiter, store, clock) = limiter_with(0, 0);
    let user = Uuid::new_v4();

    let now = clock.now();
    let stale = Session::new(user, now);
    store.create_session(&stale).await.unwrap();
    store
        .create_token(&TokenRecord {
            id: stale.id,
            user_id: user,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
        .await
        .unwrap();

    clock.advance(Duration::hours(2));
    limiter.admit(user).await.unwrap();

    assert!(store.get_session(stale.id).await.unwrap().is_none());
    assert!(store.tokens_by_user(user).await.unwrap().is_empty());
    assert_eq!(store.sessions_by_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unexpired_rows_survive_the_purge() {
    let (limiter, store, clock) = limiter_with(0, 0);
    let user = Uuid::new_v4();

    let now = clock.now();
    let live = Session::new(user, now);
    store.create_session(&live).await.unwrap();
    store
        .create_token(&TokenRecord {
            id: live.id,
            user_id: user,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
        .await
        .unwrap();

    clock.advance(Duration::minutes(30));
    limiter.admit(user).await.unwrap();

    assert!(store.get_session(live.id).await.unwrap().is_some());
    assert_eq!(store.tokens_by_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoke_all_clears_sessions_and_tokens() {
    let (limiter, store, clock) = limiter_with(0, 0);
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    limiter.admit(user).await.unwrap();
    limiter.admit(other).await.unwrap();
    let now = clock.now();
    limiter
        .record_token(TokenRecord {
            id: Uuid::new_v4(),
            user_id: user,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
        .await
        .unwrap();

    limiter.revoke_all(user).await.unwrap();

    assert!(store.sessions_by_user(user).await.unwrap().is_empty());
    assert!(store.tokens_by_user(user).await.unwrap().is_empty());
    assert_eq!(store.sessions_by_user(other).await.unwrap().len(), 1);
}
