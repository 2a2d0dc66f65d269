//! One-time code lifecycle: single live code, expiry, lockout.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{wrong_code, TestApp, EMAIL, PASSWORD, USERNAME};
use identity_service::{
    config::IdentityConfig,
    models::{LoginIdentifier, OtpCode, OtpPurpose},
    services::{
        store::CodeStore, store::CredentialStore, MemoryStore, OtpManager, ServiceError,
    },
    utils::Password,
};
use service_core::realtime::session_cache_key;
use std::sync::Arc;
use uuid::Uuid;

/// Hands control back to the runtime after every call, the way a networked
/// database does, so concurrent verifications interleave.
struct YieldingCodes(Arc<MemoryStore>);

#[async_trait]
impl CodeStore for YieldingCodes {
    async fn replace_code(&self, code: &OtpCode) -> Result<(), ServiceError> {
        let result = self.0.replace_code(code).await;
        tokio::task::yield_now().await;
        result
    }

    async fn find_code(&self, user_id: Uuid) -> Result<Option<OtpCode>, ServiceError> {
        let result = self.0.find_code(user_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn increment_attempts(&self, code_id: Uuid) -> Result<Option<i32>, ServiceError> {
        let result = self.0.increment_attempts(code_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn consume_code(&self, code_id: Uuid) -> Result<bool, ServiceError> {
        let result = self.0.consume_code(code_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn lock_out(&self, code_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let result = self.0.lock_out(code_id, user_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = self.0.delete_expired_codes(now).await;
        tokio::task::yield_now().await;
        result
    }
}

fn username() -> LoginIdentifier {
    LoginIdentifier::Username(USERNAME.to_string())
}

#[tokio::test]
async fn issuing_twice_leaves_one_code() {
    let app = TestApp::spawn().await;

    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();

    assert_eq!(app.store.code_count(app.user.user_id).unwrap(), 1);
    assert_eq!(app.email.sent().len(), 2);
}

#[tokio::test]
async fn code_is_six_digits_and_single_use() {
    let app = TestApp::spawn().await;
    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);

    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    app.state
        .otp
        .verify(app.user.user_id, OtpPurpose::Login, &code)
        .await
        .unwrap();

    let err = app
        .state
        .otp
        .verify(app.user.user_id, OtpPurpose::Login, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CodeNotFound));
}

#[tokio::test]
async fn concurrent_submissions_of_one_code_succeed_once() {
    let app = TestApp::spawn().await;
    let otp = OtpManager::new(
        Arc::new(YieldingCodes(app.store.clone())),
        app.email.clone(),
        &IdentityConfig::for_tests().otp,
    );
    otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);

    let (first, second) = tokio::join!(
        otp.verify(app.user.user_id, OtpPurpose::Login, &code),
        otp.verify(app.user.user_id, OtpPurpose::Login, &code),
    );

    let accepted = [first.is_ok(), second.is_ok()];
    assert_eq!(accepted.iter().filter(|ok| **ok).count(), 1);
    let rejected = if first.is_ok() { second } else { first };
    assert!(matches!(rejected, Err(ServiceError::CodeNotFound)));
    assert_eq!(app.store.code_count(app.user.user_id).unwrap(), 0);
}

#[tokio::test]
async fn wrong_code_attempts_then_lockout() {
    let app = TestApp::spawn().await;
    let user_id = app.user.user_id;

    app.state
        .auth
        .login(&username(), &Password::new(PASSWORD))
        .await
        .unwrap();
    let code = app.code_for(EMAIL);
    let wrong = wrong_code(&code);

    for expected_attempts in 1..=4 {
        let err = app
            .state
            .otp
            .verify(user_id, OtpPurpose::Login, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCode));

        let stored = app.store.find_code(user_id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, expected_attempts);
    }

    let err = app
        .state
        .otp
        .verify(user_id, OtpPurpose::Login, wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountLocked));

    assert_eq!(app.store.code_count(user_id).unwrap(), 0);
    let user = app.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert!(!user.is_active);

    let err = app
        .state
        .auth
        .login(&username(), &Password::new(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn lockout_drops_tokens_and_cached_projections() {
    let app = TestApp::spawn().await;
    let user_id = app.user.user_id;

    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);
    let signed_in = app
        .state
        .auth
        .verify_code(EMAIL, &code, &common::device(), None)
        .await
        .unwrap();
    let projection_key = session_cache_key(signed_in.session.session_id);
    assert!(app.cache.contains(&projection_key));

    app.state
        .auth
        .login(&username(), &Password::new(PASSWORD))
        .await
        .unwrap();
    let wrong = wrong_code(&app.code_for(EMAIL));

    let mut last = None;
    for _ in 0..5 {
        last = Some(
            app.state
                .auth
                .verify_code(EMAIL, wrong, &common::device(), None)
                .await
                .unwrap_err(),
        );
    }
    assert!(matches!(last, Some(ServiceError::AccountLocked)));

    assert!(!app.cache.contains(&projection_key));
    assert_eq!(app.store.access_token_count(user_id).unwrap(), 0);
    assert_eq!(app.store.refresh_token_count(user_id).unwrap(), 0);
}

#[tokio::test]
async fn expired_code_is_rejected_and_removed_even_when_correct() {
    let app = TestApp::spawn().await;
    let user_id = app.user.user_id;
    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);

    let mut stored = app.store.find_code(user_id).await.unwrap().unwrap();
    stored.expiry_utc = Utc::now() - Duration::seconds(1);
    app.store.put_code(stored).unwrap();

    let err = app
        .state
        .otp
        .verify(user_id, OtpPurpose::Login, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CodeExpired));
    assert_eq!(app.store.code_count(user_id).unwrap(), 0);
}

#[tokio::test]
async fn reset_code_does_not_complete_login() {
    let app = TestApp::spawn().await;
    app.state
        .otp
        .issue(&app.user, OtpPurpose::PasswordReset)
        .await
        .unwrap();
    let code = app.code_for(EMAIL);

    let err = app
        .state
        .otp
        .verify(app.user.user_id, OtpPurpose::Login, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CodeNotFound));
}

#[tokio::test]
async fn mail_failure_reaches_the_caller() {
    let app = TestApp::spawn().await;
    app.email.set_failing(true);

    let err = app
        .state
        .auth
        .login(&username(), &Password::new(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmailError(_)));
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = TestApp::spawn().await;

    let wrong_password = app
        .state
        .auth
        .login(&username(), &Password::new("not-it"))
        .await
        .unwrap_err();
    let unknown = app
        .state
        .auth
        .login(
            &LoginIdentifier::Email("nobody@example.com".to_string()),
            &Password::new(PASSWORD),
        )
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, ServiceError::InvalidCredentials));
    assert!(matches!(unknown, ServiceError::InvalidCredentials));
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn sweep_removes_only_expired_codes() {
    let app = TestApp::spawn().await;
    let other = app.add_user("u2@example.com", "U2").await;

    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    app.state.otp.issue(&other, OtpPurpose::Login).await.unwrap();

    let mut stale = app.store.find_code(app.user.user_id).await.unwrap().unwrap();
    stale.expiry_utc = Utc::now() - Duration::minutes(5);
    app.store.put_code(stale).unwrap();

    assert_eq!(app.state.otp.sweep_expired().await.unwrap(), 1);
    assert_eq!(app.store.code_count(app.user.user_id).unwrap(), 0);
    assert_eq!(app.store.code_count(other.user_id).unwrap(), 1);
}
