//! Session state machine as driven by sign-in, refresh and logout.

mod common;

use common::{device, TestApp, EMAIL};
use identity_service::{
    models::{OtpPurpose, SessionStatus},
    services::ServiceError,
};
use service_core::realtime::{session_cache_key, SessionProjection};
use service_core::cache::CacheStore;

async fn sign_in(app: &TestApp, presented: Option<uuid::Uuid>) -> identity_service::services::SignedIn {
    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);
    app.state
        .auth
        .verify_code(EMAIL, &code, &device(), presented)
        .await
        .unwrap()
}

#[tokio::test]
async fn verified_code_opens_an_active_session_with_projection() {
    let app = TestApp::spawn().await;

    let signed_in = sign_in(&app, None).await;

    assert_eq!(signed_in.session.status(), SessionStatus::Active);
    assert_eq!(
        signed_in.session.refresh_token_id,
        Some(signed_in.tokens.refresh_token_id)
    );
    assert_eq!(signed_in.session.ip_address, "198.51.100.7");

    let cached = app
        .cache
        .get(&session_cache_key(signed_in.session.session_id))
        .await
        .unwrap()
        .unwrap();
    let projection: SessionProjection = serde_json::from_str(&cached).unwrap();
    assert_eq!(projection.user_id, app.user.user_id);
    assert_eq!(projection.email.as_deref(), Some(EMAIL));
}

#[tokio::test]
async fn logout_parks_the_session_and_next_sign_in_reactivates_it() {
    let app = TestApp::spawn().await;
    let first = sign_in(&app, None).await;
    let session_id = first.session.session_id;

    app.state
        .auth
        .logout(app.user.user_id, Some(session_id))
        .await
        .unwrap();

    let parked = app.state.sessions.find(session_id).await.unwrap().unwrap();
    assert_eq!(parked.status(), SessionStatus::Inactive);
    assert!(!app.cache.contains(&session_cache_key(session_id)));
    assert_eq!(app.store.access_token_count(app.user.user_id).unwrap(), 0);

    let second = sign_in(&app, Some(session_id)).await;
    assert_eq!(second.session.session_id, session_id);
    assert_eq!(second.session.status(), SessionStatus::Active);
    assert_eq!(
        second.session.refresh_token_id,
        Some(second.tokens.refresh_token_id)
    );
    assert!(app.cache.contains(&session_cache_key(session_id)));
}

#[tokio::test]
async fn presenting_an_active_or_revoked_session_opens_a_new_one() {
    let app = TestApp::spawn().await;
    let first = sign_in(&app, None).await;

    let second = sign_in(&app, Some(first.session.session_id)).await;
    assert_ne!(second.session.session_id, first.session.session_id);

    app.state
        .sessions
        .revoke(second.session.session_id, app.user.user_id)
        .await
        .unwrap();
    let third = sign_in(&app, Some(second.session.session_id)).await;
    assert_ne!(third.session.session_id, second.session.session_id);

    let err = app
        .state
        .sessions
        .reactivate(second.session.session_id, &app.user)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotReactivatable));
}

#[tokio::test]
async fn refresh_keeps_presented_session_alive() {
    let app = TestApp::spawn().await;
    let signed_in = sign_in(&app, None).await;
    let session_id = signed_in.session.session_id;

    let refreshed = app
        .state
        .auth
        .refresh(
            &signed_in.tokens.refresh_token,
            app.user.user_id,
            &device(),
            Some(session_id),
        )
        .await
        .unwrap();

    assert_eq!(refreshed.session_id, session_id);
    let session = app.state.sessions.find(session_id).await.unwrap().unwrap();
    assert!(session.last_active_utc >= signed_in.session.last_active_utc);
    assert_eq!(app.state.sessions.list(app.user.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn refresh_without_presented_session_opens_one_on_the_refresh_token() {
    let app = TestApp::spawn().await;
    let signed_in = sign_in(&app, None).await;

    let refreshed = app
        .state
        .auth
        .refresh(
            &signed_in.tokens.refresh_token,
            app.user.user_id,
            &device(),
            None,
        )
        .await
        .unwrap();

    assert_ne!(refreshed.session_id, signed_in.session.session_id);
    let opened = app
        .state
        .sessions
        .find(refreshed.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened.refresh_token_id, Some(signed_in.tokens.refresh_token_id));
}

#[tokio::test]
async fn revoked_session_cannot_be_revived_through_refresh() {
    let app = TestApp::spawn().await;
    let signed_in = sign_in(&app, None).await;
    let session_id = signed_in.session.session_id;

    app.state
        .sessions
        .revoke(session_id, app.user.user_id)
        .await
        .unwrap();

    assert_eq!(app.store.refresh_token_count(app.user.user_id).unwrap(), 0);
    assert_eq!(app.store.access_token_count(app.user.user_id).unwrap(), 0);

    for presented in [Some(session_id), None] {
        let err = app
            .state
            .auth
            .refresh(
                &signed_in.tokens.refresh_token,
                app.user.user_id,
                &device(),
                presented,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRefreshToken));
    }

    assert_eq!(app.state.sessions.list(app.user.user_id).await.unwrap().len(), 1);
    assert!(!app.cache.contains(&session_cache_key(session_id)));
}

#[tokio::test]
async fn revoking_a_stale_session_leaves_the_current_pair_alone() {
    let app = TestApp::spawn().await;
    let stale = sign_in(&app, None).await;
    let current = sign_in(&app, None).await;

    app.state
        .sessions
        .revoke(stale.session.session_id, app.user.user_id)
        .await
        .unwrap();

    let refreshed = app
        .state
        .auth
        .refresh(
            &current.tokens.refresh_token,
            app.user.user_id,
            &device(),
            Some(current.session.session_id),
        )
        .await
        .unwrap();
    assert_eq!(refreshed.session_id, current.session.session_id);
}

#[tokio::test]
async fn device_validity_follows_session_and_account_state() {
    let app = TestApp::spawn().await;
    let signed_in = sign_in(&app, None).await;
    let session_id = signed_in.session.session_id;

    assert!(app.state.sessions.is_device_valid(app.user.user_id, session_id).await);

    app.state
        .auth
        .logout(app.user.user_id, Some(session_id))
        .await
        .unwrap();
    assert!(app.state.sessions.is_device_valid(app.user.user_id, session_id).await);

    app.state
        .sessions
        .revoke(session_id, app.user.user_id)
        .await
        .unwrap();
    assert!(!app.state.sessions.is_device_valid(app.user.user_id, session_id).await);
}

#[tokio::test]
async fn session_survives_cache_outage_at_creation() {
    let app = TestApp::spawn().await;
    app.state.otp.issue(&app.user, OtpPurpose::Login).await.unwrap();
    let code = app.code_for(EMAIL);

    app.cache.set_unavailable(true);
    let signed_in = app
        .state
        .auth
        .verify_code(EMAIL, &code, &device(), None)
        .await
        .unwrap();
    app.cache.set_unavailable(false);

    assert!(app
        .state
        .sessions
        .find(signed_in.session.session_id)
        .await
        .unwrap()
        .is_some());
    assert!(!app.cache.contains(&session_cache_key(signed_in.session.session_id)));
}
