//! Permission-gated notification endpoint and its broker hand-off.

mod common;

use axum::http::StatusCode;
use common::{authed, TestApp};
use identity_service::{models::Permission, services::permission::permission_cache_key, NOTIFICATION_CREATE};
use serde_json::json;
use service_core::realtime::RealtimeMessage;

async fn signed_in_access(app: &TestApp) -> String {
    app.sign_in(None).await.str_field("access_token")
}

#[tokio::test]
async fn missing_grant_is_forbidden_and_not_cached() {
    let app = TestApp::spawn().await;
    let permission_id = app
        .store
        .insert_permission(Permission::new(NOTIFICATION_CREATE))
        .unwrap();
    let access = signed_in_access(&app).await;
    let recipient = app.add_user("u2@example.com", "U2").await;
    let body = json!({ "recipient_id": recipient.user_id, "kind": "like", "message": "U1 liked your post" });

    let denied = app
        .send(authed("POST", "/notifications", &access, Some(body.clone()), None))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert!(!app
        .cache
        .contains(&permission_cache_key(app.role_id, NOTIFICATION_CREATE)));

    // A fresh grant is honoured on the very next request
    app.store.grant(app.role_id, permission_id).unwrap();
    let created = app
        .send(authed("POST", "/notifications", &access, Some(body), None))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(app
        .cache
        .contains(&permission_cache_key(app.role_id, NOTIFICATION_CREATE)));
}

#[tokio::test]
async fn notification_for_another_user_is_published_keyed_by_recipient() {
    let app = TestApp::spawn().await;
    let permission_id = app
        .store
        .insert_permission(Permission::new(NOTIFICATION_CREATE))
        .unwrap();
    app.store.grant(app.role_id, permission_id).unwrap();
    let access = signed_in_access(&app).await;
    let recipient = app.add_user("u2@example.com", "U2").await;

    let created = app
        .send(authed(
            "POST",
            "/notifications",
            &access,
            Some(json!({ "recipient_id": recipient.user_id, "kind": "like", "message": "U1 liked your post" })),
            None,
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let events = app.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, "notifications");
    assert_eq!(events[0].key, recipient.user_id.to_string());

    let message: RealtimeMessage = serde_json::from_str(&events[0].payload).unwrap();
    assert_eq!(message.kind, "like");
    assert_eq!(message.receiver_id, recipient.user_id.to_string());
}

#[tokio::test]
async fn self_notification_is_stored_but_not_published() {
    let app = TestApp::spawn().await;
    let notification = app
        .state
        .notifications
        .notify(app.user.user_id, app.user.user_id, "reminder", "hello me")
        .await
        .unwrap();

    assert!(!notification.targets_other_user());
    assert_eq!(app.store.notifications().unwrap().len(), 1);
    assert!(app.publisher.events().is_empty());
}

#[tokio::test]
async fn publish_failure_surfaces_but_keeps_the_row() {
    let app = TestApp::spawn().await;
    let permission_id = app
        .store
        .insert_permission(Permission::new(NOTIFICATION_CREATE))
        .unwrap();
    app.store.grant(app.role_id, permission_id).unwrap();
    let access = signed_in_access(&app).await;
    let recipient = app.add_user("u2@example.com", "U2").await;
    app.publisher.set_failing(true);

    let res = app
        .send(authed(
            "POST",
            "/notifications",
            &access,
            Some(json!({ "recipient_id": recipient.user_id, "kind": "like", "message": "hi" })),
            None,
        ))
        .await;

    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    let stored = app.store.notifications().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].recipient_id, recipient.user_id);
}

#[tokio::test]
async fn unauthenticated_request_is_rejected_before_permission_check() {
    let app = TestApp::spawn().await;
    let res = app
        .send(authed(
            "POST",
            "/notifications",
            "not-a-token",
            Some(json!({ "recipient_id": app.user.user_id, "kind": "like", "message": "hi" })),
            None,
        ))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
