mod common;

use axum::{body::Body, http::{Request, StatusCode}};
use common::{get, TestApp};
use uuid::Uuid;

#[tokio::test]
async fn health_reports_cache_and_connections() {
    let app = TestApp::spawn();
    let _rx = app.connect(Uuid::new_v4());

    let res = app.send(get("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["connections"], 1);

    app.cache.set_unavailable(true);
    let res = app.send(get("/health")).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn handshake_without_session_is_rejected_for_good() {
    let app = TestApp::spawn();

    let res = app.send(get("/ws")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["retry"], false);

    let res = app.send(get("/ws?session_id=nope")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["retry"], false);
}

#[tokio::test]
async fn unmirrored_session_is_rejected_but_retryable() {
    let app = TestApp::spawn();

    let res = app
        .send(get(&format!("/ws?session_id={}", Uuid::new_v4())))
        .await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["retry"], true);
    assert_eq!(app.registry_count(), 0);
}

#[tokio::test]
async fn cache_outage_rejects_handshake() {
    let app = TestApp::spawn();
    let session_id = app.mirror_session(Uuid::new_v4()).await;
    app.cache.set_unavailable(true);

    let res = app
        .send(get(&format!("/ws?session_id={}", session_id)))
        .await;

    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["retry"], true);
}

#[tokio::test]
async fn mirrored_session_passes_the_handshake() {
    let app = TestApp::spawn();
    let session_id = app.mirror_session(Uuid::new_v4()).await;

    // Authorised, but a plain GET cannot be upgraded
    let res = app
        .send(get(&format!("/ws?session_id={}", session_id)))
        .await;
    assert_eq!(res.status, StatusCode::UPGRADE_REQUIRED);

    let res = app
        .send(
            Request::get("/ws")
                .header("cookie", format!("session_id={}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::UPGRADE_REQUIRED);
}
