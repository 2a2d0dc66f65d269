//! HTTP handlers for identity-service.

pub mod auth;
pub mod notification;
pub mod password;
pub mod session;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

use crate::AppState;

pub const SESSION_COOKIE: &str = "session_id";

/// Session id presented by the client, if it parses.
pub fn presented_session(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

pub fn session_cookie(state: &AppState, session_id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.security.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(
            state.config.tokens.refresh_token_expiry_days,
        ))
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
