pub mod auth;
pub mod notification;
pub mod session;
