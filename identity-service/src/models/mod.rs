//! Durable records owned by the identity service.

pub mod notification;
pub mod otp_code;
pub mod permission;
pub mod session;
pub mod token;
pub mod user;

pub use notification::Notification;
pub use otp_code::{OtpCode, OtpPurpose};
pub use permission::{Permission, Role};
pub use session::{DeviceContext, DeviceSession, Session, SessionStatus};
pub use token::{AccessToken, RefreshToken, TokenPair};
pub use user::{LoginIdentifier, SanitizedUser, User};
