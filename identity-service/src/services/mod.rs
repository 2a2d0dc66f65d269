//! Business logic for sign-in, sessions, permissions and notifications.

mod auth;
mod credential;
mod database;
mod email;
pub mod error;
mod google;
mod memory;
mod notification;
mod otp;
pub mod permission;
pub mod publisher;
mod session;
pub mod store;
mod sweeper;
mod token;

pub use auth::{AuthService, LoginChallenge, RefreshedAccess, SignedIn};
pub use credential::CredentialVerifier;
pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService, SentCode};
pub use error::ServiceError;
pub use google::{FederatedIdentity, GoogleIdentityProvider, IdentityProvider, MockIdentityProvider};
pub use memory::MemoryStore;
pub use notification::NotificationService;
pub use otp::OtpManager;
pub use permission::PermissionCache;
pub use publisher::{EventPublisher, MockPublisher, PublishedEvent, RedisStreamPublisher};
pub use session::SessionManager;
pub use store::IdentityStore;
pub use sweeper::spawn_code_sweeper;
pub use token::{MintedPair, RotatedAccess, TokenIssuer};
