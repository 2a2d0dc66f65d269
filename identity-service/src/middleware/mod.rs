pub mod auth;
pub mod device;
pub mod permission;

pub use auth::{auth_middleware, AuthUser};
pub use device::Device;
pub use permission::require_permission;
