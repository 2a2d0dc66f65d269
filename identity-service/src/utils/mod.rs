pub mod password;
pub mod token;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use token::{constant_time_eq, generate_hex_token, generate_numeric_code, hash_token};
pub use validation::ValidatedJson;
