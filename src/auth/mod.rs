/// Authentication module
///
/// Token minting/verification, password hashing, credential checks and the
/// session lifecycle built on top of them.

mod claims;
mod credentials;
mod jwt;
mod password;
mod session;

pub use claims::{Claims, Subject, TokenKind};
pub use credentials::Credentials;
pub use jwt::{TokenCodec, TokenError};
pub use password::PasswordHasher;
pub use session::{IssuedSession, SessionManager, TokenPair};
