/// Middleware module
///
/// Request gating for protected routes.

mod access_guard;

pub use access_guard::{authenticate, AccessGuard, AuthenticatedUser};
