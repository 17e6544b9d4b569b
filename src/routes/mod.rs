mod auth;
mod status;

pub use auth::{login, logout, logout_all, refresh, register};
pub use status::{current_user, health_check};
