mod auth;
mod health_check;

pub use auth::{login, profile, refresh, signup};
pub use health_check::{health_check, index};
