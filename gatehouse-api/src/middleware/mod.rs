pub mod auth;
pub mod rate_limit;

pub use auth::{user_auth_middleware, UserClaims};
pub use rate_limit::rate_limit_middleware;
