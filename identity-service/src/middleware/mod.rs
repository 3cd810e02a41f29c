pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, AuthIdentity, ClientOrigin};
pub use rate_limit::{create_login_limiter, login_rate_limit, OriginLimiter};
