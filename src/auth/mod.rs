// 认证模块

pub mod jwt;
pub mod middleware;

pub use jwt::{generate_token, parse_token, Claims};
pub use middleware::{auth_middleware, CurrentUser};
