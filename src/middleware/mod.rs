// Middleware for session verification and CORS

pub mod auth;
pub mod cors;

pub use auth::*;
pub use cors::*;
