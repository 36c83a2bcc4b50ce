//! Axum middleware.

pub mod shield;

pub use shield::{denial_response, shield_middleware, ShieldState};
