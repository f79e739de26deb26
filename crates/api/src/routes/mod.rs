//! HTTP route handlers.

pub mod all;
pub mod health;
pub mod metrics;
pub mod projections;
pub mod render;
pub mod streams;
