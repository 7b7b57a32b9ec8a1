//! HTTP Gateway
//!
//! Serves `GET /callback1/{service}`, the redirect target providers send the
//! user's browser to after authorization.

pub mod callback;
pub mod server;

pub use callback::router;
pub use server::{GatewayConfig, GatewayServer};
