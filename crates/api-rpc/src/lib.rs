//! JSON-RPC API Layer
//!
//! Control plane of the Portability Transfer Engine: job creation,
//! authorization start, status and cancellation.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
