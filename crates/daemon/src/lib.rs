//! Portability Transfer Engine - Composition Root
//!
//! Wires the SQLite store, extension registry, transfer workers, JSON-RPC
//! control plane and OAuth callback gateway together.

pub mod app;
pub mod logging;
pub mod settings;

pub use app::{start, RunningApp};
pub use settings::Settings;
