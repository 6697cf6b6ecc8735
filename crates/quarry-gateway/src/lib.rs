//! Thin HTTP front door over the coordination store. Request validation
//! and response shaping only; all job state lives in the store, which is
//! the sole source of truth for every handler.

pub mod error;
mod handlers;
mod router;
pub mod server;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer};
