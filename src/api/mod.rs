//! HTTP and WebSocket surface.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::ApiServer;
