pub mod config;
mod http_layers;
pub mod metrics;
mod notification_routes;
pub mod server;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::run_server;
