//! WebSocket infrastructure: connection management, messages, and handler.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{ConnectionManager, SendError};
pub use handler::ws_handler;
pub use messages::{ClientMessage, ServerMessage};
