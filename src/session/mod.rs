//! Session module - streaming generation protocol

pub mod handler;
pub mod protocol;
pub mod registry;

pub use handler::{ws_handler, Session};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionRegistry, SessionState};
