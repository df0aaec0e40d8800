//! Connection management
//!
//! Bindings, room membership and delivery to sockets.

mod connection;
mod manager;

pub use connection::{generate_connection_id, Connection};
pub use manager::ConnectionManager;
