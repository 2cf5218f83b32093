//! Control-plane connection to the signaling element

pub mod connection;
pub mod frame;
pub mod manager;
pub mod sink;

pub use connection::Connection;
pub use frame::Frame;
pub use manager::TransportManager;
pub use sink::ResponseSink;
