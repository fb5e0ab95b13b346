//! The `transport` module puts the broker on the network.
//!
//! It defines the JSON protocol spoken over WebSockets, the server that
//! exposes a `MemoryBroker`, and the remote receiver/sender handles the
//! demo programs use to reach it.

pub mod message;
pub mod remote;
pub mod websocket;

pub use remote::{RemoteReceiver, RemoteSender};
pub use websocket::{serve, start_websocket_server};
