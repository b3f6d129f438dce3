//! Async client built on top of `mqtt-core`'s wire codec and topic tree: a
//! connection actor (component D) driving keep-alive, reconnection, and
//! inbound dispatch, fronted by a cloneable public handle (component E).

mod client;
mod connection;
mod error;
mod options;
mod request;
mod transport;

pub use client::MqttClient;
pub use connection::{ConnectionState, Handlers};
pub use error::{ClientError, ErrorKind};
pub use options::ConnectOptions;
pub use transport::{Connector, TcpConnector, Transport, TlsTcpConnector};
