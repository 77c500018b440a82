mod client;
mod connection;
mod server;

pub use self::{
    client::{ConnectionStatus, NetworkClient},
    connection::NetworkConnection,
    server::{NetworkServer, ServerConnectionCallback},
};
