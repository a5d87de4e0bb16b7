//! Client for the Erlang Port Mapper Daemon (epmd).
//!
//! A node registers its name and distribution port with the epmd on its own
//! host and keeps that registration alive for as long as the registration
//! connection stays open. Other nodes resolve the name back to a port by
//! asking the epmd on the target host.
//!
//! Reference: [Distribution Protocol](https://www.erlang.org/doc/apps/erts/erl_dist_protocol.html)

pub mod client;
pub use client::*;
pub mod identity;
pub use identity::*;
pub mod resolver;
pub use resolver::*;
pub mod session;
pub use session::*;
pub mod transport;
pub use transport::*;

use std::io;

/// The port epmd conventionally listens on.
pub const DEFAULT_EPMD_PORT: u16 = 4369;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node name must be name@host, got {0:?}")]
    InvalidName(String),
    #[error("failed to connect to epmd: {0}")]
    Connect(#[source] io::Error),
    #[error("epmd closed the connection")]
    ConnectionClosed,
    #[error("unsolicited data from epmd: first byte {0}")]
    UnexpectedMessage(u8),

    #[error(transparent)]
    Proto(#[from] proto::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A short read on a reply means the peer went away mid-exchange.
pub(crate) fn read_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(err)
    }
}

pub fn get_short_hostname() -> String {
    let hostname = gethostname::gethostname();
    let hostname = hostname.to_string_lossy();
    hostname.split('.').next().unwrap_or_default().to_string()
}
