use std::net::SocketAddr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind local endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("another command is still waiting for its response")]
    ProtocolBusy,

    #[error("{command} argument {value} is outside {min}..={max}")]
    InvalidArgument {
        command: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    #[error("unrecognised command `{0}`")]
    Parse(String),
}
