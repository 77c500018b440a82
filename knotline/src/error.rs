use {std::io::Error as IoError, std::net::SocketAddr, thiserror::Error};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {}", .source)]
    Io {
        #[from]
        source: IoError,
    },
    #[error("write refused, queue holds {} pending bytes", .pending)]
    WriteRefused { pending: usize },
    #[error("connection to {} failed", .addr)]
    ConnectFailed { addr: SocketAddr },
    #[error("event loop has already been shut down")]
    LoopStopped,
}
