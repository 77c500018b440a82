use {knotline::CrateError as CoreError, std::io::Error as IoError, thiserror::Error};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {}", .source)]
    Io {
        #[from]
        source: IoError,
    },
    #[error("{}", .source)]
    Core {
        #[from]
        source: CoreError,
    },
    #[error("malformed script configuration line: {:?}", .0)]
    MalformedScriptLine(String),
    #[error("connection to the master harness at {} failed", .0)]
    MasterConnectFailed(std::net::SocketAddr),
    #[error("SUT command line is empty")]
    EmptySutCommand,
}
