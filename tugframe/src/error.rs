use {
    knotline::CrateError as CoreError, std::io::Error as IoError, thiserror::Error,
    towline::CrateError as HarnessError,
};

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
    #[error("{}", .source)]
    Harness {
        #[from]
        source: HarnessError,
    },
    #[error("workload line {:?} does not name a connected slave", .0)]
    NoSuchSlave(String),
}
