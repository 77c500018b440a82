//! Shared runtime for the test-harness components: the `Knot` segmented
//! byte string, line/raw framing, the protocol extension dispatcher,
//! fire-once futures, and the two-thread descriptor event loop that every
//! harness process mounts over its pipes and sockets.

mod error;
mod event_loop;
mod extension;
mod fd;
mod framing;
mod future;
mod knot;
mod line_raw;
mod net;

pub use crate::{
    error::{Error as CrateError, Result},
    event_loop::{
        ConnectionCallback, DataCallback, EofCallback, EventLoop, WriteQueue, MAX_PENDING_BYTES,
    },
    extension::{ExtensionManager, Flow, ProtocolExtension},
    fd::{pipe, set_nonblocking, FdHandle},
    framing::{LineRawParser, ParseHandler},
    future::{
        AggregatingFuture, Aggregator, CharCountAggregator, ConcatAggregator, Future,
        FutureWaiter, PartialAggregator, RowHashAggregator,
    },
    knot::{Cursor, Knot, KnotIter, Strand},
    line_raw::{read_line_raw, FramedItem, LineRawData},
    net::{
        ConnectionStatus, NetworkClient, NetworkConnection, NetworkServer,
        ServerConnectionCallback,
    },
};

pub(crate) mod prelude {
    pub use {
        crate::error::{Error as CrateError, Result},
        tracing::{debug, error, info, trace, warn},
    };
}

/// Logs at ERROR and aborts the component. Protocol-level failures are never
/// recovered from; the log line is the single authoritative failure point.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        ::tracing::error!($($arg)*);
        panic!($($arg)*);
    }};
}
