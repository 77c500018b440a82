use std::sync::atomic::{AtomicU64, Ordering};

/// Source of every command id in this process. Correlation across senders
/// only works if ids never collide, so there is exactly one counter no
/// matter how many senders are alive.
static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(0);

/// Returns the next command id. Ids are assigned in a strict total order
/// starting at 0.
pub fn next_command_id() -> u64 {
    NEXT_COMMAND_ID.fetch_add(1, Ordering::SeqCst)
}
