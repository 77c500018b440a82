mod delay;
mod from_file;
mod manager;

pub use self::{
    delay::{exponential_delay, fixed_delay, no_delay, DelayFunction},
    from_file::{ConfiguredScriptFactory, LoggerFactory, ScriptsFromFile},
    manager::{ArgumentScriptFactory, ScriptFactory, ScriptManager},
};

use {
    knotline::{fatal, Future},
    std::{sync::Arc, thread},
};

/// A runnable test.
///
/// There is one implementation per test *type*; each gets instantiated
/// many times with different parameters (different query mixes, delays,
/// target counts). Scripts that support interruption poll a stop flag
/// between iterations and override `terminate`; there is no preemptive
/// cancellation.
pub trait TestScript: Send + Sync {
    fn run(&self);

    /// Cooperative cancellation. Most scripts run to completion and leave
    /// the default in place.
    fn terminate(&self) {
        fatal!("this script does not support terminate()");
    }
}

/// Runs the script on its own thread; the returned future fires `true`
/// when `run` returns.
pub fn run_in_thread(script: Arc<dyn TestScript>) -> Future<bool> {
    let future: Future<bool> = Future::new();
    let completion = future.clone();
    thread::Builder::new()
        .name("test-script".into())
        .spawn(move || {
            script.run();
            completion.fire(true);
        })
        .expect("failed to spawn the script thread");
    future
}
