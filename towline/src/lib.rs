//! The harness-side protocol layers that ride on `knotline`: READY gating,
//! numbered commands and their result multiplexing, the receiving side of
//! the command protocol, script orchestration, and the protocol stacks a
//! harness mounts over a SUT's pipes or a peer harness's socket.

mod counter;
mod error;
mod event_monitor;
mod generic;
mod logger;
mod ready;
mod receiver;
mod root_mode;
mod run_script;
mod script;
mod sender;
mod stack;

pub use crate::{
    counter::next_command_id,
    error::{Error as CrateError, Result},
    event_monitor::{EventCallback, EventMessageMonitor},
    generic::GenericNumberedCommand,
    logger::GeneralLogger,
    ready::ReadyMonitor,
    receiver::{CommandHandler, HandlerFactory, NumberedCommandReceiver, ResultsWriter},
    root_mode::{
        RootModeCommand, RootModeCommandSender, RootModeHandler, RootResultsFuture,
        SharedRootResults,
    },
    run_script::{RunScriptCommand, RunScriptFuture, RunScriptHandler},
    script::{
        exponential_delay, fixed_delay, no_delay, run_in_thread, DelayFunction, LoggerFactory,
        ScriptManager, ScriptsFromFile, TestScript,
    },
    sender::{
        AggNumberedCommandSender, MultiNumberedCommandSender, NumberedCommandResult,
        NumberedCommandSender, ResultCallback, ResultsFuture, SentCallback, SharedResults,
    },
    stack::{
        spawn_sut, HarnessInfoHandler, MasterNetworkListener, NetworkProtocolStack, SlaveHandle,
        SlaveNetworkStack, SutIo, SutProtocolStack,
    },
};

pub(crate) mod prelude {
    pub use {
        crate::error::{Error as CrateError, Result},
        tracing::{debug, error, info, trace, warn},
    };
}
