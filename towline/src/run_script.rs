use {
    crate::{
        prelude::*,
        receiver::{CommandHandler, ResultsWriter},
        script::{run_in_thread, ScriptManager},
        sender::{MultiNumberedCommandSender, SharedResults},
    },
    knotline::{fatal, Future, Knot, LineRawData},
    std::sync::Arc,
};

pub(crate) const RUNSCRIPT_TOKEN: &str = "RUNSCRIPT";
pub(crate) const ENDRUNSCRIPT_TOKEN: &str = "ENDRUNSCRIPT";
pub(crate) const STARTED_TOKEN: &[u8] = b"STARTED";
pub(crate) const FINISHED_TOKEN: &[u8] = b"FINISHED";

pub type RunScriptFuture = Future<SharedResults>;

/// Asks another harness component to execute a named script.
///
/// The request travels as `RUNSCRIPT\n<name>\n<args…>\nENDRUNSCRIPT`
/// inside a numbered command. The remote answers twice under the same id:
/// a `STARTED` results block when the script begins and a `FINISHED`
/// block when it completes, surfaced here as two futures.
pub struct RunScriptCommand {
    sender: Arc<MultiNumberedCommandSender>,
}

impl RunScriptCommand {
    pub fn new(sender: Arc<MultiNumberedCommandSender>) -> Self {
        Self { sender }
    }

    /// `command_data` is the script name followed by its arguments.
    /// Returns when the command is scheduled; the futures track the
    /// remote lifecycle.
    pub fn send_run_script(
        &self,
        command_data: &LineRawData,
        command_start_future: RunScriptFuture,
        command_complete_future: RunScriptFuture,
    ) {
        let mut command = Knot::new();
        command.append_string(format!("{}\n", RUNSCRIPT_TOKEN));
        command_data.append_encoded(&mut command);
        command.append_string(format!("{}\n", ENDRUNSCRIPT_TOKEN));

        let sender = Arc::clone(&self.sender);
        debug!("scheduling a remote script run");
        self.sender.send_command(
            &command,
            Arc::new(move |results: SharedResults| {
                route_results(&sender, &results, &command_start_future, &command_complete_future);
            }),
            None,
            None,
        );
    }
}

/// STARTED fires the first future; FINISHED deregisters the command and
/// fires the second. Anything else from the peer is a protocol violation.
fn route_results(
    sender: &Arc<MultiNumberedCommandSender>,
    results: &SharedResults,
    command_start_future: &RunScriptFuture,
    command_complete_future: &RunScriptFuture,
) {
    let received = &results.results_received;
    assert!(received.size() > 0);
    assert!(!received.is_raw(0));

    if received.get(0).eq_bytes(STARTED_TOKEN) {
        debug_assert!(!command_start_future.has_fired());
        command_start_future.fire(Arc::clone(results));
    } else if received.get(0).eq_bytes(FINISHED_TOKEN) {
        debug!(command_id = results.command_id, "remote script finished");
        sender.remove_callback(results.command_id);
        debug_assert!(!command_complete_future.has_fired());
        command_complete_future.fire(Arc::clone(results));
    } else {
        fatal!(
            "unexpected script results: {:?}",
            received.get(0).to_string()
        );
    }
}

/// Receiver side: executes RUNSCRIPT commands against a script manager.
///
/// Replies STARTED as soon as the script is launched on its own thread,
/// FINISHED when it returns, then offers the peer another command slot.
pub struct RunScriptHandler {
    script_manager: Arc<ScriptManager>,
}

impl RunScriptHandler {
    pub fn new(script_manager: Arc<ScriptManager>) -> Self {
        Self { script_manager }
    }

    /// Factory suitable for `NumberedCommandReceiver::add_handler`.
    pub fn factory(script_manager: Arc<ScriptManager>) -> crate::receiver::HandlerFactory {
        Box::new(move || Box::new(RunScriptHandler::new(Arc::clone(&script_manager))))
    }
}

impl CommandHandler for RunScriptHandler {
    fn execute(&mut self, mut data: LineRawData, results: ResultsWriter) {
        // RUNSCRIPT, the script name, optional arguments, ENDRUNSCRIPT.
        if data.size() < 3 {
            fatal!("malformed RUNSCRIPT command of {} items", data.size());
        }
        assert!(data.get(0).eq_bytes(RUNSCRIPT_TOKEN.as_bytes()));
        assert!(
            data.get(data.size() - 1)
                .eq_bytes(ENDRUNSCRIPT_TOKEN.as_bytes())
        );

        let script_name = data.get(1).to_string();
        data.set_start_offset(2);
        data.set_end_offset(1);

        let script = if data.size() > 0 {
            self.script_manager
                .get_argument_script(&script_name, &data)
        } else {
            self.script_manager.get_script(&script_name)
        };

        info!(script = %script_name, "running script for a remote harness");
        let run_result = run_in_thread(script);
        // STARTED goes out before the completion callback is attached so
        // a script that returns immediately cannot reorder the replies.
        results.write_line("STARTED");
        let completion_writer = results;
        run_result.add_callback(move |_ran| {
            completion_writer.write_line("FINISHED");
            completion_writer.send_ready();
        });
    }
}
