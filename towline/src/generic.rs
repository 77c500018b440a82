use {
    crate::{
        logger::GeneralLogger,
        prelude::*,
        sender::{NumberedCommandSender, ResultsFuture, SharedResults},
    },
    knotline::{Knot, LineRawData},
    std::sync::Arc,
};

type BodyBuilder = Box<dyn Fn(&str, &LineRawData, &mut Knot) + Send + Sync>;

/// A named command sent through a [`NumberedCommandSender`].
///
/// Wraps argument data in the command's on-the-wire syntax and schedules
/// it; the default syntax is the command name, a space, and the encoded
/// argument data, which covers the single-argument commands. Commands
/// with a different body shape supply their own builder.
pub struct GenericNumberedCommand {
    name: String,
    sender: Arc<NumberedCommandSender>,
    build: BodyBuilder,
}

impl GenericNumberedCommand {
    pub fn new(name: &str, sender: Arc<NumberedCommandSender>) -> Self {
        Self::with_builder(
            name,
            sender,
            |name, data, output| {
                output.append_string(format!("{} ", name));
                data.append_encoded(output);
            },
        )
    }

    /// A command whose body is produced by `build(name, data, output)`.
    /// The body must end with a newline.
    pub fn with_builder<F>(name: &str, sender: Arc<NumberedCommandSender>, build: F) -> Self
    where
        F: Fn(&str, &LineRawData, &mut Knot) + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            sender,
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the body for `data` and schedules it. The returned future
    /// fires with the peer's results.
    pub fn schedule(&self, data: &LineRawData) -> ResultsFuture {
        let mut command = Knot::new();
        (self.build)(&self.name, data, &mut command);
        self.sender.send_command(&command)
    }

    /// As `schedule`, logging the lifecycle of the command: queued, sent
    /// (with its global id), completed, and a WARNING if the peer
    /// answered with a leading FAILED line.
    pub fn schedule_logged(
        &self,
        data: &LineRawData,
        logger: &Arc<GeneralLogger>,
        local_id: u64,
        description: &str,
    ) -> ResultsFuture {
        let mut command = Knot::new();
        (self.build)(&self.name, data, &mut command);

        logger.log(&format!("command queued, local id {}", local_id));
        let sent_logger = Arc::clone(logger);
        let description = description.to_string();
        let (future, _command_id) = self.sender.send_command_full(
            &command,
            Some(Box::new(move |command_id| {
                sent_logger.log(&format!(
                    "command sent, local id {}, global id {}: {}",
                    local_id, command_id, description
                ));
            })),
            None,
        );

        let done_logger = Arc::clone(logger);
        future.add_callback(move |results: SharedResults| {
            done_logger.log(&format!(
                "command complete, local id {}, global id {}",
                local_id, results.command_id
            ));
            log_failed_results(&results);
        });
        future
    }
}

/// The SUT reports failure as a FAILED line leading the results. That is
/// worth a warning but not a harness abort; the results still flow to the
/// caller.
fn log_failed_results(results: &SharedResults) {
    let received = &results.results_received;
    if received.size() > 0 && !received.is_raw(0) && received.get(0).starts_with(b"FAILED") {
        warn!(
            command_id = results.command_id,
            "received FAILED from the SUT: {}",
            received.encoded()
        );
    }
}
