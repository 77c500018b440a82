use {
    crate::{
        error::Error,
        prelude::*,
        receiver::{CommandHandler, HandlerFactory, NumberedCommandReceiver, ResultsWriter},
        root_mode::RootModeHandler,
        run_script::RunScriptHandler,
        script::ScriptManager,
    },
    knotline::{
        EventLoop, ExtensionManager, Future, LineRawData, LineRawParser, NetworkClient,
        NetworkConnection, ProtocolExtension,
    },
    std::{net::SocketAddr, sync::Arc},
};

/// Answers `HARNESS_INFO` with one `<harness id> <client count>` line.
pub struct HarnessInfoHandler {
    harness_id: String,
    num_clients: usize,
}

impl HarnessInfoHandler {
    pub fn factory(harness_id: String, num_clients: usize) -> HandlerFactory {
        Box::new(move || {
            Box::new(HarnessInfoHandler {
                harness_id: harness_id.clone(),
                num_clients,
            })
        })
    }
}

impl CommandHandler for HarnessInfoHandler {
    fn execute(&mut self, _data: LineRawData, results: ResultsWriter) {
        results.write_line(&format!("{} {}", self.harness_id, self.num_clients));
        results.send_ready();
    }
}

/// The stack a slave harness mounts over its connection to the master.
///
/// Serves RUNSCRIPT and HARNESS_INFO commands against the given script
/// manager, answers the SHUTDOWN root token, and sends the initial READY
/// that opens the master's command gate. `wait_until_shutdown` parks the
/// slave's main thread until the master dismisses it.
pub struct SlaveNetworkStack {
    connection: Arc<NetworkConnection>,
    receiver: Arc<NumberedCommandReceiver>,
    shutdown_future: Future<bool>,
}

impl SlaveNetworkStack {
    /// Connects to the master and mounts the stack.
    pub fn connect(
        event_loop: &EventLoop,
        master_addr: SocketAddr,
        script_manager: Arc<ScriptManager>,
        harness_id: &str,
        num_clients: usize,
    ) -> Result<Self> {
        let client = NetworkClient::new(event_loop);
        let status = client.connect_to_server(master_addr);
        let connection = match (status.success, status.connection) {
            (true, Some(connection)) => connection,
            _ => return Err(Error::MasterConnectFailed(master_addr)),
        };
        info!(master = %master_addr, "connected to the master harness");
        Ok(Self::over_connection(
            connection,
            script_manager,
            harness_id,
            num_clients,
        ))
    }

    /// Mounts the stack over an existing connection.
    pub fn over_connection(
        connection: Arc<NetworkConnection>,
        script_manager: Arc<ScriptManager>,
        harness_id: &str,
        num_clients: usize,
    ) -> Self {
        let write_queue = connection.write_queue();
        let receiver = Arc::new(NumberedCommandReceiver::new(write_queue.clone()));
        receiver.add_handler(
            crate::run_script::RUNSCRIPT_TOKEN,
            RunScriptHandler::factory(script_manager),
        );
        receiver.add_handler(
            "HARNESS_INFO",
            HarnessInfoHandler::factory(harness_id.to_string(), num_clients),
        );

        let shutdown_future: Future<bool> = Future::new();
        let shutdown_in_handler = shutdown_future.clone();
        let mut extensions = ExtensionManager::new();
        extensions.add_handler(
            "COMMAND",
            Arc::clone(&receiver) as Arc<dyn ProtocolExtension>,
        );
        extensions.add_handler(
            "SHUTDOWN",
            Arc::new(RootModeHandler::new(write_queue, move || {
                if !shutdown_in_handler.has_fired() {
                    shutdown_in_handler.fire(true);
                }
            })),
        );

        let mut parser = LineRawParser::new(extensions);
        connection.register_data_callback(Box::new(move |chunk| parser.feed(chunk)));

        // Open the master's gate for its first command.
        receiver.send_ready();

        Self {
            connection,
            receiver,
            shutdown_future,
        }
    }

    pub fn connection(&self) -> &Arc<NetworkConnection> {
        &self.connection
    }

    pub fn receiver(&self) -> &Arc<NumberedCommandReceiver> {
        &self.receiver
    }

    /// Blocks until the master sends SHUTDOWN.
    pub fn wait_until_shutdown(&self) {
        self.shutdown_future.wait();
    }
}
