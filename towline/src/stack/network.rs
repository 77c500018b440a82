use {
    crate::{
        ready::ReadyMonitor, root_mode::RootModeCommandSender, sender::MultiNumberedCommandSender,
    },
    knotline::{ExtensionManager, LineRawParser, NetworkConnection, ProtocolExtension},
    std::sync::Arc,
};

/// The per-connection protocol stack a listening harness builds when a
/// peer connects: READY tracking, the multi-results numbered-command
/// sender, and a root-mode sender for the bare tokens (SHUTDOWN), all
/// mounted over the socket. Subsystems that need more protocols (a
/// run-script command, say) layer them on the sender this exposes.
pub struct NetworkProtocolStack {
    connection: Arc<NetworkConnection>,
    ready_monitor: Arc<ReadyMonitor>,
    nc_sender: Arc<MultiNumberedCommandSender>,
    root_sender: Arc<RootModeCommandSender>,
}

impl NetworkProtocolStack {
    pub fn new(connection: Arc<NetworkConnection>) -> Self {
        let ready_monitor = Arc::new(ReadyMonitor::new(connection.write_queue()));
        let nc_sender = Arc::new(MultiNumberedCommandSender::new(
            Arc::clone(&ready_monitor),
            None,
        ));
        let root_sender = Arc::new(RootModeCommandSender::new(Arc::clone(&ready_monitor)));

        let mut extensions = ExtensionManager::new();
        extensions.add_handler("READY", Arc::clone(&ready_monitor) as Arc<dyn ProtocolExtension>);
        extensions.add_handler("RESULTS", Arc::clone(&nc_sender) as Arc<dyn ProtocolExtension>);
        extensions.add_handler("DONE", Arc::clone(&root_sender) as Arc<dyn ProtocolExtension>);

        let mut parser = LineRawParser::new(extensions);
        connection.register_data_callback(Box::new(move |chunk| parser.feed(chunk)));

        Self {
            connection,
            ready_monitor,
            nc_sender,
            root_sender,
        }
    }

    pub fn connection(&self) -> &Arc<NetworkConnection> {
        &self.connection
    }

    pub fn ready_monitor(&self) -> Arc<ReadyMonitor> {
        Arc::clone(&self.ready_monitor)
    }

    pub fn numbered_sender(&self) -> Arc<MultiNumberedCommandSender> {
        Arc::clone(&self.nc_sender)
    }

    pub fn root_sender(&self) -> Arc<RootModeCommandSender> {
        Arc::clone(&self.root_sender)
    }
}
