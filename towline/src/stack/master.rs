use {
    super::network::NetworkProtocolStack,
    crate::{
        prelude::*,
        run_script::{RunScriptCommand, RunScriptFuture},
        sender::SharedResults,
    },
    knotline::{EventLoop, Future, Knot, LineRawData, NetworkServer},
    std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    },
};

/// One connected slave harness, as the master sees it.
pub struct SlaveHandle {
    stack: NetworkProtocolStack,
    run_script: RunScriptCommand,
}

impl SlaveHandle {
    fn new(stack: NetworkProtocolStack) -> Self {
        let run_script = RunScriptCommand::new(stack.numbered_sender());
        Self { stack, run_script }
    }

    pub fn stack(&self) -> &NetworkProtocolStack {
        &self.stack
    }

    /// Asks the slave to run a named script. `command_data` is the script
    /// name followed by its arguments; the futures fire on the slave's
    /// STARTED and FINISHED replies.
    pub fn run_script(&self, command_data: &LineRawData) -> (RunScriptFuture, RunScriptFuture) {
        let start: RunScriptFuture = Future::new();
        let complete: RunScriptFuture = Future::new();
        self.run_script
            .send_run_script(command_data, start.clone(), complete.clone());
        (start, complete)
    }

    /// Dismisses the slave. The returned future fires on its DONE
    /// acknowledgment.
    pub fn send_shutdown(&self) -> crate::root_mode::RootResultsFuture {
        crate::root_mode::RootModeCommand::shutdown(self.stack.root_sender()).schedule()
    }

    /// Asks the slave for its id and client count; the reply is a single
    /// `<id> <client count>` line.
    pub fn request_harness_info(&self) -> Future<SharedResults> {
        let future: Future<SharedResults> = Future::new();
        let completion = future.clone();
        let sender = self.stack.numbered_sender();
        let sender_in_cb = Arc::clone(&sender);
        sender.send_command(
            &Knot::from_static(b"HARNESS_INFO\n"),
            Arc::new(move |results: SharedResults| {
                sender_in_cb.remove_callback(results.command_id);
                completion.fire(results);
            }),
            None,
            None,
        );
        future
    }
}

/// The master harness's network front door.
///
/// Listens for slave harness connections, builds a protocol stack per
/// slave, and hands out [`SlaveHandle`]s keyed by arrival order.
pub struct MasterNetworkListener {
    server: NetworkServer,
    slaves: Arc<Mutex<Vec<Arc<SlaveHandle>>>>,
}

impl MasterNetworkListener {
    pub fn new(addr: SocketAddr, event_loop: &EventLoop) -> Result<Self> {
        let slaves: Arc<Mutex<Vec<Arc<SlaveHandle>>>> = Arc::new(Mutex::new(Vec::new()));
        let slaves_in_cb = Arc::clone(&slaves);
        let server = NetworkServer::new(
            addr,
            event_loop,
            Some(Box::new(move |id, connection| {
                info!(slave = id, "slave harness connected");
                let handle = Arc::new(SlaveHandle::new(NetworkProtocolStack::new(connection)));
                let mut slaves = slaves_in_cb.lock().unwrap();
                debug_assert!(slaves.len() == id);
                slaves.push(handle);
            })),
        )?;
        Ok(Self { server, slaves })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Blocks until `count` slaves have connected.
    pub fn wait_for_connections(&self, count: usize) {
        self.server.block_until_num_connections(count);
    }

    pub fn num_slaves(&self) -> usize {
        self.slaves.lock().unwrap().len()
    }

    pub fn slave(&self, id: usize) -> Option<Arc<SlaveHandle>> {
        self.slaves.lock().unwrap().get(id).cloned()
    }

    pub fn stop_listening(&self) {
        self.server.stop_listening();
    }
}
