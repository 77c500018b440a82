use {
    crate::prelude::*,
    knotline::{fatal, EventLoop, Knot, ProtocolExtension},
    std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    },
    towline::{
        spawn_sut, NumberedCommandSender, RootModeCommand, RootModeCommandSender, ScriptManager,
        SlaveNetworkStack, SutProtocolStack, TestScript,
    },
};

/// Sleeps for its single argument in milliseconds. The trivial remote
/// script, useful for pacing and liveness checks.
struct WaitScript {
    millis: u64,
}

impl TestScript for WaitScript {
    fn run(&self) {
        thread::sleep(Duration::from_millis(self.millis));
    }
}

/// Sends each of its argument lines to the local SUT as one numbered
/// command and waits for the results before moving on.
struct SutCommandScript {
    sender: Arc<NumberedCommandSender>,
    commands: Vec<String>,
}

impl TestScript for SutCommandScript {
    fn run(&self) {
        for command in &self.commands {
            let future = self
                .sender
                .send_command(&Knot::from_string(format!("{}\n", command)));
            let results = future.value();
            debug!(
                command_id = results.command_id,
                lines = results.results_received.size(),
                "SUT command complete"
            );
        }
    }
}

/// The SUT side of a slave, when one was requested.
struct SutSide {
    stack: Arc<SutProtocolStack>,
    root_sender: Arc<RootModeCommandSender>,
    shutting_down: Arc<AtomicBool>,
}

fn mount_sut(event_loop: &EventLoop, command: &str, manager: &mut ScriptManager) -> Result<SutSide> {
    let io = spawn_sut(command)?;
    let stack = Arc::new(SutProtocolStack::new(event_loop, io));

    let nc_sender = Arc::new(NumberedCommandSender::new(stack.ready_monitor(), None));
    stack.add_extension("RESULTS", Arc::clone(&nc_sender) as Arc<dyn ProtocolExtension>);
    let root_sender = Arc::new(RootModeCommandSender::new(stack.ready_monitor()));
    stack.add_extension("DONE", Arc::clone(&root_sender) as Arc<dyn ProtocolExtension>);

    let shutting_down = Arc::new(AtomicBool::new(false));
    let expected = Arc::clone(&shutting_down);
    stack.activate(Some(Box::new(move || {
        if expected.load(Ordering::SeqCst) {
            info!("SUT exited after SHUTDOWN");
        } else {
            // Losing the SUT mid-test invalidates the run.
            fatal!("SUT terminated unexpectedly");
        }
    })));

    info!("waiting for the SUT's initial READY");
    stack.wait_until_ready();

    manager.add_argument_script(
        "sut-command",
        Box::new(move |data| {
            Arc::new(SutCommandScript {
                sender: Arc::clone(&nc_sender),
                commands: (0..data.size()).map(|idx| data.get(idx).to_string()).collect(),
            })
        }),
    );

    Ok(SutSide {
        stack,
        root_sender,
        shutting_down,
    })
}

pub fn run(connect: SocketAddr, id: &str, sut_command: Option<&str>) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.start();

    let mut manager = ScriptManager::new();
    manager.add_argument_script(
        "wait-millis",
        Box::new(|data| {
            let millis = data.get(0).to_string().parse().unwrap_or_else(|_| {
                fatal!("wait-millis argument {:?} is not a duration", data.get(0))
            });
            Arc::new(WaitScript { millis })
        }),
    );

    let sut = match sut_command {
        Some(command) => Some(mount_sut(&event_loop, command, &mut manager)?),
        None => None,
    };
    let num_clients = sut.is_some() as usize;

    let slave_stack = SlaveNetworkStack::connect(
        &event_loop,
        connect,
        Arc::new(manager),
        id,
        num_clients,
    )?;
    info!(master = %connect, id, "serving scripts for the master harness");

    slave_stack.wait_until_shutdown();
    info!("master sent SHUTDOWN");

    if let Some(sut) = sut {
        sut.shutting_down.store(true, Ordering::SeqCst);
        RootModeCommand::shutdown(Arc::clone(&sut.root_sender))
            .schedule()
            .wait();
        sut.stack.wait_until_sut_dies();
    }

    event_loop.exit_loop_and_wait();
    Ok(())
}
