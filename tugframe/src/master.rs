use {
    crate::prelude::*,
    knotline::{fatal, EventLoop, Knot, LineRawData},
    std::{
        fs::File,
        io::BufReader,
        net::SocketAddr,
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    },
    towline::{
        run_in_thread, GeneralLogger, MasterNetworkListener, ScriptsFromFile, SlaveHandle,
        TestScript,
    },
};

/// One line of the master's workload: ask a slave to run a named script
/// and follow it to completion.
struct RemoteScript {
    slave: Arc<SlaveHandle>,
    command_data: LineRawData,
    description: String,
    logger: Arc<GeneralLogger>,
}

impl TestScript for RemoteScript {
    fn run(&self) {
        self.logger.log(&format!("STARTED {}", self.description));
        let (started, finished) = self.slave.run_script(&self.command_data);
        started.wait();
        self.logger
            .log(&format!("remote acknowledged {}", self.description));
        finished.wait();
        self.logger.log(&format!("FINISHED {}", self.description));
    }
}

/// Workload lines read `REMOTE <slave> <script> [args…]`; each argument
/// token becomes one line of the script's argument data.
fn remote_factory(listener: Arc<MasterNetworkListener>) -> ScriptsFromFile {
    let mut from_file = ScriptsFromFile::new();
    from_file.add_factory(
        "REMOTE",
        Box::new(move |rest, _dir, logger| {
            let mut tokens = rest.split_whitespace();
            let slave_id: usize = match tokens.next().map(str::parse) {
                Some(Ok(id)) => id,
                _ => fatal!("workload line {:?} does not start with a slave index", rest),
            };
            let slave = match listener.slave(slave_id) {
                Some(slave) => slave,
                None => fatal!("no connected slave with index {}", slave_id),
            };
            let mut command_data = LineRawData::new();
            let mut description = String::new();
            for token in tokens {
                if description.is_empty() {
                    description = token.to_string();
                }
                command_data.add_line(Knot::from_string(token.to_string()));
            }
            if command_data.is_empty() {
                fatal!("workload line {:?} names no script", rest);
            }
            Arc::new(RemoteScript {
                slave,
                command_data,
                description,
                logger,
            })
        }),
    );
    from_file
}

pub fn run(
    listen: SocketAddr,
    slaves: usize,
    scripts: &Path,
    log_dir: Option<&Path>,
) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.start();

    let listener = Arc::new(MasterNetworkListener::new(listen, &event_loop)?);
    info!(addr = %listener.local_addr(), slaves, "waiting for slave harnesses");
    listener.wait_for_connections(slaves);

    for id in 0..slaves {
        let info = listener
            .slave(id)
            .expect("connected slave vanished")
            .request_harness_info()
            .value();
        info!(slave = id, "harness info: {}", info.results_received.get(0));
    }

    let workload = remote_factory(Arc::clone(&listener));
    let input_dir = scripts.parent().unwrap_or_else(|| Path::new("."));
    let log_counter = AtomicUsize::new(0);
    let log_dir = log_dir.map(Path::to_path_buf);
    let tests = workload.tests_from_configuration(
        BufReader::new(File::open(scripts)?),
        input_dir,
        Box::new(move |_line| {
            let nth = log_counter.fetch_add(1, Ordering::SeqCst);
            match &log_dir {
                Some(dir) => {
                    let path = dir.join(format!("script-{:03}.log", nth));
                    Arc::new(
                        GeneralLogger::to_file(&path, true)
                            .unwrap_or_else(|err| {
                                fatal!("cannot open result log {:?}: {}", path, err)
                            }),
                    )
                }
                None => Arc::new(GeneralLogger::to_writer(Box::new(std::io::stderr()), true)),
            }
        }),
    )?;

    info!(count = tests.len(), "running the workload");
    for (script, logger) in tests {
        // One at a time: workload order often encodes modify-then-verify
        // dependencies.
        run_in_thread(script).wait();
        logger.flush();
    }

    info!("workload complete, dismissing slaves");
    for id in 0..slaves {
        listener
            .slave(id)
            .expect("connected slave vanished")
            .send_shutdown()
            .wait();
    }

    event_loop.exit_loop_and_wait();
    Ok(())
}
