//! Full SUT stacks: the sample SET/GO vocabulary over fixture pipes, and
//! a real child process driven through READY and SHUTDOWN.

mod common;

use {
    common::SutFixture,
    knotline::{EventLoop, Knot, LineRawData, ProtocolExtension},
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    towline::{
        spawn_sut, GenericNumberedCommand, NumberedCommandSender, RootModeCommand,
        RootModeCommandSender, SutProtocolStack,
    },
};

/// The SET command asks the notional SUT to reply with that many GO
/// lines, e.g. `SET 3` inside a numbered command yields three `GO` result
/// lines.
struct SampleStack {
    fixture: SutFixture,
    set_command: GenericNumberedCommand,
    root_sender: Arc<RootModeCommandSender>,
}

impl SampleStack {
    fn new() -> Self {
        let fixture = SutFixture::new();
        let nc_sender = Arc::new(NumberedCommandSender::new(
            fixture.stack.ready_monitor(),
            None,
        ));
        fixture
            .stack
            .add_extension("RESULTS", Arc::clone(&nc_sender) as Arc<dyn ProtocolExtension>);

        let root_sender = Arc::new(RootModeCommandSender::new(fixture.stack.ready_monitor()));
        fixture
            .stack
            .add_extension("DONE", Arc::clone(&root_sender) as Arc<dyn ProtocolExtension>);

        fixture.activate_and_start();
        Self {
            fixture,
            set_command: GenericNumberedCommand::new("SET", nc_sender),
            root_sender,
        }
    }
}

#[test]
fn sample_sut_session_runs_set_then_shutdown() {
    let stack = SampleStack::new();
    let fixture = &stack.fixture;
    const REPS: usize = 3;

    fixture.sut_says("READY");
    fixture.stack.wait_until_ready();

    let mut data = LineRawData::new();
    data.add_line(Knot::from_string(REPS.to_string()));
    let future = stack.set_command.schedule(&data);

    let command_line = fixture.harness_sent_line();
    assert!(command_line.starts_with("COMMAND "));
    let id: u64 = command_line["COMMAND ".len()..].parse().unwrap();
    assert_eq!(fixture.harness_sent_line(), format!("SET {}", REPS));
    assert_eq!(fixture.harness_sent_line(), "ENDCOMMAND");

    fixture.sut_says(&format!("RESULTS {}", id));
    for _ in 0..REPS {
        fixture.sut_says("GO");
    }
    fixture.sut_says("ENDRESULTS");
    fixture.sut_says("READY");
    fixture.stack.wait_until_ready();

    let results = future.value();
    assert_eq!(results.results_received.size(), REPS);
    for idx in 0..REPS {
        assert_eq!(*results.results_received.get(idx), "GO");
    }

    let done = RootModeCommand::shutdown(Arc::clone(&stack.root_sender)).schedule();
    assert_eq!(fixture.harness_sent_line(), "SHUTDOWN");
    fixture.sut_says("DONE");
    assert_eq!(*done.value().get(0), "DONE");

    stack.fixture.shutdown();
}

/// A minimal shell SUT: announces READY, waits for one line, answers
/// DONE, and exits.
fn write_sut_script() -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join(format!("sut-script-{}.sh", std::process::id()));
    std::fs::write(&path, "#!/bin/sh\necho READY\nread line\necho DONE\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[test]
fn real_child_process_speaks_the_protocol() {
    let script_path = write_sut_script();
    let event_loop = EventLoop::new().unwrap();

    let io = spawn_sut(script_path.to_str().unwrap()).unwrap();
    let stack = SutProtocolStack::new(&event_loop, io);
    let root_sender = Arc::new(RootModeCommandSender::new(stack.ready_monitor()));
    stack.add_extension("DONE", Arc::clone(&root_sender) as Arc<dyn ProtocolExtension>);

    let terminated = Arc::new(AtomicBool::new(false));
    let terminated_in_cb = Arc::clone(&terminated);
    stack.activate(Some(Box::new(move || {
        terminated_in_cb.store(true, Ordering::SeqCst);
    })));
    event_loop.start();

    stack.wait_until_ready();

    let done = RootModeCommand::shutdown(Arc::clone(&root_sender)).schedule();
    assert_eq!(*done.value().get(0), "DONE");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !terminated.load(Ordering::SeqCst) {
        assert!(std::time::Instant::now() < deadline, "EOF callback never ran");
        std::thread::yield_now();
    }
    stack.wait_until_sut_dies();

    event_loop.exit_loop_and_wait();
    let _ = std::fs::remove_file(script_path);
}
