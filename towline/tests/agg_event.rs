//! Streamed aggregation with event messages interleaved inside the
//! RESULTS block.

mod common;

use {
    common::SutFixture,
    knotline::{AggregatingFuture, CharCountAggregator, ConcatAggregator, Knot, ProtocolExtension},
    std::sync::{Arc, Mutex},
    towline::{AggNumberedCommandSender, EventMessageMonitor},
};

struct AggFixture {
    fixture: SutFixture,
    sender: Arc<AggNumberedCommandSender>,
    monitor: Arc<EventMessageMonitor>,
}

impl AggFixture {
    fn new() -> Self {
        let fixture = SutFixture::new();
        let monitor = Arc::new(EventMessageMonitor::new());
        let sender = Arc::new(AggNumberedCommandSender::new(
            fixture.stack.ready_monitor(),
            Some(Arc::clone(&monitor)),
        ));
        fixture
            .stack
            .add_extension("RESULTS", Arc::clone(&sender) as Arc<dyn ProtocolExtension>);
        fixture
            .stack
            .add_extension("EVENTMSG", Arc::clone(&monitor) as Arc<dyn ProtocolExtension>);
        fixture.activate_and_start();
        Self {
            fixture,
            sender,
            monitor,
        }
    }
}

#[test]
fn char_counts_fold_while_events_route_aside() {
    let harness = AggFixture::new();
    let fixture = &harness.fixture;

    let event_log: Arc<Mutex<Vec<(u64, u64, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let event_sink = Arc::clone(&event_log);

    let aggregating = AggregatingFuture::new(CharCountAggregator::new());
    let total = aggregating.future();
    let id = harness.sender.send_command(
        &Knot::from("COUNT ALL THE THINGS\n"),
        Box::new(aggregating),
        None,
        Some(Arc::new(move |command_id, event_id, info: Knot| {
            event_sink
                .lock()
                .unwrap()
                .push((command_id, event_id, info.to_string()));
        })),
    );

    fixture.sut_says("READY");
    assert_eq!(fixture.harness_sent_line(), format!("COMMAND {}", id));
    assert_eq!(fixture.harness_sent_line(), "COUNT ALL THE THINGS");
    assert_eq!(fixture.harness_sent_line(), "ENDCOMMAND");

    fixture.sut_says(&format!("RESULTS {}", id));
    fixture.sut_says("So ");
    fixture.sut_says_raw(b"RAW\n2\nahENDRAW\n");
    fixture.sut_says("EVENTMSG");
    fixture.sut_says(&format!("{} 5", id));
    fixture.sut_says("What's up doc");
    fixture.sut_says("EVENTMSG");
    fixture.sut_says(&format!("{} 3 Wascally Wabbit", id));
    fixture.sut_says("EVENTMSG");
    fixture.sut_says(&format!("{} 2", id));
    fixture.sut_says("That's all folks");
    fixture.sut_says("ENDRESULTS");

    // "So " + "ah" + the two non-event result lines.
    assert_eq!(total.value(), 34);
    assert_eq!(
        *event_log.lock().unwrap(),
        vec![
            (id, 5, String::new()),
            (id, 3, "Wascally Wabbit".to_string()),
            (id, 2, String::new()),
        ]
    );
    assert_eq!(harness.sender.outstanding_commands(), 0);

    harness.fixture.shutdown();
}

#[test]
fn events_route_by_their_own_command_id() {
    let harness = AggFixture::new();
    let fixture = &harness.fixture;

    // A callback for some other command, registered directly.
    let other_log: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let other_sink = Arc::clone(&other_log);
    let foreign_id = 99_000_000;
    harness.monitor.register_callback(
        foreign_id,
        Arc::new(move |_command_id, event_id, _info| {
            other_sink.lock().unwrap().push(event_id);
        }),
    );

    let aggregating = AggregatingFuture::new(ConcatAggregator::new());
    let body = aggregating.future();
    let id = harness
        .sender
        .send_command(&Knot::from("GO\n"), Box::new(aggregating), None, None);

    fixture.sut_says("READY");
    assert_eq!(fixture.harness_sent_line(), format!("COMMAND {}", id));
    assert_eq!(fixture.harness_sent_line(), "GO");
    assert_eq!(fixture.harness_sent_line(), "ENDCOMMAND");

    // An event for the foreign command arrives inside this command's
    // RESULTS block; it must not reach this command's aggregator.
    fixture.sut_says(&format!("RESULTS {}", id));
    fixture.sut_says("kept");
    fixture.sut_says("EVENTMSG");
    fixture.sut_says(&format!("{} 7", foreign_id));
    fixture.sut_says("ENDRESULTS");

    assert_eq!(body.value(), "kept");
    assert_eq!(*other_log.lock().unwrap(), vec![7]);

    harness.fixture.shutdown();
}

#[test]
fn standalone_event_between_frames_is_dispatched() {
    let harness = AggFixture::new();
    let fixture = &harness.fixture;

    let log: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    harness.monitor.register_callback(
        5,
        Arc::new(move |command_id, event_id, _info| {
            sink.lock().unwrap().push((command_id, event_id));
        }),
    );

    fixture.sut_says("EVENTMSG");
    fixture.sut_says("5 11");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while log.lock().unwrap().is_empty() {
        assert!(std::time::Instant::now() < deadline);
        std::thread::yield_now();
    }
    assert_eq!(*log.lock().unwrap(), vec![(5, 11)]);

    harness.fixture.shutdown();
}
