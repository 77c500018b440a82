//! The numbered command/results protocol against a fixture SUT: simple
//! round trips, out-of-order results, and multi-results commands.

mod common;

use {
    common::SutFixture,
    knotline::{Knot, ProtocolExtension},
    std::sync::{Arc, Mutex},
    towline::{MultiNumberedCommandSender, NumberedCommandSender, SharedResults},
};

fn expect_command(fixture: &SutFixture, id: u64, body: &[&str]) {
    assert_eq!(fixture.harness_sent_line(), format!("COMMAND {}", id));
    for line in body {
        assert_eq!(fixture.harness_sent_line(), *line);
    }
    assert_eq!(fixture.harness_sent_line(), "ENDCOMMAND");
}

#[test]
fn simple_numbered_round_trip() {
    let fixture = SutFixture::new();
    let sender = Arc::new(NumberedCommandSender::new(
        fixture.stack.ready_monitor(),
        None,
    ));
    fixture
        .stack
        .add_extension("RESULTS", Arc::clone(&sender) as Arc<dyn ProtocolExtension>);
    fixture.activate_and_start();

    fixture.sut_says("READY");
    fixture.stack.wait_until_ready();

    let (future, id) = sender.send_command_full(&Knot::from("HELLO\n"), None, None);
    expect_command(&fixture, id, &["HELLO"]);

    fixture.sut_says(&format!("RESULTS {}", id));
    fixture.sut_says("and hello");
    fixture.sut_says("ENDRESULTS");

    let results = future.value();
    assert_eq!(results.command_id, id);
    assert_eq!(results.results_received.size(), 1);
    assert!(!results.results_received.is_raw(0));
    assert_eq!(*results.results_received.get(0), "and hello");

    fixture.shutdown();
}

#[test]
fn results_correlate_out_of_order() {
    let fixture = SutFixture::new();
    let sender = Arc::new(NumberedCommandSender::new(
        fixture.stack.ready_monitor(),
        None,
    ));
    fixture
        .stack
        .add_extension("RESULTS", Arc::clone(&sender) as Arc<dyn ProtocolExtension>);
    fixture.activate_and_start();

    let (future_a, id_a) = sender.send_command_full(&Knot::from("first\n"), None, None);
    let (future_b, id_b) = sender.send_command_full(&Knot::from("second\n"), None, None);
    let (future_c, id_c) = sender.send_command_full(&Knot::from("third\n"), None, None);

    for (id, body) in [(id_a, "first"), (id_b, "second"), (id_c, "third")]
        .iter()
        .copied()
    {
        fixture.sut_says("READY");
        expect_command(&fixture, id, &[body]);
    }

    // Replies arrive in a different order than the sends.
    fixture.sut_says(&format!("RESULTS {}", id_b));
    fixture.sut_says("HELLO!!");
    fixture.sut_says("ENDRESULTS");

    fixture.sut_says(&format!("RESULTS {}", id_a));
    fixture.sut_says("r0");
    fixture.sut_says_raw(b"RAW\n3\nabcENDRAW\n");
    fixture.sut_says("ENDRESULTS");

    fixture.sut_says(&format!("RESULTS {}", id_c));
    fixture.sut_says_raw(b"RAW\n2\nzzENDRAW\n");
    fixture.sut_says("ENDRESULTS");

    let results_b = future_b.value();
    assert_eq!(results_b.results_received.size(), 1);
    assert_eq!(*results_b.results_received.get(0), "HELLO!!");

    let results_a = future_a.value();
    assert_eq!(results_a.results_received.size(), 2);
    assert_eq!(*results_a.results_received.get(0), "r0");
    assert!(results_a.results_received.is_raw(1));
    assert_eq!(*results_a.results_received.get(1), "abc");

    let results_c = future_c.value();
    assert_eq!(results_c.results_received.size(), 1);
    assert!(results_c.results_received.is_raw(0));
    assert_eq!(*results_c.results_received.get(0), "zz");

    fixture.shutdown();
}

#[test]
fn multi_results_keep_flowing_until_removed() {
    let fixture = SutFixture::new();
    let sender = Arc::new(MultiNumberedCommandSender::new(
        fixture.stack.ready_monitor(),
        None,
    ));
    fixture
        .stack
        .add_extension("RESULTS", Arc::clone(&sender) as Arc<dyn ProtocolExtension>);
    fixture.activate_and_start();

    let collected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let id = sender.send_command(
        &Knot::from("progress please\n"),
        Arc::new(move |results: SharedResults| {
            sink.lock()
                .unwrap()
                .push(results.results_received.get(0).to_string());
        }),
        None,
        None,
    );

    fixture.sut_says("READY");
    expect_command(&fixture, id, &["progress please"]);

    for reply in ["STARTED", "HALFWAY", "FINISHED"].iter().copied() {
        fixture.sut_says(&format!("RESULTS {}", id));
        fixture.sut_says(reply);
        fixture.sut_says("ENDRESULTS");
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while collected.lock().unwrap().len() < 3 {
        assert!(std::time::Instant::now() < deadline);
        std::thread::yield_now();
    }
    assert_eq!(
        *collected.lock().unwrap(),
        vec!["STARTED", "HALFWAY", "FINISHED"]
    );

    assert_eq!(sender.outstanding_commands(), 1);
    sender.remove_callback(id);
    assert_eq!(sender.outstanding_commands(), 0);

    fixture.shutdown();
}

#[test]
fn sent_callback_reports_the_released_id() {
    let fixture = SutFixture::new();
    let sender = Arc::new(NumberedCommandSender::new(
        fixture.stack.ready_monitor(),
        None,
    ));
    fixture
        .stack
        .add_extension("RESULTS", Arc::clone(&sender) as Arc<dyn ProtocolExtension>);
    fixture.activate_and_start();

    let sent_id: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
    let sent_in_cb = Arc::clone(&sent_id);
    let (future, id) = sender.send_command_full(
        &Knot::from("ping\n"),
        Some(Box::new(move |command_id| {
            *sent_in_cb.lock().unwrap() = Some(command_id);
        })),
        None,
    );

    // Queued is not sent.
    assert!(sent_id.lock().unwrap().is_none());

    fixture.sut_says("READY");
    expect_command(&fixture, id, &["ping"]);
    assert_eq!(*sent_id.lock().unwrap(), Some(id));

    fixture.sut_says(&format!("RESULTS {}", id));
    fixture.sut_says("ENDRESULTS");
    assert!(future.value().results_received.is_empty());

    fixture.shutdown();
}
