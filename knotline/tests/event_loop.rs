//! End-to-end checks of the event loop over real pipes and sockets.

use {
    crossbeam_channel::unbounded,
    knotline::{pipe, EventLoop, Knot, NetworkClient, NetworkServer},
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
};

fn write_all(fd: i32, bytes: &[u8]) {
    let mut offset = 0;
    while offset < bytes.len() {
        let rc = unsafe {
            libc::write(
                fd,
                bytes[offset..].as_ptr() as *const _,
                bytes.len() - offset,
            )
        };
        assert!(rc > 0, "write failed");
        offset += rc as usize;
    }
}

fn read_exact(fd: i32, want: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(want);
    let mut buf = [0u8; 4096];
    while out.len() < want {
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        assert!(rc > 0, "read failed");
        out.extend_from_slice(&buf[..rc as usize]);
    }
    out
}

#[test]
fn pipe_data_reaches_the_callback() {
    let event_loop = EventLoop::new().unwrap();
    let (pipe_read, pipe_write) = pipe().unwrap();

    let (tx, rx) = unbounded::<Vec<u8>>();
    event_loop.register_data_callback(
        pipe_read.raw(),
        Box::new(move |knot: Knot| {
            tx.send(knot.to_vec()).unwrap();
        }),
    );
    event_loop.start();

    write_all(pipe_write.raw(), b"hello from the pipe");
    let mut received = Vec::new();
    while received.len() < 19 {
        received.extend(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(received, b"hello from the pipe");

    event_loop.exit_loop_and_wait();
}

#[test]
fn eof_callback_fires_when_writer_closes() {
    let event_loop = EventLoop::new().unwrap();
    let (pipe_read, pipe_write) = pipe().unwrap();

    let (tx, rx) = unbounded::<()>();
    event_loop.register_data_callback(pipe_read.raw(), Box::new(|_| ()));
    event_loop.register_eof_callback(
        pipe_read.raw(),
        Box::new(move || {
            tx.send(()).unwrap();
        }),
    );
    event_loop.start();

    write_all(pipe_write.raw(), b"last words\n");
    drop(pipe_write);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    event_loop.exit_loop_and_wait();
}

#[test]
fn write_queue_preserves_order_and_is_shared() {
    let event_loop = EventLoop::new().unwrap();
    let (pipe_read, pipe_write) = pipe().unwrap();
    event_loop.start();

    let queue_a = event_loop.get_write_queue(pipe_write.raw());
    let queue_b = event_loop.get_write_queue(pipe_write.raw());

    let sent = Arc::new(AtomicUsize::new(0));
    for idx in 0..10 {
        let queue = if idx % 2 == 0 { &queue_a } else { &queue_b };
        let sent = Arc::clone(&sent);
        queue
            .write_with_callback(Knot::from_string(format!("line {}\n", idx)), move || {
                sent.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let mut expected = String::new();
    for idx in 0..10 {
        expected.push_str(&format!("line {}\n", idx));
    }
    let received = read_exact(pipe_read.raw(), expected.len());
    assert_eq!(received, expected.as_bytes());
    assert_eq!(sent.load(Ordering::SeqCst), 10);

    event_loop.exit_loop_and_wait();
}

#[test]
fn tcp_round_trip_through_server_and_client() {
    let event_loop = EventLoop::new().unwrap();
    event_loop.start();

    let server = NetworkServer::new("127.0.0.1:0".parse().unwrap(), &event_loop, None).unwrap();
    let addr = server.local_addr();

    let client = NetworkClient::new(&event_loop);
    let status = client.connect_to_server(addr);
    assert!(status.success);
    let client_conn = status.connection.unwrap();

    server.block_until_num_connections(1);
    let server_conn = server.connection_by_id(0).unwrap();

    // Client -> server.
    let (tx, rx) = unbounded::<Vec<u8>>();
    server_conn.register_data_callback(Box::new(move |knot: Knot| {
        tx.send(knot.to_vec()).unwrap();
    }));
    client_conn
        .write_queue()
        .write(Knot::from("over the wire\n"))
        .unwrap();
    let mut received = Vec::new();
    while received.len() < 14 {
        received.extend(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(received, b"over the wire\n");

    // Server -> client.
    let (tx_back, rx_back) = unbounded::<Vec<u8>>();
    client_conn.register_data_callback(Box::new(move |knot: Knot| {
        tx_back.send(knot.to_vec()).unwrap();
    }));
    server_conn
        .write_queue()
        .write(Knot::from("and back\n"))
        .unwrap();
    let mut returned = Vec::new();
    while returned.len() < 9 {
        returned.extend(rx_back.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(returned, b"and back\n");

    event_loop.exit_loop_and_wait();
}

#[test]
fn failed_connect_reports_unsuccessful_status() {
    let event_loop = EventLoop::new().unwrap();
    event_loop.start();

    // Bind a listener just to learn a free port, then close it again.
    let vacated = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let client = NetworkClient::new(&event_loop);
    let status = client.connect_to_server(vacated);
    assert!(!status.success);
    assert!(status.connection.is_none());

    event_loop.exit_loop_and_wait();
}
