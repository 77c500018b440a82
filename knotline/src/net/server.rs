use {
    super::connection::NetworkConnection,
    crate::{event_loop::EventLoop, prelude::*},
    std::{
        net::SocketAddr,
        sync::{Arc, Condvar, Mutex},
    },
};

/// Called with the connection id (arrival order, from 0) and the new
/// connection. Runs on the read thread; the connection does not count as
/// complete until it returns, and it must not call back into the server.
pub type ServerConnectionCallback = Box<dyn FnMut(usize, Arc<NetworkConnection>) + Send>;

/// Listens on an address and keeps every accepted connection.
///
/// Connection ids are stable for the life of the server; disconnects are
/// not tracked here, they surface through each connection's EOF callback.
pub struct NetworkServer {
    event_loop: EventLoop,
    addr: SocketAddr,
    inner: Arc<ServerInner>,
}

struct ServerInner {
    connections: Mutex<Vec<Arc<NetworkConnection>>>,
    connections_changed: Condvar,
}

impl NetworkServer {
    pub fn new(
        addr: SocketAddr,
        event_loop: &EventLoop,
        mut cb: Option<ServerConnectionCallback>,
    ) -> Result<Self> {
        let inner = Arc::new(ServerInner {
            connections: Mutex::new(Vec::new()),
            connections_changed: Condvar::new(),
        });
        let accept_inner = Arc::clone(&inner);
        let local = event_loop.listen(
            addr,
            Box::new(move |connection| {
                let connection = Arc::new(connection);
                {
                    let mut connections = accept_inner.connections.lock().unwrap();
                    let id = connections.len();
                    connections.push(Arc::clone(&connection));
                    // The callback completes under the lock so nobody
                    // observes the new count before it has run.
                    if let Some(cb) = cb.as_mut() {
                        cb(id, connection);
                    }
                }
                accept_inner.connections_changed.notify_all();
            }),
        )?;
        Ok(Self {
            event_loop: event_loop.clone(),
            addr: local,
            inner,
        })
    }

    /// The address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop_listening(&self) {
        self.event_loop.stop_listening(self.addr);
    }

    pub fn num_connections(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    /// Blocks until at least `desired` clients have connected.
    pub fn block_until_num_connections(&self, desired: usize) {
        let mut connections = self.inner.connections.lock().unwrap();
        while connections.len() < desired {
            connections = self.inner.connections_changed.wait(connections).unwrap();
        }
    }

    pub fn connection_by_id(&self, id: usize) -> Option<Arc<NetworkConnection>> {
        self.inner.connections.lock().unwrap().get(id).cloned()
    }
}

impl Drop for NetworkServer {
    fn drop(&mut self) {
        debug!(addr = %self.addr, "network server dropped");
    }
}
