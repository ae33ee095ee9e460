pub mod connection;
pub mod metrics;
pub mod slab;
pub mod worker;

use crate::config::models::Config;
use crate::config::parser::validate;
use crate::error::ServerError;
use crate::handlers::static_files::DocumentRoot;
use crate::network::poll::{ Poller, WAKER_TOKEN };
use crate::network::socket::set_linger_reset;
use crate::server::connection::{ ProcessOutcome, WriteOutcome };
use crate::server::metrics::ServerMetrics;
use crate::server::slab::{ ConnectionSlab, SlotKey };
use crate::server::worker::{ Completion, Job, WorkerPool };

use crossbeam_channel::Receiver;
use mio::event::Event;
use mio::net::{ TcpListener, TcpStream };
use mio::{ Events, Interest, Token, Waker };
use std::io::{ self, Write };
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use tracing::{ debug, error, info, trace, warn };

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);

/// Sent to clients turned away because every slot is taken.
const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake reactor for shutdown");
        }
    }
}

/// The reactor thread and connection lifecycle controller.
///
/// All socket I/O happens here. A connection with a buffered request is
/// moved to the worker pool for parsing and response staging and comes
/// back through the completion channel; while it is away, readiness for
/// its socket is only recorded on its slot.
pub struct Server {
    config: Arc<Config>,
    poller: Poller,
    listener: Option<TcpListener>,
    slab: ConnectionSlab,
    pool: WorkerPool,
    completions: Receiver<Completion>,
    metrics: Arc<ServerMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        validate(&config)?;
        let config = Arc::new(config);

        let poller = Poller::new()?;
        let metrics = Arc::new(ServerMetrics::default());
        let docs = Arc::new(DocumentRoot::from_config(&config));
        let (done, completions) = crossbeam_channel::unbounded();
        let pool = WorkerPool::new(
            config.workers,
            docs,
            Arc::clone(&metrics),
            done,
            poller.waker()
        )?;
        let slab = ConnectionSlab::new(
            config.max_connections,
            config.read_buffer_size,
            config.write_buffer_size
        );

        Ok(Self {
            config,
            poller,
            listener: None,
            slab,
            pool,
            completions,
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn bind(&mut self) -> Result<SocketAddr, ServerError> {
        let addr = self.config
            .listen_addr()
            .map_err(|e| crate::error::ConfigError::Invalid(e.to_string()))?;
        let mut listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
            addr,
            source,
        })?;
        self.poller.add(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let local = listener.local_addr()?;
        info!(
            address = %local,
            root = %self.config.document_root.display(),
            workers = self.pool.size(),
            "listening"
        );
        self.listener = Some(listener);
        Ok(local)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: self.poller.waker(),
        }
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the event loop until a [`ShutdownHandle`] fires.
    pub fn run(&mut self) -> Result<(), ServerError> {
        if self.listener.is_none() {
            return Err(ServerError::NotBound);
        }
        let mut events = Events::with_capacity(self.config.events_capacity);

        info!("reactor started");
        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poller.wait(&mut events, None) {
                error!(error = %e, "poll failed");
                self.close_all();
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    WAKER_TOKEN => self.on_completions(),
                    token => self.handle_client_event(SlotKey::from_token(token), event),
                }
            }
        }

        self.close_all();
        info!(served = self.metrics.req_count(), "reactor stopped");
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };
            match listener.accept() {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn accept(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        let Some(key) = self.slab.allocate() else {
            warn!(peer = %peer, live = self.metrics.active_conns(), "connection limit reached");
            if let Err(e) = stream.write(BUSY_MESSAGE) {
                debug!(peer = %peer, error = %e, "failed to send busy notice");
            }
            return;
        };

        if self.config.linger_reset {
            if let Err(e) = set_linger_reset(stream.as_raw_fd()) {
                debug!(peer = %peer, error = %e, "failed to set SO_LINGER");
            }
        }
        if let Err(e) = self.poller.add(&mut stream, key.token(), Interest::READABLE) {
            warn!(peer = %peer, error = %e, "failed to register connection");
            self.slab.free(key);
            return;
        }
        if let Some(conn) = self.slab.conn_mut(key) {
            conn.init(stream, peer);
        }

        self.metrics.inc_conn();
        debug!(peer = %peer, slot = key.index, live = self.metrics.active_conns(), "accepted");
    }

    fn handle_client_event(&mut self, key: SlotKey, event: &Event) {
        let Some(slot) = self.slab.get_mut(key) else {
            trace!(slot = key.index, "event for a stale slot");
            return;
        };

        if slot.is_lent() {
            if event.is_error() {
                slot.request_close();
            } else if event.is_readable() || event.is_read_closed() {
                slot.mark_pending_read();
            }
            return;
        }

        if event.is_error() {
            self.close(key);
            return;
        }
        if event.is_readable() || event.is_read_closed() {
            self.on_readable(key);
        }
        if event.is_writable() {
            self.on_writable(key);
        }
    }

    fn on_readable(&mut self, key: SlotKey) {
        let Some(conn) = self.slab.conn_mut(key) else {
            return;
        };
        if conn.has_pending_response() {
            return;
        }

        match conn.fill() {
            Ok(n) => {
                trace!(slot = key.index, bytes = n, "read");
                self.dispatch(key);
            }
            Err(e) => {
                debug!(slot = key.index, error = %e, "read failed");
                self.close(key);
            }
        }
    }

    fn dispatch(&mut self, key: SlotKey) {
        let Some(conn) = self.slab.lend(key) else {
            return;
        };
        if let Err(job) = self.pool.submit(Job { key, conn }) {
            warn!(slot = key.index, "worker pool is gone");
            if let Err(mut conn) = self.slab.restore(key, job.conn) {
                conn.release();
            }
            self.close(key);
        }
    }

    fn on_writable(&mut self, key: SlotKey) {
        let Some(conn) = self.slab.conn_mut(key) else {
            return;
        };

        match conn.write() {
            Ok(WriteOutcome::Pending) => {}
            Ok(WriteOutcome::KeepAlive { pipelined }) => {
                trace!(slot = key.index, pipelined, "keep-alive reset");
                if self.rearm(key, Interest::READABLE) && pipelined {
                    self.dispatch(key);
                }
            }
            Ok(WriteOutcome::Idle) => {
                self.rearm(key, Interest::READABLE);
            }
            Ok(WriteOutcome::Finished) => self.close(key),
            Err(e) => {
                debug!(slot = key.index, error = %e, "write failed");
                self.close(key);
            }
        }
    }

    fn on_completions(&mut self) {
        while let Ok(Completion { key, conn, outcome }) = self.completions.try_recv() {
            let slot = match self.slab.restore(key, conn) {
                Ok(slot) => slot,
                Err(mut conn) => {
                    if let Some(mut stream) = conn.release() {
                        let _ = self.poller.delete(&mut stream);
                    }
                    continue;
                }
            };
            if slot.close_requested() {
                self.close(key);
                continue;
            }
            let pending_read = slot.take_pending_read();

            match outcome {
                ProcessOutcome::NeedMoreInput => {
                    if pending_read {
                        self.on_readable(key);
                    }
                }
                ProcessOutcome::ResponseReady(status) => {
                    trace!(slot = key.index, status = status.as_u16(), "response ready");
                    self.rearm(key, Interest::WRITABLE);
                }
                ProcessOutcome::Close(e) => {
                    debug!(slot = key.index, error = %e, "closing after processing");
                    self.close(key);
                }
            }
        }
    }

    // Switching interest re-reports readiness that is already pending.
    fn rearm(&mut self, key: SlotKey, interest: Interest) -> bool {
        let Some(stream) = self.slab.conn_mut(key).and_then(|c| c.stream_mut()) else {
            return false;
        };
        if let Err(e) = self.poller.modify(stream, key.token(), interest) {
            warn!(slot = key.index, error = %e, "failed to reregister");
            self.close(key);
            return false;
        }
        true
    }

    fn close(&mut self, key: SlotKey) {
        let Some(slot) = self.slab.get_mut(key) else {
            return;
        };
        if slot.is_lent() {
            slot.request_close();
            return;
        }

        let mut peer = None;
        if let Some(conn) = slot.conn_mut() {
            peer = conn.peer();
            if let Some(mut stream) = conn.release() {
                if let Err(e) = self.poller.delete(&mut stream) {
                    trace!(slot = key.index, error = %e, "deregister failed");
                }
            }
        }
        self.slab.free(key);
        self.metrics.dec_conn();

        match peer {
            Some(peer) =>
                debug!(peer = %peer, slot = key.index, live = self.metrics.active_conns(), "closed"),
            None => debug!(slot = key.index, live = self.metrics.active_conns(), "closed"),
        }
    }

    fn close_all(&mut self) {
        self.pool.shutdown();
        while let Ok(Completion { key, conn, .. }) = self.completions.try_recv() {
            if let Err(mut conn) = self.slab.restore(key, conn) {
                conn.release();
            }
        }
        for key in self.slab.keys() {
            self.close(key);
        }
        self.listener = None;
    }
}
