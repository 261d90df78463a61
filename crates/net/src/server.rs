//! TCP server: accept loop + fixed worker pool.
//!
//! The main thread accepts connections and hands them to a pool of worker
//! threads over a bounded channel; workers run the per-connection command
//! loop against a shared engine. Shutdown is cooperative through an atomic
//! flag checked by the non-blocking accept loop.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use engine::Engine;

use crate::connection::Connection;
use crate::NetError;

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker thread count; 0 means one per available CPU.
    pub workers: usize,
    /// Connections accepted before new ones are turned away.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_connections: 1024,
        }
    }
}

enum WorkerMessage {
    NewConnection(TcpStream),
    Shutdown,
}

/// Cooperative shutdown switch for a running [`Server`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Asks the accept loop to stop; `Server::run` returns shortly after.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// TCP server multiplexing client connections onto a shared [`Engine`].
pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    config: ServerConfig,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    /// Binds the listener. The engine is shared with the worker pool, so the
    /// caller keeps a handle for its own shutdown sequencing.
    pub fn bind(addr: &str, engine: Arc<Engine>, config: ServerConfig) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            engine,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops the accept loop from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Number of connections currently being served.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Runs the server until shutdown is signalled (blocking).
    ///
    /// Spawns the worker pool, accepts connections and dispatches them, then
    /// drains the workers on the way out.
    pub fn run(&self) -> Result<(), NetError> {
        let num_workers = if self.config.workers > 0 {
            self.config.workers
        } else {
            thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
        };

        let (sender, receiver) = bounded::<WorkerMessage>(self.config.max_connections);

        tracing::info!(
            addr = %self.local_addr()?,
            workers = num_workers,
            "server listening"
        );

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let worker = Worker {
                id: worker_id,
                receiver: receiver.clone(),
                engine: Arc::clone(&self.engine),
                active_connections: Arc::clone(&self.active_connections),
            };
            let handle = thread::Builder::new()
                .name(format!("stratakv-worker-{worker_id}"))
                .spawn(move || worker.run())
                .map_err(NetError::Io)?;
            workers.push(handle);
        }

        self.accept_loop(&sender);
        self.drain_workers(&sender, workers);

        tracing::info!("server stopped");
        Ok(())
    }

    fn accept_loop(&self, sender: &Sender<WorkerMessage>) {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if current >= self.config.max_connections {
                        tracing::warn!(
                            current,
                            max = self.config.max_connections,
                            %addr,
                            "connection limit reached, rejecting"
                        );
                        drop(stream);
                        continue;
                    }

                    tracing::debug!(%addr, "accepted connection");
                    if let Err(e) = sender.send(WorkerMessage::NewConnection(stream)) {
                        tracing::error!(error = %e, "failed to dispatch connection");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        tracing::error!(error = %e, "accept error");
                    }
                }
            }
        }
    }

    fn drain_workers(&self, sender: &Sender<WorkerMessage>, workers: Vec<JoinHandle<()>>) {
        for _ in 0..workers.len() {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
        for handle in workers {
            if let Err(e) = handle.join() {
                tracing::error!(?e, "worker thread panicked");
            }
        }
    }
}

/// Worker thread pulling connections off the shared channel.
struct Worker {
    id: usize,
    receiver: Receiver<WorkerMessage>,
    engine: Arc<Engine>,
    active_connections: Arc<AtomicUsize>,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = self.id, "worker started");

        loop {
            match self.receiver.recv() {
                Ok(WorkerMessage::NewConnection(stream)) => self.handle_connection(stream),
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            }
        }

        tracing::debug!(worker = self.id, "worker stopped");
    }

    fn handle_connection(&self, stream: TcpStream) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        match Connection::new(stream, Arc::clone(&self.engine)) {
            Ok(mut conn) => {
                let peer = conn.peer_addr();
                if let Err(e) = conn.handle() {
                    tracing::debug!(%peer, error = %e, "connection ended with error");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to set up connection"),
        }

        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
