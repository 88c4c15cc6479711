//! The Request Server
//!
//! One port, two protocols.  The first few bytes of a connection decide which: an HTTP method
//! means HTTP, anything else is the newline delimited JSON protocol.
//!
//! Threads:
//!
//!  * an acceptor, which spawns a short-lived thread per connection
//!  * connection threads, which only frame requests and queue them
//!  * a single worker, which owns the file system and answers every request in queue order
//!
//! The worker is the only thing that ever touches the engine.
//!
//! `GET`, `POST` and `OPTIONS` are the methods we serve.  The other common methods are sniffed as
//! HTTP too, so that a stray `PUT` gets a 405 instead of being parsed as a JSON line.
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{sleep, spawn, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::{
    block::storage::ContainerStorage,
    config::ServerConfig,
    error::{OmniErrorKind, Result},
    fsimpl::OmniFileSystem,
};

mod http;
mod line;
mod message;
mod worker;

use self::worker::Job;

/// Method tokens that mark a connection as HTTP
const HTTP_METHODS: &[&[u8]] = &[
    b"GET ",
    b"POST ",
    b"OPTIONS ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"PATCH ",
];

/// How many times to peek again while the bytes so far could still be a method
const SNIFF_RETRIES: usize = 50;
const SNIFF_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, PartialEq)]
enum Protocol {
    Http,
    Line,
}

/// What do the bytes seen so far say?  `None` means "can't tell yet".
fn classify(seen: &[u8]) -> Option<Protocol> {
    if HTTP_METHODS.iter().any(|m| seen.starts_with(m)) {
        Some(Protocol::Http)
    } else if HTTP_METHODS.iter().any(|m| m.starts_with(seen)) {
        None
    } else {
        Some(Protocol::Line)
    }
}

fn sniff(stream: &TcpStream) -> io::Result<Option<Protocol>> {
    let mut buf = [0u8; 8];
    for _ in 0..SNIFF_RETRIES {
        let n = stream.peek(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(protocol) = classify(&buf[..n]) {
            return Ok(Some(protocol));
        }
        sleep(SNIFF_DELAY);
    }
    // Still ambiguous; a line client that sent a lone "P", say.
    Ok(Some(Protocol::Line))
}

fn handle_connection(stream: TcpStream, jobs: Sender<Job>) {
    let result = match sniff(&stream) {
        Ok(Some(Protocol::Http)) => http::serve(stream, &jobs),
        Ok(Some(Protocol::Line)) => line::serve(stream, &jobs),
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        debug!("connection ended with an error: {}", e);
    }
}

/// A server that has not started yet
pub struct OmniServer<S: ContainerStorage + Send + 'static> {
    fs: OmniFileSystem<S>,
    config: ServerConfig,
}

impl<S: ContainerStorage + Send + 'static> OmniServer<S> {
    /// Take ownership of a mounted file system
    pub fn new(fs: OmniFileSystem<S>, config: ServerConfig) -> Self {
        OmniServer { fs, config }
    }

    /// Bind, and start the acceptor and the worker
    pub fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind)?;
        let local_addr = listener.local_addr()?;
        info!("listening on {}", local_addr);

        let (jobs, queue) = unbounded::<Job>();
        let stopping = Arc::new(AtomicBool::new(false));

        let fs = self.fs;
        let worker = spawn(move || worker::run(fs, queue));

        let acceptor = {
            let jobs = jobs.clone();
            let stopping = Arc::clone(&stopping);
            spawn(move || {
                for stream in listener.incoming() {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    match stream {
                        Ok(stream) => {
                            let jobs = jobs.clone();
                            spawn(move || handle_connection(stream, jobs));
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }
                debug!("acceptor stopped");
            })
        };

        let (stop, stop_requested) = bounded(1);
        Ok(ServerHandle {
            local_addr,
            jobs,
            stopping,
            stop,
            stop_requested,
            acceptor: Some(acceptor),
            worker: Some(worker),
        })
    }
}

/// Asks a running server to stop
///
/// Cheap to clone, and safe to use from any thread, a signal handler included.  Only the first
/// request counts.
#[derive(Clone, Debug)]
pub struct Stopper {
    stop: Sender<()>,
}

impl Stopper {
    /// Wake up [ServerHandle::wait]
    pub fn stop(&self) {
        if self.stop.try_send(()).is_err() {
            debug!("stop already requested");
        }
    }
}

/// A running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    jobs: Sender<Job>,
    stopping: Arc<AtomicBool>,
    stop: Sender<()>,
    stop_requested: Receiver<()>,
    acceptor: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    /// Where the server is actually listening
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Something that can end [ServerHandle::wait] from elsewhere
    pub fn stopper(&self) -> Stopper {
        Stopper {
            stop: self.stop.clone(),
        }
    }

    /// Serve until a [Stopper] fires, then shut down and return the unmount result
    pub fn wait(self) -> Result<()> {
        // We hold a sender ourselves, so this only returns once a Stopper fires.
        let _ = self.stop_requested.recv();
        self.shutdown()
    }

    /// Stop accepting, let the worker drain what's queued, and unmount
    pub fn shutdown(mut self) -> Result<()> {
        info!("shutting down");
        self.stopping.store(true, Ordering::SeqCst);

        // The acceptor is blocked in accept(); poke it.
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        match TcpStream::connect(wake) {
            Ok(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            Err(e) => warn!("unable to wake the acceptor: {}", e),
        }
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("acceptor thread panicked");
            }
        }

        if self.jobs.send(Job::Shutdown).is_err() {
            warn!("worker already gone");
        }
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(result) => result,
                Err(_) => {
                    error!("worker thread panicked");
                    Err(OmniErrorKind::Io.into())
                }
            },
            None => Ok(()),
        }
    }
}
