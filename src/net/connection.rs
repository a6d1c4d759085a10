//! Socket lifecycle for the pose server.
//!
//! `Disconnected → Connecting → Connected → Disconnected`, with `Closing`
//! only seen during shutdown. Every teardown path (explicit close, read
//! error, write error) goes through `Shared::close_socket`, which is keyed
//! by connection generation so a late teardown from an old receive loop can
//! never close a newer connection.
//!
//! Lock order is `state → socket → writer`. Writers never hold `writer`
//! while taking `state`.

use parking_lot::Mutex;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use frame_wire::{ImageMessage, RawFrameMessage, DEFAULT_MAX_PAYLOAD};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::frame::EncodedImage;

/// Called on the receive thread for every image the server returns.
pub type ImageCallback = Arc<dyn Fn(EncodedImage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Longest a single frame write may block before the connection is
    /// treated as dead.
    pub write_timeout: Duration,
    /// Minimum spacing between connect attempts made through
    /// [`ConnectionManager::reconnect_if_due`].
    pub reconnect_interval: Duration,
    /// Largest inbound image accepted before the connection is dropped.
    pub max_payload: u32,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_millis(4000),
            write_timeout: Duration::from_millis(4000),
            reconnect_interval: Duration::from_millis(2000),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Shared {
    state: Mutex<ConnectionState>,
    /// Control handle used only for `shutdown`, so teardown never waits on
    /// a blocked writer.
    socket: Mutex<Option<(u64, TcpStream)>>,
    writer: Mutex<Option<(u64, BufWriter<TcpStream>)>>,
    generation: AtomicU64,
    on_image: ImageCallback,
}

impl Shared {
    /// Tear down the connection `generation` (or whichever is live, for
    /// `None`). Returns whether this call did the teardown.
    fn close_socket(&self, generation: Option<u64>) -> bool {
        let matches = |live: u64| generation.map_or(true, |wanted| wanted == live);

        let mut state = self.state.lock();
        let taken = {
            let mut socket = self.socket.lock();
            match socket.as_ref() {
                Some((live, _)) if matches(*live) => socket.take(),
                _ => None,
            }
        };
        let Some((live, stream)) = taken else {
            return false;
        };

        // Unblocks the receive loop and any writer stuck in `write`.
        let _ = stream.shutdown(Shutdown::Both);
        {
            let mut writer = self.writer.lock();
            if writer.as_ref().is_some_and(|(g, _)| *g == live) {
                writer.take();
            }
        }
        if *state != ConnectionState::Closing {
            *state = ConnectionState::Disconnected;
        }
        info!("connection {live} closed");
        true
    }
}

/// Owns the one persistent connection to the pose server.
pub struct ConnectionManager {
    config: ConnectionConfig,
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    last_attempt: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, on_image: ImageCallback) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                socket: Mutex::new(None),
                writer: Mutex::new(None),
                generation: AtomicU64::new(0),
                on_image,
            }),
            receiver: Mutex::new(None),
            last_attempt: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect unless already connected. Returns `NotConnected` while
    /// another caller's attempt is still in progress.
    ///
    /// Blocks for at most the connect timeout per resolved address. On
    /// failure the state is back to `Disconnected` and the caller decides
    /// when to try again.
    pub fn ensure_connected(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PipelineError::NotConnected);
        }
        {
            let mut state = self.shared.state.lock();
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Closing => {
                    return Err(PipelineError::NotConnected)
                }
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        let addr = self.config.addr();
        info!("connecting to {addr}");
        let stream = match self.open_stream() {
            Ok(stream) => stream,
            Err(source) => {
                let mut state = self.shared.state.lock();
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Disconnected;
                }
                warn!("connect to {addr} failed: {source}");
                return Err(PipelineError::Connect { addr, source });
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = {
            let mut state = self.shared.state.lock();
            if *state != ConnectionState::Connecting {
                // close() ran while we were connecting.
                let _ = stream.shutdown(Shutdown::Both);
                return Err(PipelineError::NotConnected);
            }

            let clones = stream
                .try_clone()
                .and_then(|control| stream.try_clone().map(|reader| (control, reader)));
            let (control, reader) = match clones {
                Ok(pair) => pair,
                Err(source) => {
                    *state = ConnectionState::Disconnected;
                    return Err(PipelineError::Connect { addr, source });
                }
            };

            let shared = Arc::clone(&self.shared);
            let max_payload = self.config.max_payload;
            let spawned = std::thread::Builder::new()
                .name("net-recv".to_string())
                .spawn(move || receive_loop(shared, reader, generation, max_payload));
            let handle = match spawned {
                Ok(handle) => handle,
                Err(source) => {
                    let _ = stream.shutdown(Shutdown::Both);
                    *state = ConnectionState::Disconnected;
                    return Err(PipelineError::Connect { addr, source });
                }
            };

            *self.shared.socket.lock() = Some((generation, control));
            *self.shared.writer.lock() = Some((generation, BufWriter::new(stream)));
            *state = ConnectionState::Connected;
            handle
        };
        info!("connected to {addr} (connection {generation})");

        // The previous receive loop has already seen its socket shut down.
        if let Some(previous) = self.receiver.lock().replace(handle) {
            let _ = previous.join();
        }
        Ok(())
    }

    /// Like [`ensure_connected`](Self::ensure_connected), but makes at most
    /// one attempt per reconnect interval. Returns `NotConnected` while
    /// waiting out the interval.
    pub fn reconnect_if_due(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        {
            let mut last = self.last_attempt.lock();
            if last.is_some_and(|at| at.elapsed() < self.config.reconnect_interval) {
                return Err(PipelineError::NotConnected);
            }
            *last = Some(Instant::now());
        }
        self.ensure_connected()
    }

    /// Write one frame message. Fails fast with `NotConnected` unless the
    /// connection is up; a write failure tears the connection down.
    pub fn send(&self, message: &RawFrameMessage) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(PipelineError::NotConnected);
        }

        let (generation, outcome) = {
            let mut writer = self.shared.writer.lock();
            let Some((generation, stream)) = writer.as_mut() else {
                return Err(PipelineError::NotConnected);
            };
            (*generation, message.write_to(stream))
        };

        if let Err(e) = outcome {
            warn!("send failed on connection {generation}: {e}");
            self.shared.close_socket(Some(generation));
            return Err(e.into());
        }
        Ok(())
    }

    /// Shut the connection down for good and wait for the receive loop.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.shared.state.lock() = ConnectionState::Closing;
        self.shared.close_socket(None);
        if let Some(handle) = self.receiver.lock().take() {
            let _ = handle.join();
        }
        *self.shared.state.lock() = ConnectionState::Disconnected;
        info!("connection manager closed");
    }

    fn open_stream(&self) -> std::io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(Some(self.config.write_timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            )
        }))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(shared: Arc<Shared>, stream: TcpStream, generation: u64, max_payload: u32) {
    let mut reader = BufReader::new(stream);
    loop {
        match ImageMessage::read_from(&mut reader, max_payload) {
            Ok(message) => {
                debug!("received {} byte image", message.payload.len());
                (shared.on_image)(EncodedImage::new(message.payload));
            }
            Err(e) if e.is_closed() => {
                info!("server closed connection {generation}");
                break;
            }
            Err(e) => {
                warn!("receive failed on connection {generation}: {e}");
                break;
            }
        }
    }
    shared.close_socket(Some(generation));
}
