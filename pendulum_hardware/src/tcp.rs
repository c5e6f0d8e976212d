//! TCP link to the trigger/actuator controller.
//!
//! One background thread per connection owns a cloned read half of the
//! socket, slices exactly the bytes returned by each read and publishes
//! them as `LinkEvent::Frame` over a crossbeam channel. Writes go through
//! the original stream under their own mutex so command frames never
//! interleave, and carry a write timeout so a peer that stops reading fails
//! the send instead of stalling it. The connection slot lock is never held
//! across socket I/O, so `disconnect()` cannot queue behind a stuck write.
//!
//! Safety: every connection spawns exactly one read thread, which is joined
//! on `disconnect()` (and therefore on drop) before the socket is shut down.
use crossbeam_channel as xch;
use pendulum_traits::{DeviceLink, LinkEvent};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{LinkError, Result};

const READ_BUFFER_LEN: usize = 1024;
/// Read timeout used so the loop can observe the shutdown flag.
const READ_POLL: Duration = Duration::from_millis(100);
/// Pause after a faulted read before trying again.
const FAULT_PAUSE: Duration = Duration::from_millis(100);

struct Connection {
    writer: Arc<Mutex<TcpStream>>,
    // Second handle used only to shut the socket down.
    control: TcpStream,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

pub struct TcpDeviceLink {
    name: String,
    addr: String,
    events: xch::Sender<LinkEvent>,
    conn: Mutex<Option<Connection>>,
}

impl core::fmt::Debug for TcpDeviceLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TcpDeviceLink")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl TcpDeviceLink {
    /// Create an unconnected link. Frames read after `open()` are published on `events`.
    pub fn new(
        name: impl Into<String>,
        host: &str,
        port: u16,
        events: xch::Sender<LinkEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            addr: format!("{host}:{port}"),
            events,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.addr
            .to_socket_addrs()
            .map_err(|_| LinkError::Resolve(self.addr.clone()))?
            .next()
            .ok_or_else(|| LinkError::Resolve(self.addr.clone()))
    }

    /// Connect with a bounded timeout and start the read loop.
    ///
    /// Connecting an already-connected link is a no-op. Failures are returned
    /// to the caller; retrying is the supervisor's job.
    pub fn open(&self, timeout: Duration) -> Result<()> {
        let mut guard = self.lock();
        if let Some(c) = guard.as_ref()
            && c.alive.load(Ordering::Acquire)
        {
            return Ok(());
        }
        // A stale connection whose read loop already ended; release it first.
        if let Some(stale) = guard.take() {
            close_connection(&self.name, stale);
        }

        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => LinkError::ConnectTimeout {
                addr: self.addr.clone(),
                timeout_ms: timeout.as_millis() as u64,
            },
            _ => LinkError::Io(e),
        })?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;
        let control = stream.try_clone()?;
        let reader_stream = stream.try_clone()?;
        reader_stream.set_read_timeout(Some(READ_POLL))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = {
            let shutdown = shutdown.clone();
            let alive = alive.clone();
            let events = self.events.clone();
            let name = self.name.clone();
            std::thread::Builder::new()
                .name(format!("{}-rx", self.name))
                .spawn(move || read_loop(&name, reader_stream, &events, &shutdown, &alive))?
        };

        tracing::info!(device = %self.name, addr = %self.addr, "link connected");
        *guard = Some(Connection {
            writer: Arc::new(Mutex::new(stream)),
            control,
            shutdown,
            alive,
            reader: Some(reader),
        });
        Ok(())
    }

    /// Write one frame. Requires an open connection whose read loop is still alive.
    pub fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let writer = {
            let guard = self.lock();
            let conn = guard
                .as_ref()
                .filter(|c| c.alive.load(Ordering::Acquire))
                .ok_or(LinkError::NotConnected)?;
            conn.writer.clone()
        };
        let mut stream = writer.lock().unwrap_or_else(|p| p.into_inner());
        stream.write_all(frame)?;
        stream.flush()?;
        tracing::trace!(device = %self.name, len = frame.len(), "frame sent");
        Ok(())
    }

    /// Cancel the read loop, then shut down the socket. Teardown errors are logged only.
    pub fn close(&self) {
        let taken = self.lock().take();
        if let Some(conn) = taken {
            close_connection(&self.name, conn);
            tracing::info!(device = %self.name, "link disconnected");
        }
    }
}

fn close_connection(name: &str, mut conn: Connection) {
    conn.shutdown.store(true, Ordering::Release);
    if let Some(handle) = conn.reader.take()
        && let Err(e) = handle.join()
    {
        tracing::warn!(device = %name, ?e, "link read thread panicked during shutdown");
    }
    // Also wakes a write still blocked on the socket.
    if let Err(e) = conn.control.shutdown(Shutdown::Both) {
        // NotConnected is expected after a remote close.
        tracing::debug!(device = %name, error = %e, "socket shutdown failed");
    }
}

fn read_loop(
    name: &str,
    mut stream: TcpStream,
    events: &xch::Sender<LinkEvent>,
    shutdown: &AtomicBool,
    alive: &AtomicBool,
) {
    let mut buf = [0u8; READ_BUFFER_LEN];
    loop {
        if shutdown.load(Ordering::Acquire) {
            tracing::debug!(device = %name, "link read loop received shutdown signal");
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                tracing::info!(device = %name, "controller closed the connection");
                alive.store(false, Ordering::Release);
                let _ = events.send(LinkEvent::Closed);
                break;
            }
            Ok(n) => {
                tracing::trace!(device = %name, len = n, "frame received");
                if events.send(LinkEvent::Frame(buf[..n].to_vec())).is_err() {
                    tracing::debug!(device = %name, "link consumer disconnected, exiting read loop");
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                tracing::warn!(device = %name, error = %e, "link read failed");
                if events.send(LinkEvent::Fault(e.to_string())).is_err() {
                    break;
                }
                std::thread::sleep(FAULT_PAUSE);
            }
        }
    }
    tracing::trace!(device = %name, "link read loop exiting cleanly");
}

impl DeviceLink for TcpDeviceLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(
        &self,
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.open(timeout).map_err(Into::into)
    }

    fn send(&self, frame: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_frame(frame).map_err(Into::into)
    }

    fn disconnect(&self) {
        self.close();
    }

    fn is_connected(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|c| c.alive.load(Ordering::Acquire))
    }
}

impl Drop for TcpDeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}
