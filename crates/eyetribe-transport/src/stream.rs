use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected tracker stream; implements Read + Write.
///
/// Cloned handles share the same socket; calling [`TrackerStream::shutdown`]
/// on any of them wakes a reader blocked on another.
pub struct TrackerStream {
    inner: TcpStream,
    peer: SocketAddr,
    shut: Arc<AtomicBool>,
}

impl TrackerStream {
    /// Resolve `host:port` and connect, trying each resolved address in turn.
    ///
    /// `timeout` bounds each individual connection attempt.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected to tracker");
                    return Ok(Self::from_tcp(stream, addr));
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some((addr, err));
                }
            }
        }

        Err(match last_err {
            Some((addr, source)) => TransportError::Connect {
                addr: addr.to_string(),
                source,
            },
            None => TransportError::Resolve {
                host: host.to_string(),
                port,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ),
            },
        })
    }

    fn from_tcp(inner: TcpStream, peer: SocketAddr) -> Self {
        Self {
            inner,
            peer,
            shut: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Address of the connected tracker.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
            shut: Arc::clone(&self.shut),
        })
    }

    /// Shut down both directions of the connection.
    ///
    /// Idempotent across all clones of this stream.
    pub fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => debug!(peer = %self.peer, "tracker stream shut down"),
            Err(err) => debug!(peer = %self.peer, error = %err, "shutdown on dead stream"),
        }
    }

    /// True once [`TrackerStream::shutdown`] has been called on any clone.
    pub fn is_shut_down(&self) -> bool {
        self.shut.load(Ordering::SeqCst)
    }
}

impl Read for TrackerStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TrackerStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for TrackerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerStream")
            .field("peer", &self.peer)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"hello").unwrap();
        });

        let mut stream = TrackerStream::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.peer_addr().port(), port);

        server.join().unwrap();
    }

    #[test]
    fn connect_refused() {
        // Bind then drop to obtain a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TrackerStream::connect("127.0.0.1", port, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn unresolvable_host() {
        let result = TrackerStream::connect("host.invalid", 6555, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[test]
    fn shutdown_wakes_blocked_reader_and_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = std::thread::spawn(move || listener.accept().unwrap());

        let stream = TrackerStream::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let _server_side = accept.join().unwrap();

        let mut reader = stream.try_clone().unwrap();
        let blocked = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(50));
        stream.shutdown();
        stream.shutdown();
        assert!(stream.is_shut_down());

        let read = blocked.join().unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
