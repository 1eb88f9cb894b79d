use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Port script VMs dial by default when started with debugging enabled.
pub const DEFAULT_DEBUG_PORT: u16 = 7935;

/// A connected debug stream — implements `Read` + `Write`.
///
/// Wraps a TCP stream with Nagle disabled (debug frames are small and
/// latency-sensitive). Clones share the underlying socket, so the read
/// and write halves can live on different threads.
pub struct DebugStream {
    inner: TcpStream,
}

impl Read for DebugStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for DebugStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl DebugStream {
    fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { inner: stream })
    }

    /// Dial a VM that is already listening for a debugger (blocking).
    pub fn connect(addr: impl ToSocketAddrs + ToString) -> Result<Self> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr = %addr.to_string(), "connected to vm");
        Self::from_tcp(stream)
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new handle to the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self { inner: cloned })
    }

    /// Address of the connected VM.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Shut down the read half. Best-effort: failures (including a socket
    /// that is already shut down) are ignored.
    ///
    /// Unblocks a thread parked in a blocking read on any clone.
    pub fn shutdown_read(&self) {
        let _ = self.inner.shutdown(Shutdown::Read);
    }

    /// Shut down the write half. Best-effort, failures ignored.
    pub fn shutdown_write(&self) {
        let _ = self.inner.shutdown(Shutdown::Write);
    }

    /// Shut down both halves. Best-effort, idempotent, safe to call
    /// concurrently from multiple threads.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for DebugStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugStream")
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}

/// Listens for a VM dialing in with debugging enabled.
pub struct DebugListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl DebugListener {
    /// Bind and listen on the given address.
    pub fn bind(addr: impl ToSocketAddrs + ToString) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening for vm debug connection");
        Ok(Self { listener, addr })
    }

    /// Accept an incoming VM connection (blocking).
    pub fn accept(&self) -> Result<DebugStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "vm connected");
        DebugStream::from_tcp(stream)
    }

    /// The local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}
