//! Netfilter netlink socket and the transport seam used by the retry loop.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};

use netlink_sys::{Socket, SocketAddr, protocols};

use super::error::Result;

/// Something that can push one encoded message to the kernel.
///
/// Implementations perform exactly one send per call: no buffering, no
/// fragmentation, no retry. Retrying is the job of
/// [`RetryPolicy`](super::retry::RetryPolicy).
pub trait Transport {
    /// Send `msg` as a single datagram.
    fn send(&self, msg: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, msg: &[u8]) -> io::Result<()> {
        (**self).send(msg)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, msg: &[u8]) -> io::Result<()> {
        (**self).send(msg)
    }
}

/// How a failed send should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// Socket buffer is full (EAGAIN/EWOULDBLOCK); retry after a pause.
    WouldBlock,
    /// Interrupted by a signal (EINTR); retry immediately.
    Interrupted,
    /// Anything else; give up.
    Other,
}

impl SendErrorKind {
    /// Classify an I/O error returned by a send.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::Interrupted => Self::Interrupted,
            _ => Self::Other,
        }
    }
}

/// Non-blocking `NETLINK_NETFILTER` socket.
///
/// Sends are serialized through an internal lock, so one socket can be
/// shared between threads (wrap it in an [`Arc`]).
pub struct IpsetSocket {
    socket: Mutex<Socket>,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl IpsetSocket {
    /// Open a non-blocking netfilter socket and bind it.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_NETFILTER)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;

        Self::from_socket(socket)
    }

    /// Wrap a socket that was opened and bound elsewhere.
    pub fn from_socket(socket: Socket) -> Result<Self> {
        let mut addr = SocketAddr::new(0, 0);
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        tracing::debug!(pid, "netfilter socket ready");

        Ok(Self {
            socket: Mutex::new(socket),
            pid,
        })
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Transport for IpsetSocket {
    fn send(&self, msg: &[u8]) -> io::Result<()> {
        // Port 0 is the kernel.
        let kernel = SocketAddr::new(0, 0);
        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = socket.send_to(msg, &kernel, 0)?;
        if sent != msg.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short netlink send: {} of {} bytes", sent, msg.len()),
            ));
        }
        Ok(())
    }
}

impl AsRawFd for IpsetSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_raw_fd()
    }
}

impl std::fmt::Debug for IpsetSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpsetSocket")
            .field("fd", &self.as_raw_fd())
            .field("pid", &self.pid)
            .finish()
    }
}
