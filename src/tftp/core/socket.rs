use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Datagram transport used by a transfer session
///
/// A receive that sees no datagram within `timeout` fails with an
/// `io::Error` for which [`is_timeout`] returns true.
pub trait Transport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()>;

    fn recv_from(&mut self, max_len: usize, timeout: Duration) -> io::Result<(Vec<u8>, SocketAddr)>;
}

/// Whether a receive error means the timeout elapsed.
///
/// Unix reports an expired read timeout as `WouldBlock`, Windows as `TimedOut`.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// [`Transport`] over a blocking UDP socket
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port in the same address family as `server`.
    pub fn bind_for(server: SocketAddr) -> io::Result<Self> {
        let local = match server {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        Ok(Self {
            socket: UdpSocket::bind(local)?,
        })
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        let sent = self.socket.send_to(buf, addr)?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {} of {} bytes", sent, buf.len()),
            ));
        }
        Ok(())
    }

    fn recv_from(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> io::Result<(Vec<u8>, SocketAddr)> {
        // A zero duration is rejected by set_read_timeout
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = vec![0u8; max_len];
        let (amt, from) = self.socket.recv_from(&mut buf)?;
        buf.truncate(amt);
        Ok((buf, from))
    }
}
