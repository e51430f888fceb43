use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Well-known TFTP server port
pub const DEFAULT_PORT: u16 = 69;

/// Per-exchange receive timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transfer mode sent in requests. Only binary transfers are performed.
pub const DEFAULT_MODE: &str = "octet";

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use xtftp::tftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number
    pub server_port: u16,
    /// How long to wait for each response
    pub timeout: Duration,
    /// Transfer mode string (sent as given, no netascii translation)
    pub mode: String,
    /// Wait for ACK 0 after a write request before sending the first block
    pub write_handshake: bool,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number (usually 69)
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            timeout: DEFAULT_TIMEOUT,
            mode: DEFAULT_MODE.to_string(),
            write_handshake: false,
        }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }

    /// Set timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_write_handshake(mut self, write_handshake: bool) -> Self {
        self.write_handshake = write_handshake;
        self
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT)
    }
}
