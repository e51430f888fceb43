use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use super::config::ClientConfig;
use super::request::{Direction, TransferRequest};
use super::session::{TransferReport, TransferSession};
use crate::tftp::core::{TransferError, UdpTransport};

/// TFTP client
///
/// Supports file upload (PUT) and download (GET) operations. Every call
/// binds a fresh UDP socket, and the socket and the local file are closed
/// when the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use xtftp::tftp::client::{Client, ClientConfig};
/// use std::path::Path;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// let client = Client::new(config);
///
/// // Download file
/// client.get("remote.txt", Path::new("local.txt")).unwrap();
///
/// // Upload file
/// client.put(Path::new("local.txt"), "remote.txt").unwrap();
/// ```
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Perform the transfer described by `request` against this client's server.
    ///
    /// The request's transfer mode replaces the configured one.
    pub fn run(&self, request: &TransferRequest) -> Result<TransferReport, TransferError> {
        match request.direction {
            Direction::Get => self.download(&request.remote, &request.local, &request.mode),
            Direction::Put => self.upload(&request.local, &request.remote, &request.mode),
        }
    }

    /// Download a file from the server (RRQ - Read Request)
    ///
    /// The local file is created before anything is sent and removed again
    /// if the transfer fails.
    ///
    /// # Arguments
    ///
    /// * `remote_file` - File name on the server
    /// * `local_file` - Local save path
    pub fn get(
        &self,
        remote_file: &str,
        local_file: &Path,
    ) -> Result<TransferReport, TransferError> {
        self.download(remote_file, local_file, &self.config.mode)
    }

    /// Upload a file to the server (WRQ - Write Request)
    ///
    /// A missing or unreadable local file fails before any packet is sent.
    ///
    /// # Arguments
    ///
    /// * `local_file` - Local file path
    /// * `remote_file` - File name on the server
    pub fn put(
        &self,
        local_file: &Path,
        remote_file: &str,
    ) -> Result<TransferReport, TransferError> {
        self.upload(local_file, remote_file, &self.config.mode)
    }

    fn download(
        &self,
        remote_file: &str,
        local_file: &Path,
        mode: &str,
    ) -> Result<TransferReport, TransferError> {
        log::info!("Downloading {} to {}", remote_file, local_file.display());

        let file = File::create(local_file).map_err(TransferError::LocalFile)?;
        let result = self.open_transport().and_then(|transport| {
            self.session(transport).download(remote_file, mode, BufWriter::new(file))
        });

        match result {
            Ok(report) => {
                log::info!("Download complete: {} ({})", local_file.display(), report);
                Ok(report)
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(local_file) {
                    log::warn!("Failed to remove partial file {}: {}", local_file.display(), e);
                }
                Err(err)
            }
        }
    }

    fn upload(
        &self,
        local_file: &Path,
        remote_file: &str,
        mode: &str,
    ) -> Result<TransferReport, TransferError> {
        log::info!("Uploading {} to {}", local_file.display(), remote_file);

        let file = File::open(local_file).map_err(TransferError::LocalFile)?;
        if file.metadata().map_err(TransferError::LocalFile)?.is_dir() {
            return Err(TransferError::LocalFile(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", local_file.display()),
            )));
        }

        let transport = self.open_transport()?;
        let report = self.session(transport).upload(remote_file, mode, BufReader::new(file))?;

        log::info!("Upload complete: {} ({})", remote_file, report);
        Ok(report)
    }

    fn open_transport(&self) -> Result<UdpTransport, TransferError> {
        UdpTransport::bind_for(self.config.server_addr()).map_err(TransferError::Transport)
    }

    fn session(&self, transport: UdpTransport) -> TransferSession<UdpTransport> {
        TransferSession::new(transport, self.config.server_addr(), self.config.timeout)
            .with_write_handshake(self.config.write_handshake)
    }
}
