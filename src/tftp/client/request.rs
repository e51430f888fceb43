//! Where a transfer request comes from
//!
//! The command line and the interactive shell both end up with a
//! [`TransferRequest`]; the client does not care which one produced it.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use dialoguer::{Input, Select};

/// Transfer direction, seen from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Download (RRQ)
    Get,
    /// Upload (WRQ)
    Put,
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Direction::Get),
            "put" => Ok(Direction::Put),
            other => Err(anyhow!("Unknown operation '{}', expected get or put", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Get => f.write_str("get"),
            Direction::Put => f.write_str("put"),
        }
    }
}

/// A fully resolved transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub server: SocketAddr,
    pub direction: Direction,
    /// File name on the server
    pub remote: String,
    /// Local path to write (get) or read (put)
    pub local: PathBuf,
    /// Transfer mode sent in the request
    pub mode: String,
}

/// Produces the transfer to perform
pub trait RequestSource {
    fn request(&mut self) -> Result<TransferRequest>;
}

/// Request assembled from command line arguments
#[derive(Debug, Clone)]
pub struct ArgsSource {
    pub host: String,
    pub port: u16,
    pub direction: Direction,
    /// Remote name for get, local path for put
    pub file: String,
    /// Local path for get, remote name for put
    pub target: Option<String>,
    pub mode: String,
}

impl RequestSource for ArgsSource {
    fn request(&mut self) -> Result<TransferRequest> {
        let server = resolve(&self.host, self.port)?;
        let file = self.file.trim();
        if file.is_empty() {
            bail!("File name must not be empty");
        }
        let mode = self.mode.trim();
        if mode.is_empty() {
            bail!("Transfer mode must not be empty");
        }

        let (remote, local) = match self.direction {
            Direction::Get => {
                let local = match &self.target {
                    Some(target) => PathBuf::from(target),
                    None => PathBuf::from(base_name(file)),
                };
                (file.to_string(), local)
            }
            Direction::Put => {
                let remote = match &self.target {
                    Some(target) => target.clone(),
                    None => base_name(file),
                };
                (remote, PathBuf::from(file))
            }
        };

        Ok(TransferRequest {
            server,
            direction: self.direction,
            remote,
            local,
            mode: mode.to_string(),
        })
    }
}

/// Request collected through interactive prompts
///
/// The same name is used for the remote and the local file.
#[derive(Debug, Clone)]
pub struct PromptSource {
    pub default_host: Option<String>,
    pub default_port: u16,
    pub default_mode: String,
}

impl RequestSource for PromptSource {
    fn request(&mut self) -> Result<TransferRequest> {
        let mut host = Input::<String>::new().with_prompt("TFTP server host");
        if let Some(default) = &self.default_host {
            host = host.default(default.clone());
        }
        let host = host.interact_text()?;

        let port = Input::<u16>::new()
            .with_prompt("TFTP server port")
            .default(self.default_port)
            .interact_text()?;

        let operations = ["get", "put"];
        let choice = Select::new()
            .with_prompt("Operation")
            .items(&operations)
            .default(0)
            .interact()?;
        let direction = operations[choice].parse()?;

        let file = Input::<String>::new()
            .with_prompt("File name")
            .interact_text()?;

        let mode = Input::<String>::new()
            .with_prompt("Transfer mode")
            .default(self.default_mode.clone())
            .interact_text()?;

        ArgsSource {
            host,
            port,
            direction,
            file: file.clone(),
            target: Some(file),
            mode,
        }
        .request()
    }
}

/// Resolve `host` to the first matching socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim();
    if host.is_empty() {
        bail!("Server host must not be empty");
    }
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve server '{}'", host))?
        .next()
        .ok_or_else(|| anyhow!("No address found for server '{}'", host))
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
