//! TFTP client implementation
//!
//! - `client`: Binds the socket, opens local files and runs a session
//! - `session`: Lock-step DATA/ACK state machine for one transfer
//! - `request`: Command line and interactive request sources
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;
mod request;
mod session;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_MODE, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use request::{ArgsSource, Direction, PromptSource, RequestSource, TransferRequest, resolve};
pub use session::{TransferReport, TransferSession, TransferState};
