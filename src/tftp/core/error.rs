use std::io;

use thiserror::Error;

use super::packet::ErrorCode;

/// Codec-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Fewer than the 4 header bytes were present
    #[error("Malformed packet: {0} bytes is shorter than the 4-byte header")]
    TooShort(usize),

    #[error("Malformed packet: {0}")]
    Malformed(&'static str),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u16),

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Terminal failure of a transfer
///
/// Every variant ends the current transfer; nothing is retried.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No DATA arrived within the receive window during a download
    #[error("Timed out waiting for data")]
    Timeout,

    /// No ACK arrived within the receive window during an upload
    #[error("Timed out waiting for ACK")]
    AckTimeout,

    /// Wrong opcode or block number mismatch
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The server sent an ERROR packet during a download
    #[error("Server error {code} ({}): {message}", ErrorCode::from_u16(*code))]
    ServerError { code: u16, message: String },

    /// The local file could not be opened, read, created or written
    #[error("Local file error: {0}")]
    LocalFile(#[source] io::Error),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),
}
