//! TFTP core protocol implementation
//!
//! This module contains the core components of the TFTP protocol:
//! - `packet`: Packet serialization and deserialization
//! - `socket`: Datagram transport abstraction
//! - `error`: Codec and transfer errors

mod error;
pub mod packet;
mod socket;

// Public core types
pub use error::{PacketError, TransferError};
pub use packet::{BLOCK_SIZE, ErrorCode, MAX_PACKET_SIZE, Opcode, Packet};
pub use socket::{Transport, UdpTransport, is_timeout};
