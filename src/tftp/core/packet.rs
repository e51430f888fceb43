//! TFTP packet serialization and deserialization (RFC 1350 subset)
//!
//! ```text
//! RRQ/WRQ  | opcode:u16 | filename | 0x00 | mode | 0x00 |
//! DATA     | opcode:u16=3 | block:u16 | payload:0..512 |
//! ACK      | opcode:u16=4 | block:u16 |
//! ERROR    | opcode:u16=5 | code:u16 | message | 0x00 |
//! ```
//!
//! All multi-byte fields are big-endian.

use std::fmt;

use super::error::PacketError;

/// Payload size of a full DATA block. A shorter payload ends the transfer.
pub const BLOCK_SIZE: usize = 512;

/// Largest datagram the protocol produces (4-byte header + full block).
pub const MAX_PACKET_SIZE: usize = BLOCK_SIZE + 4;

/// Packet opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rrq),
            2 => Some(Self::Wrq),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rrq => "RRQ",
            Self::Wrq => "WRQ",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error codes carried by ERROR packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    /// Codes outside the RFC 1350 table fall back to `NotDefined`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileAlreadyExists,
            7 => Self::NoSuchUser,
            _ => Self::NotDefined,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NotDefined => "Not defined, see error message",
            Self::FileNotFound => "File not found",
            Self::AccessViolation => "Access violation",
            Self::DiskFull => "Disk full or allocation exceeded",
            Self::IllegalOperation => "Illegal TFTP operation",
            Self::UnknownTransferId => "Unknown transfer ID",
            Self::FileAlreadyExists => "File already exists",
            Self::NoSuchUser => "No such user",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A decoded TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: String },
    Wrq { filename: String, mode: String },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, msg: String },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq { .. } => Opcode::Rrq,
            Packet::Wrq { .. } => Opcode::Wrq,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Packet::Rrq { filename, mode } => encode_request(Opcode::Rrq, filename, mode),
            Packet::Wrq { filename, mode } => encode_request(Opcode::Wrq, filename, mode),
            Packet::Data { block_num, data } => encode_data(*block_num, data),
            Packet::Ack(block_num) => Ok(encode_ack(*block_num)),
            Packet::Error { code, msg } => encode_error(*code, msg),
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<Packet, PacketError> {
        let (opcode, second) = decode_header(buf)?;
        let opcode = Opcode::from_u16(opcode).ok_or(PacketError::UnknownOpcode(opcode))?;

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, mode) = decode_request(&buf[2..])?;
                Ok(if opcode == Opcode::Rrq {
                    Packet::Rrq { filename, mode }
                } else {
                    Packet::Wrq { filename, mode }
                })
            }
            Opcode::Data => Ok(Packet::Data {
                block_num: second,
                data: buf[4..].to_vec(),
            }),
            Opcode::Ack => Ok(Packet::Ack(second)),
            Opcode::Error => {
                let (code, msg) = decode_error(buf)?;
                Ok(Packet::Error { code, msg })
            }
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                write!(f, "{} {:?} ({})", self.opcode(), filename, mode)
            }
            Packet::Data { block_num, data } => {
                write!(f, "DATA block {} ({} bytes)", block_num, data.len())
            }
            Packet::Ack(block_num) => write!(f, "ACK block {}", block_num),
            Packet::Error { code, msg } => write!(f, "ERROR {}: {}", code, msg),
        }
    }
}

/// Encode an RRQ or WRQ.
pub fn encode_request(opcode: Opcode, filename: &str, mode: &str) -> Result<Vec<u8>, PacketError> {
    if !matches!(opcode, Opcode::Rrq | Opcode::Wrq) {
        return Err(PacketError::InvalidArgument("request opcode must be RRQ or WRQ"));
    }
    if filename.as_bytes().contains(&0) {
        return Err(PacketError::InvalidArgument("filename contains a zero byte"));
    }
    if mode.as_bytes().contains(&0) {
        return Err(PacketError::InvalidArgument("mode contains a zero byte"));
    }

    let mut buf = Vec::with_capacity(4 + filename.len() + mode.len());
    buf.extend_from_slice(&opcode.as_u16().to_be_bytes());
    buf.extend_from_slice(filename.as_bytes());
    buf.push(0);
    buf.extend_from_slice(mode.as_bytes());
    buf.push(0);
    Ok(buf)
}

pub fn encode_data(block_num: u16, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > BLOCK_SIZE {
        return Err(PacketError::InvalidArgument("DATA payload exceeds 512 bytes"));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&Opcode::Data.as_u16().to_be_bytes());
    buf.extend_from_slice(&block_num.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

pub fn encode_ack(block_num: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.extend_from_slice(&Opcode::Ack.as_u16().to_be_bytes());
    buf.extend_from_slice(&block_num.to_be_bytes());
    buf
}

pub fn encode_error(code: u16, msg: &str) -> Result<Vec<u8>, PacketError> {
    if msg.as_bytes().contains(&0) {
        return Err(PacketError::InvalidArgument("error message contains a zero byte"));
    }

    let mut buf = Vec::with_capacity(5 + msg.len());
    buf.extend_from_slice(&Opcode::Error.as_u16().to_be_bytes());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(msg.as_bytes());
    buf.push(0);
    Ok(buf)
}

/// Read the opcode and the 16-bit field that follows it.
///
/// For DATA and ACK the second field is the block number, for ERROR the
/// error code. Requests carry the first two filename bytes there, which
/// callers ignore.
pub fn decode_header(buf: &[u8]) -> Result<(u16, u16), PacketError> {
    if buf.len() < 4 {
        return Err(PacketError::TooShort(buf.len()));
    }
    let opcode = u16::from_be_bytes([buf[0], buf[1]]);
    let second = u16::from_be_bytes([buf[2], buf[3]]);
    Ok((opcode, second))
}

/// Decode an ERROR packet into its code and message.
///
/// The message ends at the first zero byte, or at the end of the datagram
/// when the terminator is missing.
pub fn decode_error(buf: &[u8]) -> Result<(u16, String), PacketError> {
    let (_, code) = decode_header(buf)?;
    let body = &buf[4..];
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    Ok((code, String::from_utf8_lossy(&body[..end]).into_owned()))
}

fn decode_request(body: &[u8]) -> Result<(String, String), PacketError> {
    let (filename, rest) = split_cstr(body).ok_or(PacketError::Malformed("unterminated filename"))?;
    let (mode, _) = split_cstr(rest).ok_or(PacketError::Malformed("unterminated mode"))?;
    Ok((filename, mode))
}

fn split_cstr(buf: &[u8]) -> Option<(String, &[u8])> {
    let end = buf.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&buf[..end]).into_owned();
    Some((text, &buf[end + 1..]))
}
