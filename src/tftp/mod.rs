//! TFTP (Trivial File Transfer Protocol) client
//!
//! This module implements the client side of
//! [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350) TFTP Protocol version 2
//! in binary (`octet`) mode, one block in flight at a time. Option
//! negotiation (RFC 2347 and friends) is not supported.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── socket      # Datagram transport abstraction
//! │   └── error       # Codec and transfer errors
//! │
//! └── client/         # TFTP client
//!     ├── client      # Socket and file setup
//!     ├── session     # DATA/ACK state machine
//!     ├── request     # Request sources (arguments, prompts)
//!     └── config      # Client configuration
//! ```
//!
//! ## Usage Examples
//!
//! ### Download a file
//!
//! ```rust,no_run
//! use xtftp::tftp::client::{Client, ClientConfig};
//! use std::path::Path;
//!
//! let config = ClientConfig::new("10.0.0.2".parse().unwrap(), 69);
//! let report = Client::new(config)
//!     .get("pxelinux.0", Path::new("pxelinux.0"))
//!     .unwrap();
//! println!("{} bytes", report.bytes);
//! ```

// Submodules
pub mod client;
pub mod core;
