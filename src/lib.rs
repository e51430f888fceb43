//! xtftp - a lock-step TFTP client
//!
//! - `tftp`: protocol codec, transfer session and client
//! - `config`: optional TOML configuration file

pub mod config;
pub mod tftp;
