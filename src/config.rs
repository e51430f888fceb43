//! Optional TOML configuration
//!
//! ```toml
//! server = "192.168.1.100"
//! port = 69
//! timeout = "5s"
//! mode = "octet"
//! write_handshake = false
//! ```
//!
//! Every key is optional. Command line values take precedence.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "xtftp.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TftpConfig {
    /// Server host name or IP address
    pub server: Option<String>,
    pub port: Option<u16>,
    /// Receive timeout per exchange, e.g. "5s"
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub mode: Option<String>,
    pub write_handshake: Option<bool>,
}

impl TftpConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load `explicit` if given, otherwise [`DEFAULT_CONFIG_FILE`] if it exists.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }

        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            log::debug!("Using config file {}", default.display());
            return Self::load(default).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_all_keys() {
        let config = TftpConfig::from_toml(
            r#"
            server = "10.1.1.1"
            port = 6969
            timeout = "1s 500ms"
            mode = "octet"
            write_handshake = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.as_deref(), Some("10.1.1.1"));
        assert_eq!(config.port, Some(6969));
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.mode.as_deref(), Some("octet"));
        assert_eq!(config.write_handshake, Some(true));
    }

    #[test]
    fn missing_keys_stay_unset() {
        let config = TftpConfig::from_toml("port = 69").unwrap();
        assert_eq!(config, TftpConfig { port: Some(69), ..Default::default() });
    }

    #[test]
    fn rejects_unknown_keys_and_bad_durations() {
        assert!(TftpConfig::from_toml("blksize = 1024").is_err());
        assert!(TftpConfig::from_toml("timeout = \"soon\"").is_err());
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TftpConfig::discover(Some(dir.path().join("absent.toml").as_path())).is_err());

        let path = dir.path().join("xtftp.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server = \"tftp.lan\"").unwrap();

        let config = TftpConfig::discover(Some(path.as_path())).unwrap().unwrap();
        assert_eq!(config.server.as_deref(), Some("tftp.lan"));
    }
}
