//! Global tool configuration.
//!
//! Settings apply to every database running on this server and are read from
//! the global configuration file. Missing keys fall back to their defaults
//! with a warning, an unparsable address is fatal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::descriptor::{CONFIG_FILE, DESCRIPTOR_FILE};

/// The default location of the global configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/strata/strata.conf";
/// The default parent directory for database directories.
pub const DEFAULT_DB_PATH: &str = "/var/lib/strata";
/// The default port for client connections.
pub const DEFAULT_CLIENT_PORT: u16 = 9000;
/// The default port for server-to-server connections.
pub const DEFAULT_BACKEND_PORT: u16 = 9010;

/// The raw shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    strata: Option<RawSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSection {
    listen_client: Option<String>,
    listen_backend: Option<String>,
    default_db_path: Option<String>,
}

/// Server-wide settings.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The address clients connect to. May be a `*` wildcard.
    pub client_host: String,
    /// The port clients connect to.
    pub client_port: u16,
    /// The address other servers in the cluster connect to. No wildcard.
    pub backend_host: String,
    /// The port other servers in the cluster connect to.
    pub backend_port: u16,
    /// The parent directory under which database directories are created.
    pub default_db_path: PathBuf,
    /// Databases discovered under `default_db_path`, by name.
    pub databases: BTreeMap<String, PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_host: "localhost".to_string(),
            client_port: DEFAULT_CLIENT_PORT,
            backend_host: "localhost".to_string(),
            backend_port: DEFAULT_BACKEND_PORT,
            default_db_path: PathBuf::from(DEFAULT_DB_PATH),
            databases: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from the global configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("error reading configuration file {:?}", path))?;
        let raw: RawConfig = toml::from_str(&content).with_context(|| format!("error parsing configuration file {:?}", path))?;
        let section = raw.strata.unwrap_or_default();

        let mut settings = Self::default();
        match section.listen_client {
            Some(addr) => {
                let (host, port) = parse_address(&addr, true).with_context(|| format!("invalid listen_client in {:?}", path))?;
                settings.client_host = host;
                settings.client_port = port;
            }
            None => tracing::warn!("no listen_client configured, using default port {}", DEFAULT_CLIENT_PORT),
        }
        match section.listen_backend {
            Some(addr) => {
                let (host, port) = parse_address(&addr, false).with_context(|| format!("invalid listen_backend in {:?}", path))?;
                settings.backend_host = host;
                settings.backend_port = port;
            }
            None => tracing::warn!("no listen_backend configured, using default port {}", DEFAULT_BACKEND_PORT),
        }
        match section.default_db_path {
            Some(path) => settings.default_db_path = PathBuf::from(path),
            None => tracing::warn!("no default_db_path configured, using {}", DEFAULT_DB_PATH),
        }

        settings.scan_databases();
        Ok(settings)
    }

    /// The address used to dial the local server's client port.
    ///
    /// The configured listen address may be a wildcard, dialing always goes
    /// through the loopback name.
    pub fn local_client_addr(&self) -> (&str, u16) {
        ("localhost", self.client_port)
    }

    /// Discover existing database directories under the default path.
    ///
    /// A database directory holds both the descriptor and its companion
    /// configuration file. Directories starting with a double underscore are
    /// skipped.
    fn scan_databases(&mut self) {
        let entries = match fs::read_dir(&self.default_db_path) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) if !name.starts_with("__") => name.to_string(),
                _ => continue,
            };
            let dir = entry.path();
            if dir.is_dir() && dir.join(DESCRIPTOR_FILE).is_file() && dir.join(CONFIG_FILE).is_file() {
                self.databases.insert(name, dir);
            }
        }
    }
}

/// Parse an `address:port` value.
///
/// The address part may be a host name, an IPv4 address or a bracketed IPv6
/// address. A `*` wildcard is only accepted where the caller allows it.
pub fn parse_address(addr: &str, wildcard: bool) -> Result<(String, u16)> {
    let idx = match addr.rfind(':') {
        Some(idx) => idx,
        None => bail!("expecting an address:port value, got {:?}", addr),
    };
    let (host, port) = (&addr[..idx], &addr[idx + 1..]);
    let port: u16 = port.parse().with_context(|| format!("invalid port in {:?}", addr))?;
    if port == 0 {
        bail!("invalid port in {:?}", addr);
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        bail!("empty address in {:?}", addr);
    }
    if host == "*" && !wildcard {
        bail!("a wildcard address is not allowed here: {:?}", addr);
    }
    Ok((host.to_string(), port))
}
