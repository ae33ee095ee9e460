use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// Process-wide settings, read once at startup and shared read-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory that request URLs are appended to.
    pub document_root: PathBuf,
    /// Size of the request processing pool.
    pub workers: usize,
    /// Simultaneous connections; further accepts are turned away.
    pub max_connections: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Upper bound on `document_root + url`, longer paths are cut.
    pub max_path_len: usize,
    /// Readiness events drained per reactor wakeup.
    pub events_capacity: usize,
    /// Close client sockets with RST (`SO_LINGER` on, zero timeout).
    pub linger_reset: bool,
    /// Answer URLs containing a `..` segment with 403.
    pub reject_traversal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            document_root: PathBuf::from("./www"),
            workers: num_cpus::get(),
            max_connections: 65536,
            read_buffer_size: 2048,
            write_buffer_size: 1024,
            max_path_len: 200,
            events_capacity: 1024,
            linger_reset: false,
            reject_traversal: true,
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
