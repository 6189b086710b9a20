//! Configuration value types.
//!
//! These structs only carry values. Loading them from flags, environment
//! variables or `.env` files is the binary's job (see `cmdrelay-cli`).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Commands the backend runs when no allowlist is configured.
pub const DEFAULT_ALLOWED_COMMANDS: [&str; 6] = ["uname", "date", "whoami", "id", "ls", "pwd"];

/// Default backend port.
pub const DEFAULT_BACKEND_PORT: u16 = 9000;

/// How a command line is validated against the allowlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShellPolicy {
    /// Only the first whitespace-separated token is checked. The full line
    /// is still handed to the shell, so `ls; id` passes.
    #[default]
    FirstToken,
    /// First-token check plus rejection of any shell metacharacter.
    Strict,
}

/// Backend server settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Sandbox root for file reads.
    pub file_root: PathBuf,
    /// Allowlisted command names (exact, case-sensitive).
    pub allowed_commands: HashSet<String>,
    pub shell_policy: ShellPolicy,
    /// Deadline for receiving the request line.
    pub frame_timeout: Duration,
    /// Deadline for a child command; `None` waits indefinitely.
    pub exec_timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_BACKEND_PORT)),
            file_root: PathBuf::from("/data"),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            shell_policy: ShellPolicy::FirstToken,
            frame_timeout: Duration::from_secs(10),
            exec_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Relay client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub dial_timeout: Duration,
    /// Single deadline covering the request write and the response read.
    pub io_timeout: Duration,
}

impl RelayConfig {
    /// `host:port` string used for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BACKEND_PORT,
            dial_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(5),
        }
    }
}

/// Gateway admission-control settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    /// Concurrency gate capacity; `<= 0` disables the gate.
    pub max_concurrency: i64,
    /// Token refill rate per client IP; `<= 0` disables rate limiting.
    pub rate_rps: f64,
    /// Bucket size per client IP; `0` disables rate limiting.
    pub rate_burst: u32,
    /// How often stale client entries are swept.
    pub eviction_interval: Duration,
    /// Entries idle for longer than this are evicted.
    pub max_idle: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            rate_rps: 5.0,
            rate_burst: 10,
            eviction_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(5 * 60),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Whole-request timeout on relay-invoking routes.
    pub request_timeout: Duration,
    pub relay: RelayConfig,
    pub admission: AdmissionConfig,
    /// JSON-lines exchange log; `None` logs exchanges through tracing.
    pub exchange_log: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(5),
            relay: RelayConfig::default(),
            admission: AdmissionConfig::default(),
            exchange_log: None,
        }
    }
}

/// Parse a comma-separated allowlist, ignoring blanks.
pub fn parse_allowlist(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
