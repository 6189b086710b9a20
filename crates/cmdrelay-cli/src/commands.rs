//! Subcommands and their environment-backed arguments.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use cmdrelay_core::{
    AdmissionConfig, BackendConfig, GatewayConfig, RelayConfig, ShellPolicy, parse_allowlist,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the restricted execution backend (TCP, line-delimited JSON)
    Backend(BackendArgs),

    /// Run the HTTP gateway that relays to the backend
    Gateway(GatewayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Interface to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "TCP_PORT", default_value_t = 9000)]
    pub port: u16,

    /// Sandbox root for file reads
    #[arg(long, env = "FILE_ROOT", default_value = "/data")]
    pub file_root: PathBuf,

    /// Comma-separated command allowlist
    #[arg(
        long,
        env = "ALLOWED_CMDS",
        default_value = "uname,date,whoami,id,ls,pwd",
    )]
    pub allowed_cmds: String,

    /// Also reject command lines containing shell metacharacters
    #[arg(long, env = "STRICT_SHELL")]
    pub strict_shell: bool,

    /// Seconds to wait for a request line
    #[arg(long, env = "FRAME_READ_TIMEOUT_SEC", default_value_t = 10)]
    pub frame_timeout_sec: u64,

    /// Seconds a command may run (0 = no limit)
    #[arg(long, env = "EXEC_TIMEOUT_SEC", default_value_t = 30)]
    pub exec_timeout_sec: u64,
}

impl BackendArgs {
    pub fn to_config(&self) -> BackendConfig {
        BackendConfig {
            listen_addr: SocketAddr::new(self.listen_host, self.port),
            file_root: self.file_root.clone(),
            allowed_commands: parse_allowlist(&self.allowed_cmds),
            shell_policy: if self.strict_shell {
                ShellPolicy::Strict
            } else {
                ShellPolicy::FirstToken
            },
            frame_timeout: seconds_or_default(self.frame_timeout_sec, 10),
            exec_timeout: (self.exec_timeout_sec > 0)
                .then(|| Duration::from_secs(self.exec_timeout_sec)),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// HTTP listen address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,

    /// Whole-request timeout in seconds for relay routes
    #[arg(long, env = "HTTP_TIMEOUT_SEC", default_value_t = 5)]
    pub http_timeout_sec: u64,

    /// Backend host
    #[arg(long, env = "TCP_HOST", default_value = "127.0.0.1")]
    pub tcp_host: String,

    /// Backend port
    #[arg(long, env = "TCP_PORT", default_value_t = 9000)]
    pub tcp_port: u16,

    /// Backend connect timeout in seconds
    #[arg(long, env = "TCP_DIAL_TIMEOUT_SEC", default_value_t = 2)]
    pub dial_timeout_sec: u64,

    /// Backend I/O deadline in seconds (write + read)
    #[arg(long, env = "TCP_IO_TIMEOUT_SEC", default_value_t = 5)]
    pub io_timeout_sec: u64,

    /// Concurrent relay requests (0 or less disables the gate)
    #[arg(
        long,
        env = "RUN_MAX_CONCURRENCY",
        default_value_t = 5,
        allow_negative_numbers = true,
    )]
    pub max_concurrency: i64,

    /// Requests per second per client IP (0 or less disables rate limiting)
    #[arg(
        long,
        env = "RATE_RPS",
        default_value_t = 5.0,
        allow_negative_numbers = true,
    )]
    pub rate_rps: f64,

    /// Burst size per client IP (0 disables rate limiting)
    #[arg(long, env = "RATE_BURST", default_value_t = 10)]
    pub rate_burst: u32,

    /// Append exchange records to this JSON-lines file instead of the log
    #[arg(long, env = "EXCHANGE_LOG")]
    pub exchange_log: Option<PathBuf>,
}

impl GatewayArgs {
    pub fn to_config(&self) -> GatewayConfig {
        GatewayConfig {
            listen_addr: self.http_addr,
            request_timeout: seconds_or_default(self.http_timeout_sec, 5),
            relay: RelayConfig {
                host: self.tcp_host.clone(),
                port: self.tcp_port,
                dial_timeout: seconds_or_default(self.dial_timeout_sec, 2),
                io_timeout: seconds_or_default(self.io_timeout_sec, 5),
            },
            admission: AdmissionConfig {
                max_concurrency: self.max_concurrency,
                rate_rps: self.rate_rps,
                rate_burst: self.rate_burst,
                ..AdmissionConfig::default()
            },
            exchange_log: self.exchange_log.clone(),
        }
    }
}

/// A zero timeout would fail every exchange; treat it as unset.
fn seconds_or_default(secs: u64, default: u64) -> Duration {
    Duration::from_secs(if secs == 0 { default } else { secs })
}
