//! Core types shared by the cmdrelay backend, client and gateway.
//!
//! - [`protocol`]: `Request` / `Response` records
//! - [`framing`]: one JSON document per `\n`-terminated line
//! - [`config`]: configuration value types
//! - [`ports`]: exchange-log port consumed by the gateway

#![deny(unsafe_code)]

pub mod config;
pub mod framing;
pub mod ports;
pub mod protocol;

pub use config::{
    AdmissionConfig, BackendConfig, DEFAULT_ALLOWED_COMMANDS, GatewayConfig, RelayConfig,
    ShellPolicy, parse_allowlist,
};
pub use framing::{MAX_FRAME_LEN, ProtocolError, decode, read_frame, write_frame};
pub use ports::{ExchangeLogSink, ExchangeRecord, NoopExchangeLog, SinkError};
pub use protocol::{
    DEFAULT_LIMIT, DEFAULT_REQUEST_ID, DEFAULT_USER_ID, MAX_LIMIT, Request, RequestKind, Response,
    UnsupportedKind,
};
