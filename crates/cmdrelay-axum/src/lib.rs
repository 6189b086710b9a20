//! HTTP gateway for the cmdrelay backend.
//!
//! Exposes `/run` and `/file` behind admission control, relays each request
//! to the backend over one TCP exchange, and answers in JSON or YAML.

#![deny(unsafe_code)]

pub mod admission;
pub mod bootstrap;
pub mod error;
pub mod exchange_log;
pub mod handlers;
pub mod respond;
pub mod routes;
pub mod state;

pub use admission::{Admission, ConcurrencyGate, RateLimiter, client_ip};
pub use bootstrap::{GatewayContext, bootstrap, start_gateway};
pub use error::HttpError;
pub use exchange_log::{JsonlExchangeLog, TracingExchangeLog};
pub use respond::ResponseFormat;
pub use routes::create_router;
pub use state::AppState;
