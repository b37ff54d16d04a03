//! Kraken exchange adapter.
//!
//! Signs private REST calls the way Kraken requires (strictly increasing
//! nonce, HMAC-SHA512 over the path and a SHA-256 digest of the body) and
//! fetches open orders for the agent.

pub mod client;
pub mod config;
pub mod nonce;
pub mod protocol;
pub mod signer;

pub use client::{KrakenClient, OPEN_ORDERS_PATH};
pub use config::{ConfigError, Credentials, OpenOrderAgentOptions, ValidatedOptions};
pub use nonce::{next_nonce, Clock, ClockError, Nonce, NonceGenerator, SystemClock};
pub use signer::{sign, PrivateKey, SignError};
