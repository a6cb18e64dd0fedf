//! Core domain + application logic for the zapgate WhatsApp HTTP gateway.
//!
//! This crate is intentionally framework-agnostic. The automation client and
//! the HTTP/WebSocket edge live behind ports (traits) implemented in adapter
//! crates.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod recipient;
pub mod relay;
pub mod session;

pub use errors::{Error, Result};
