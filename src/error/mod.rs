//! Error handling module for the gateway

mod error;

pub use error::{GatewayError, Result};
