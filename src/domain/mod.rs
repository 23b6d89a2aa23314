//! Domain layer for the procflow task engine
//!
//! This module contains the core models and the ports adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
