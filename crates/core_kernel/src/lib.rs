//! Core Kernel - Foundational types and utilities for the clinic claims engine
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Strongly-typed entity identifiers
//! - The NRIC/FIN patient identifier value object
//! - The port error taxonomy shared by all adapters

pub mod identifiers;
pub mod nric;
pub mod error;
pub mod ports;

pub use identifiers::{VisitId, RunId};
pub use nric::Nric;
pub use error::CoreError;
pub use ports::{PortError, DomainPort};
