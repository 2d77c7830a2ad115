//! Test Utilities Crate
//!
//! Provides shared test infrastructure for the claims pipeline test suite.
//!
//! # Modules
//!
//! - `builders`: Builder patterns for test visit construction
//! - `memory`: In-memory visit and run stores
//! - `scripted`: Programmable clinic and portal driver doubles

pub mod builders;
pub mod memory;
pub mod scripted;

pub use builders::*;
pub use memory::*;
pub use scripted::*;
