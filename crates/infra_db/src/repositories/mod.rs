//! Repository implementations
//!
//! Each repository wraps the shared connection pool and implements the
//! corresponding domain port.

pub mod runs;
pub mod visits;

pub use runs::RunRepository;
pub use visits::VisitRepository;
