//! Automation Bridge Infrastructure
//!
//! Implements the clinic and portal driver ports as HTTP clients against a
//! local automation-bridge sidecar. The sidecar owns the browser and all
//! DOM/selector logic; this crate owns the protocol and the error mapping
//! into the shared port taxonomy.

pub mod client;
pub mod clinic;
pub mod portal;

pub use client::{BridgeClient, BridgeConfig};
pub use clinic::ClinicBridge;
pub use portal::PortalBridge;
