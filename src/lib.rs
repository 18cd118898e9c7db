//! fedreg-feeder
//!
//! Reads federated provider definitions, harvests every OpenStack project
//! they declare and publishes the result to the Federation Registry.
//!
//! # Module Structure
//!
//! - [`config`] - Command line arguments and run settings
//! - [`loader`] - Site documents to validated providers and issuers
//! - [`model`] - Configuration and harvested resource types
//! - [`identity`] - Issuer / SLA resolution for a project
//! - [`backend`] - Provider access seam and its OpenStack implementation
//! - [`harvest`] - Per-project harvesting and network rules
//! - [`orchestrator`] - Bounded fan-out over every project
//! - [`catalog`] - Payload assembly and Federation Registry updates
//! - [`error`] - Error taxonomy

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod harvest;
pub mod identity;
pub mod loader;
pub mod model;
pub mod orchestrator;

/// Version injected at compile time via FEDREG_FEEDER_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("FEDREG_FEEDER_VERSION") {
    Some(v) => v,
    None => "dev",
};
