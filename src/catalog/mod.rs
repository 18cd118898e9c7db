//! Federation Registry catalog
//!
//! # Module Structure
//!
//! - [`assemble`] - Per-provider payloads built from the harvested records
//! - [`client`] - Create / update / remove calls against the registry

pub mod assemble;
pub mod client;

pub use assemble::{assemble, FederatedProvider, IdentityProviderEntry, RegionEntry};
pub use client::{publish, CatalogClient, PublishSummary, StoredProvider};
