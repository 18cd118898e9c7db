//! Data model
//!
//! Typed records shared by every stage of the feeder.
//!
//! # Module Structure
//!
//! - [`provider`] - Provider configuration: projects, regions, trusted IdPs
//! - [`identity`] - Issuers, user groups, SLAs and the resolved identity context
//! - [`resources`] - Harvested service descriptors and the per-project record
//!
//! Configuration entities are loaded once per run and never mutated
//! afterwards, so workers share them through `Arc` without locking.

pub mod identity;
pub mod provider;
pub mod resources;

pub use identity::{AuthMethod, Issuer, ResolvedIdentity, ScopedSla, ScopedUserGroup, Sla, UserGroup};
pub use provider::{
    Limits, Location, PerRegionProps, PrivateNetProxy, Project, Provider, ProviderKind,
    ProviderStatus, Region, RegionSettings, TrustedIdp,
};
pub use resources::{
    BlockStorageQuota, BlockStorageService, ComputeQuota, ComputeService, Flavor,
    IdentityService, Image, Network, NetworkQuota, NetworkService, ProjectInfo, ProjectRecord,
    ServiceName,
};
