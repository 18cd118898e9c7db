//! Error types
//!
//! Failures a single harvesting unit can produce, plus load-time validation
//! errors. Everything here is caught at the unit boundary by the orchestrator
//! except [`ValidationError`], which never gets past the loader.

use thiserror::Error;

/// Malformed configuration document
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("issuer {issuer}: at least one user group must be specified")]
    NoUserGroups { issuer: String },

    #[error("duplicated {kind} `{value}` in {owner}")]
    Duplicate {
        kind: &'static str,
        value: String,
        owner: String,
    },

    #[error("SLA {doc_uuid}: end date {end} precedes start date {start}")]
    SlaDates {
        doc_uuid: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("SLA document id `{0}` is not a valid UUID")]
    SlaDocUuid(String),

    #[error("provider {provider}: at least one trusted identity provider must be specified")]
    NoTrustedIdps { provider: String },

    #[error("provider {provider}: project {project} overrides unknown region `{region}`")]
    UnknownRegion {
        provider: String,
        project: String,
        region: String,
    },

    #[error("provider {provider}: unknown status `{status}`")]
    Status { provider: String, status: String },

    #[error("issuer {issuer}: failed to obtain access token: {reason}")]
    Token { issuer: String, reason: String },
}

/// Identity resolution failure for one project
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no SLA matching doc_uuid `{sla}` for project `{project}`")]
    NoMatchingSla { project: String, sla: String },

    #[error(
        "no identity provider matching endpoint `{issuer}` in provider trusted identity providers {trusted:?}"
    )]
    AuthMethodMismatch {
        project: String,
        issuer: String,
        trusted: Vec<String>,
    },
}

/// Provider backend failure
#[derive(Error, Debug)]
pub enum BackendError {
    /// Session could not be opened: unreachable endpoint, timeout, rejected
    /// token, unknown identity provider or protocol
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Harvesting failure for one (provider, region, project) unit
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("connection failure: {0}")]
    Connection(#[source] BackendError),

    #[error("failed to retrieve {service} data: {source}")]
    ServiceFetch {
        service: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("harvesting {0} providers is not supported")]
    Unsupported(&'static str),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
