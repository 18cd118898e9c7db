//! Configuration Management
//!
//! Command line arguments, their environment fallbacks and the run settings
//! derived from them.

use crate::orchestrator::DEFAULT_MAX_WORKERS;
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use url::Url;

/// Feed the Federation Registry with the resources of federated providers
#[derive(Parser, Debug, Clone)]
#[command(name = "fedreg-feeder", version, about, long_about = None)]
pub struct Args {
    /// Federation Registry base URL
    #[arg(long, env = "FEDERATION_REGISTRY_URL", default_value = "http://localhost:8000")]
    pub federation_registry_url: Url,

    /// Directory holding the `*.config.yaml` site documents
    #[arg(long, env = "PROVIDERS_CONF_DIR", default_value = "./providers-conf")]
    pub providers_conf_dir: PathBuf,

    /// Container running oidc-agent, used for issuers without a token
    #[arg(
        long,
        env = "OIDC_AGENT_CONTAINER_NAME",
        default_value = "federation-registry-feeder-oidc-agent-1"
    )]
    pub oidc_agent_container_name: String,

    /// Federation Registry providers API version
    #[arg(long, env = "PROVIDERS_API_VERSION", default_value = "v1")]
    pub providers_api_version: String,

    /// Units harvested concurrently
    #[arg(long, env = "MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Timeout of every provider request, in seconds
    #[arg(long, default_value_t = 2)]
    pub request_timeout: u64,

    /// Timeout of every Federation Registry request, in seconds
    #[arg(long, default_value_t = 5)]
    pub catalog_timeout: u64,

    /// Federation Registry access token. Defaults to the first issuer token.
    #[arg(long, env = "FEDREG_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print the assembled providers instead of publishing them
    #[arg(long)]
    pub dry_run: bool,

    /// Log level. `RUST_LOG` takes precedence when set.
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Also write logs to a file in the user data directory
    #[arg(long)]
    pub log_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }

    /// Directive usable in an `EnvFilter`
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Federation Registry API versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersions {
    pub providers: String,
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            providers: "v1".to_string(),
        }
    }
}

/// Federation Registry endpoints used by the feeder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
    pub providers: Url,
}

/// Build the catalog endpoints: `{base}/api/{version}/{resource}`
pub fn infer_endpoints(base: &Url, versions: &ApiVersions) -> Result<CatalogEndpoints> {
    tracing::info!("Building Federation Registry endpoints from configuration");

    let mut providers = base.clone();
    providers
        .path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Invalid Federation Registry URL: {}", base))?
        .pop_if_empty()
        .extend(["api", versions.providers.as_str(), "providers"]);

    Ok(CatalogEndpoints { providers })
}

/// Validated run settings
#[derive(Clone)]
pub struct Settings {
    pub federation_registry_url: Url,
    pub providers_conf_dir: PathBuf,
    pub oidc_agent_container_name: String,
    pub api_versions: ApiVersions,
    pub max_workers: usize,
    pub provider_timeout: Duration,
    pub catalog_timeout: Duration,
    pub catalog_token: Option<String>,
    pub dry_run: bool,
}

// Security: never print the catalog token
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("federation_registry_url", &self.federation_registry_url.as_str())
            .field("providers_conf_dir", &self.providers_conf_dir)
            .field("oidc_agent_container_name", &self.oidc_agent_container_name)
            .field("api_versions", &self.api_versions)
            .field("max_workers", &self.max_workers)
            .field("provider_timeout", &self.provider_timeout)
            .field("catalog_timeout", &self.catalog_timeout)
            .field("catalog_token", &self.catalog_token.as_ref().map(|_| "<redacted>"))
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self> {
        if !matches!(args.federation_registry_url.scheme(), "http" | "https") {
            bail!(
                "Federation Registry URL must use http or https: {}",
                args.federation_registry_url
            );
        }
        if args.max_workers == 0 {
            bail!("--max-workers must be at least 1");
        }
        if args.request_timeout == 0 || args.catalog_timeout == 0 {
            bail!("Request timeouts must be at least 1 second");
        }

        Ok(Self {
            federation_registry_url: args.federation_registry_url.clone(),
            providers_conf_dir: args.providers_conf_dir.clone(),
            oidc_agent_container_name: args.oidc_agent_container_name.clone(),
            api_versions: ApiVersions {
                providers: args.providers_api_version.clone(),
            },
            max_workers: args.max_workers,
            provider_timeout: Duration::from_secs(args.request_timeout),
            catalog_timeout: Duration::from_secs(args.catalog_timeout),
            catalog_token: args.token.clone().filter(|t| !t.is_empty()),
            dry_run: args.dry_run,
        })
    }

    pub fn catalog_endpoints(&self) -> Result<CatalogEndpoints> {
        infer_endpoints(&self.federation_registry_url, &self.api_versions)
            .context("Failed to build Federation Registry endpoints")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "fedreg-feeder",
            "--federation-registry-url",
            "http://localhost:8000",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_args(&args(&["--max-workers", "7", "--token", ""])).unwrap();

        assert_eq!(settings.max_workers, 7);
        assert_eq!(settings.provider_timeout, Duration::from_secs(2));
        assert_eq!(settings.catalog_timeout, Duration::from_secs(5));
        assert!(settings.catalog_token.is_none());
        assert!(!settings.dry_run);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Settings::from_args(&args(&["--max-workers", "0"])).is_err());
    }

    #[test]
    fn test_non_http_registry_rejected() {
        let mut parsed = args(&[]);
        parsed.federation_registry_url = Url::parse("ftp://registry.example.org").unwrap();
        assert!(Settings::from_args(&parsed).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = Settings::from_args(&args(&["--token", "super-secret", "--max-workers", "2"])).unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_infer_endpoints() {
        let base = Url::parse("http://localhost:8000").unwrap();
        let endpoints = infer_endpoints(&base, &ApiVersions::default()).unwrap();
        assert_eq!(endpoints.providers.as_str(), "http://localhost:8000/api/v1/providers");
    }

    #[test]
    fn test_infer_endpoints_keeps_base_path() {
        let base = Url::parse("https://example.org/registry/").unwrap();
        let versions = ApiVersions {
            providers: "v2".to_string(),
        };
        let endpoints = infer_endpoints(&base, &versions).unwrap();
        assert_eq!(
            endpoints.providers.as_str(),
            "https://example.org/registry/api/v2/providers"
        );
    }

    #[test]
    fn test_log_level_directive() {
        assert_eq!(LogLevel::Off.as_str(), "off");
        assert_eq!(LogLevel::Debug.to_tracing_level(), Some(Level::DEBUG));
    }
}
