//! Identity provider settings

use std::{num::ParseIntError, time::Duration};

use thiserror::Error;

use crate::{
    error::UnknownAlgorithm,
    jwa::Algorithm,
    jwt::{Audience, AudienceRef, Issuer},
};

/// Settings describing the trusted identity provider and this API
///
/// ```
/// use std::time::Duration;
/// use barista::{jwa::Algorithm, AuthConfig};
///
/// let config = AuthConfig::new("coffee.us.auth0.com", "drinks")
///     .with_algorithms([Algorithm::RS256, Algorithm::PS256])
///     .with_cache_ttl(Duration::from_secs(300));
///
/// assert_eq!(config.issuer().as_str(), "https://coffee.us.auth0.com/");
/// assert_eq!(config.jwks_url(), "https://coffee.us.auth0.com/.well-known/jwks.json");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthConfig {
    domain: String,
    audience: Audience,
    algorithms: Vec<Algorithm>,
    jwks_url: Option<String>,
    leeway: Duration,
    fetch_timeout: Duration,
    cache_ttl: Duration,
    min_refetch_interval: Duration,
}

/// Environment variable naming the identity provider's host
pub const DOMAIN_VAR: &str = "DOMAIN_NAME";
/// Environment variable naming the expected audience
pub const AUDIENCE_VAR: &str = "AUDIENCE";
/// Environment variable listing accepted algorithms, separated by commas
pub const ALGORITHM_VAR: &str = "ALGORITHM";
/// Environment variable holding the key set cache lifetime in seconds
pub const CACHE_TTL_VAR: &str = "JWKS_CACHE_TTL_SECS";
/// Environment variable holding the key set request timeout in seconds
pub const FETCH_TIMEOUT_VAR: &str = "JWKS_FETCH_TIMEOUT_SECS";
/// Environment variable holding the minimum seconds between refetches for unknown keys
pub const MIN_REFETCH_VAR: &str = "JWKS_MIN_REFETCH_SECS";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

impl AuthConfig {
    /// Trusts tokens issued by `https://{domain}/` for `audience`
    ///
    /// Defaults to accepting only RS256, no clock leeway, a five second
    /// key set timeout, and no key set caching. A cached key set is refetched
    /// for an unknown key at most once every thirty seconds.
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: Audience::new(audience.into()),
            algorithms: vec![Algorithm::RS256],
            jwks_url: None,
            leeway: Duration::ZERO,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_ttl: Duration::ZERO,
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
        }
    }

    /// Reads settings from the process environment
    ///
    /// # Errors
    ///
    /// Fails if a required variable is missing or any variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        let seconds = |var: &'static str| {
            lookup(var)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|source| ConfigError::InvalidNumber { var, source })
                })
                .transpose()
        };

        let mut config = Self::new(required(DOMAIN_VAR)?, required(AUDIENCE_VAR)?);

        if let Some(algs) = lookup(ALGORITHM_VAR) {
            let algorithms = algs
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<Algorithm>, _>>()?;

            if algorithms.is_empty() {
                return Err(ConfigError::NoAlgorithms);
            }

            config = config.with_algorithms(algorithms);
        }

        if let Some(ttl) = seconds(CACHE_TTL_VAR)? {
            config = config.with_cache_ttl(ttl);
        }

        if let Some(timeout) = seconds(FETCH_TIMEOUT_VAR)? {
            config = config.with_fetch_timeout(timeout);
        }

        if let Some(interval) = seconds(MIN_REFETCH_VAR)? {
            config = config.with_min_refetch_interval(interval);
        }

        Ok(config)
    }

    /// Replaces the accepted signing algorithms
    ///
    /// An empty list rejects every token.
    #[must_use]
    pub fn with_algorithms(self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        Self {
            algorithms: algorithms.into_iter().collect(),
            ..self
        }
    }

    /// Overrides the URL the key set is fetched from
    #[must_use]
    pub fn with_jwks_url(self, url: impl Into<String>) -> Self {
        Self {
            jwks_url: Some(url.into()),
            ..self
        }
    }

    /// Sets the clock leeway allowed when checking `exp` and `nbf`
    #[must_use]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Sets the timeout for key set requests
    #[must_use]
    pub fn with_fetch_timeout(self, fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout,
            ..self
        }
    }

    /// Sets how long a fetched key set may be reused
    ///
    /// Zero fetches the key set for every token.
    #[must_use]
    pub fn with_cache_ttl(self, cache_ttl: Duration) -> Self {
        Self { cache_ttl, ..self }
    }

    /// Sets how soon a cached key set may be refetched when a token names
    /// a key it does not hold
    #[must_use]
    pub fn with_min_refetch_interval(self, min_refetch_interval: Duration) -> Self {
        Self {
            min_refetch_interval,
            ..self
        }
    }

    /// The identity provider's host name
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The audience tokens must be intended for
    pub fn audience(&self) -> &AudienceRef {
        &self.audience
    }

    /// The issuer tokens must come from, `https://{domain}/`
    pub fn issuer(&self) -> Issuer {
        Issuer::new(format!("https://{}/", self.domain))
    }

    /// The accepted signing algorithms
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// The key set URL, `https://{domain}/.well-known/jwks.json` unless overridden
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", self.domain))
    }

    /// The clock leeway allowed when checking `exp` and `nbf`
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// The timeout for key set requests
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// How long a fetched key set may be reused
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// The minimum time between refetches triggered by unknown keys
    pub fn min_refetch_interval(&self) -> Duration {
        self.min_refetch_interval
    }
}

/// An error reading settings from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    /// An algorithm name is not supported
    #[error("unsupported signing algorithm")]
    InvalidAlgorithm(#[from] UnknownAlgorithm),

    /// The algorithm list names no algorithms
    #[error("at least one signing algorithm must be listed")]
    NoAlgorithms,

    /// A variable does not hold a whole number of seconds
    #[error("environment variable {var} must be a whole number of seconds")]
    InvalidNumber {
        /// The offending variable
        var: &'static str,
        /// The underlying parse failure
        #[source]
        source: ParseIntError,
    },
}
