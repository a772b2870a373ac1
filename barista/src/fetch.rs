//! Retrieval of the identity provider's key set
//!
//! A [`KeySetFetcher`] either fetches the key set from a remote URL or serves
//! a fixed set supplied at construction. Remote sets may be reused for a
//! configured lifetime; with a lifetime of zero every lookup goes to the
//! network.

use std::{
    ops::Deref,
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{error::KeySetError, AuthConfig, Jwks};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
struct CachedKeySet {
    jwks: Arc<Jwks>,
    fetched_at: Instant,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

#[derive(Debug)]
struct RemoteOptions {
    jwks_url: String,
    client: Client,
}

#[derive(Debug)]
struct Inner {
    remote: Option<RemoteOptions>,
    cache_ttl: Duration,
    cached: ArcSwapOption<CachedKeySet>,
    fetch_lock: Mutex<()>,
}

/// A key set handed out by a [`KeySetFetcher`]
#[derive(Clone, Debug)]
pub struct KeySet {
    jwks: Arc<Jwks>,
    live: bool,
}

impl KeySet {
    /// Whether this set was just retrieved, rather than served from cache
    ///
    /// Fixed key sets always count as live, since refetching cannot
    /// produce anything newer.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// The keys in the set
    pub fn jwks(&self) -> &Jwks {
        &self.jwks
    }
}

impl Deref for KeySet {
    type Target = Jwks;

    fn deref(&self) -> &Jwks {
        &self.jwks
    }
}

/// Retrieves and caches the identity provider's key set
#[derive(Clone, Debug)]
#[must_use]
pub struct KeySetFetcher {
    inner: Arc<Inner>,
    min_refetch_interval: Duration,
}

impl KeySetFetcher {
    /// Fetches from the configured key set URL
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(config: &AuthConfig) -> Result<Self, KeySetError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.fetch_timeout())
            .build()
            .map_err(KeySetError::Client)?;

        Ok(
            Self::with_client(config.jwks_url(), client, config.cache_ttl())
                .with_min_refetch_interval(config.min_refetch_interval()),
        )
    }

    /// Fetches from `jwks_url` using a caller-supplied client
    pub fn with_client(jwks_url: impl Into<String>, client: Client, cache_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote: Some(RemoteOptions {
                    jwks_url: jwks_url.into(),
                    client,
                }),
                cache_ttl,
                cached: ArcSwapOption::empty(),
                fetch_lock: Mutex::new(()),
            }),
            min_refetch_interval: Duration::ZERO,
        }
    }

    /// Sets how soon [`refetch()`][Self::refetch] may go back to the network
    /// after the last successful retrieval
    pub fn with_min_refetch_interval(self, min_refetch_interval: Duration) -> Self {
        Self {
            min_refetch_interval,
            ..self
        }
    }

    /// Serves a fixed key set without ever touching the network
    pub fn from_static(jwks: Jwks) -> Self {
        let this = Self {
            inner: Arc::new(Inner {
                remote: None,
                cache_ttl: Duration::MAX,
                cached: ArcSwapOption::empty(),
                fetch_lock: Mutex::new(()),
            }),
            min_refetch_interval: Duration::MAX,
        };

        this.set_jwks(jwks);
        this
    }

    /// The remote key set URL, if any
    pub fn jwks_url(&self) -> Option<&str> {
        self.inner.remote.as_ref().map(|r| r.jwks_url.as_str())
    }

    /// How long a fetched key set may be reused
    pub fn cache_ttl(&self) -> Duration {
        self.inner.cache_ttl
    }

    /// The most recently stored key set, regardless of age
    pub fn cached(&self) -> Option<Arc<Jwks>> {
        self.inner
            .cached
            .load_full()
            .map(|c| Arc::clone(&c.jwks))
    }

    /// Replaces the stored key set
    pub fn set_jwks(&self, jwks: Jwks) {
        self.store(Arc::new(jwks), None, None);
    }

    /// Gets the key set, reusing a stored set while it is within its lifetime
    ///
    /// Concurrent callers that find the stored set stale wait on a single
    /// retrieval rather than each going to the network.
    ///
    /// # Errors
    ///
    /// Fails if a retrieval was needed and did not succeed.
    pub async fn key_set(&self) -> Result<KeySet, KeySetError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(self.static_key_set());
        };

        if let Some(set) = self.fresh_cached() {
            return Ok(set);
        }

        if self.inner.cache_ttl.is_zero() {
            return self.fetch_from(remote, false).await;
        }

        let _guard = self.inner.fetch_lock.lock().await;

        if let Some(set) = self.fresh_cached() {
            tracing::trace!("JWKS retrieved by a concurrent request");
            return Ok(set);
        }

        self.fetch_from(remote, false).await
    }

    /// Retrieves the key set from the network, bypassing any stored set
    ///
    /// # Errors
    ///
    /// Fails if the key set cannot be retrieved.
    pub async fn fetch(&self) -> Result<KeySet, KeySetError> {
        match &self.inner.remote {
            Some(remote) => self.fetch_from(remote, false).await,
            None => Ok(self.static_key_set()),
        }
    }

    /// Retrieves the key set again because a token named a key it lacks
    ///
    /// Unlike [`fetch()`][Self::fetch], this goes to the network at most
    /// once per minimum refetch interval. Concurrent callers wait on a
    /// single retrieval, and a set stored within the interval is returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Fails if a retrieval was needed and did not succeed.
    pub async fn refetch(&self) -> Result<KeySet, KeySetError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(self.static_key_set());
        };

        if let Some(set) = self.recently_fetched() {
            tracing::debug!("JWKS fetched recently; not refetching");
            return Ok(set);
        }

        let _guard = self.inner.fetch_lock.lock().await;

        if let Some(set) = self.recently_fetched() {
            tracing::debug!("JWKS fetched recently; not refetching");
            return Ok(set);
        }

        self.fetch_from(remote, false).await
    }

    /// Revalidates the stored key set with the remote source
    ///
    /// The request carries `If-None-Match` or `If-Modified-Since` when the
    /// previous response supplied a validator. No retries are attempted; on
    /// failure the stored set is left untouched.
    ///
    /// # Errors
    ///
    /// Fails if the key set cannot be retrieved.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        if let Some(remote) = &self.inner.remote {
            tracing::Span::current().record("jwks.url", remote.jwks_url.as_str());
            tracing::debug!("refreshing JWKS");
            self.fetch_from(remote, true).await?;
        }

        Ok(())
    }

    /// Periodically refreshes the key set in the background
    ///
    /// Failed refreshes are logged and retried on the next tick.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero, or if called outside a Tokio runtime.
    pub fn spawn_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                let _ = this.refresh().await;
            }
        })
    }

    fn static_key_set(&self) -> KeySet {
        KeySet {
            jwks: self.cached().unwrap_or_default(),
            live: true,
        }
    }

    fn fresh_cached(&self) -> Option<KeySet> {
        if self.inner.cache_ttl.is_zero() {
            return None;
        }

        self.inner
            .cached
            .load_full()
            .filter(|c| c.fetched_at.elapsed() < self.inner.cache_ttl)
            .map(|c| KeySet {
                jwks: Arc::clone(&c.jwks),
                live: false,
            })
    }

    fn recently_fetched(&self) -> Option<KeySet> {
        self.inner
            .cached
            .load_full()
            .filter(|c| c.fetched_at.elapsed() < self.min_refetch_interval)
            .map(|c| KeySet {
                jwks: Arc::clone(&c.jwks),
                live: false,
            })
    }

    fn store(
        &self,
        jwks: Arc<Jwks>,
        etag: Option<HeaderValue>,
        last_modified: Option<HeaderValue>,
    ) {
        self.inner.cached.store(Some(Arc::new(CachedKeySet {
            jwks,
            fetched_at: Instant::now(),
            etag,
            last_modified,
        })));
    }

    async fn fetch_from(
        &self,
        remote: &RemoteOptions,
        conditional: bool,
    ) -> Result<KeySet, KeySetError> {
        let previous = self.inner.cached.load_full();
        let mut request = remote.client.get(&remote.jwks_url);

        if let Some(previous) = previous.as_ref().filter(|_| conditional) {
            if let Some(etag) = &previous.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &previous.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, jwks.url = %remote.jwks_url, "JWKS request failed");
            KeySetError::Transport(err)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            if let Some(previous) = previous.filter(|_| conditional) {
                tracing::debug!("JWKS not modified");
                let jwks = Arc::clone(&previous.jwks);
                self.store(
                    Arc::clone(&jwks),
                    previous.etag.clone(),
                    previous.last_modified.clone(),
                );
                return Ok(KeySet { jwks, live: true });
            }
        }

        if !status.is_success() {
            tracing::warn!(
                http.status_code = status.as_u16(),
                jwks.url = %remote.jwks_url,
                "JWKS request failed; unexpected response status",
            );
            return Err(KeySetError::Status(status));
        }

        let etag = response.headers().get(header::ETAG).cloned();
        let last_modified = response.headers().get(header::LAST_MODIFIED).cloned();

        let body = response.bytes().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS request failed while reading body");
            KeySetError::Transport(err)
        })?;

        let jwks: Jwks = serde_json::from_slice(&body).map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS response is not a valid key set");
            KeySetError::Decode(err)
        })?;

        let jwks = Arc::new(jwks);
        self.store(Arc::clone(&jwks), etag, last_modified);
        tracing::info!(jwks.keys = jwks.keys().len(), "JWKS refreshed");

        Ok(KeySet { jwks, live: true })
    }
}
