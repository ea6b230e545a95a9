// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::sync::Arc;
use std::time::{Duration, Instant};

use dirlease_mapper::{AttributeMapper, DirectoryEntry, Mapped};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ConfigError, RemotingError, Result};
use crate::factory::ConnectionFactory;
use crate::ldap::LdapTransport;
use crate::metrics::PoolMetrics;
use crate::pool::{ConnectionPool, Lease, PoolConfig, PoolStats};
use crate::transport::{DirectoryTransport, Query, TransportError, TransportOptions};

/// Attribute list that asks the server for no attributes at all.
const NO_ATTRIBUTES: &str = "1.1";

pub struct DirectoryClientBuilder<X = LdapTransport> {
    config: ClientConfig,
    secure: bool,
    options: TransportOptions,
    pool_config: Option<PoolConfig>,
    metrics: Option<Arc<PoolMetrics>>,
    transport: X,
}

impl DirectoryClientBuilder<LdapTransport> {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            secure: false,
            options: TransportOptions::default(),
            pool_config: None,
            metrics: None,
            transport: LdapTransport::new(),
        }
    }
}

impl Default for DirectoryClientBuilder<LdapTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: DirectoryTransport + Clone> DirectoryClientBuilder<X> {
    /// Use TLS: `ldaps://` as given, StartTLS for `ldap://`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn transport_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the pool settings derived from the configuration.
    pub fn pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = Some(pool_config);
        self
    }

    pub fn metrics(mut self, metrics: Arc<PoolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn transport<Y: DirectoryTransport + Clone>(self, transport: Y) -> DirectoryClientBuilder<Y> {
        DirectoryClientBuilder {
            config: self.config,
            secure: self.secure,
            options: self.options,
            pool_config: self.pool_config,
            metrics: self.metrics,
            transport,
        }
    }

    /// Nothing is validated or connected here; that happens on first use.
    pub fn build(self) -> DirectoryClient<X> {
        DirectoryClient {
            config: self.config,
            secure: self.secure,
            options: self.options,
            pool_config: self.pool_config,
            metrics: self.metrics,
            transport: self.transport,
            pool: OnceCell::new(),
        }
    }
}

/// Entry point for searching and modifying directory entries.
///
/// The connection pool is created on the first operation. Until then the
/// configuration can be changed with [`DirectoryClient::configure`]; a failed
/// initialization leaves the client uninitialized so it can be reconfigured.
pub struct DirectoryClient<X: DirectoryTransport = LdapTransport> {
    config: ClientConfig,
    secure: bool,
    options: TransportOptions,
    pool_config: Option<PoolConfig>,
    metrics: Option<Arc<PoolMetrics>>,
    transport: X,
    pool: OnceCell<ConnectionPool<X>>,
}

impl DirectoryClient<LdapTransport> {
    pub fn builder() -> DirectoryClientBuilder<LdapTransport> {
        DirectoryClientBuilder::new()
    }
}

impl<X: DirectoryTransport + Clone> DirectoryClient<X> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Merge `config` into the current configuration.
    pub fn configure(&mut self, config: &ClientConfig) -> Result<()> {
        if self.pool.initialized() {
            return Err(ConfigError::AlreadyInitialized.into());
        }
        self.config.configure(config);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    pub fn stats(&self) -> Option<PoolStats> {
        self.pool.get().map(ConnectionPool::stats)
    }

    /// Close the pool, if it was ever created. Later operations fail with
    /// [`crate::ConnectionError::PoolClosed`].
    pub async fn shutdown(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }

    async fn pool(&self) -> Result<&ConnectionPool<X>> {
        self.pool
            .get_or_try_init(|| async { self.initialize() })
            .await
    }

    fn initialize(&self) -> Result<ConnectionPool<X>> {
        self.config.validate()?;

        let factory = ConnectionFactory::new(
            self.transport.clone(),
            &self.config,
            self.secure,
            self.options.clone(),
        )?;

        let pool_config = match &self.pool_config {
            Some(pool_config) => PoolConfig {
                metrics: pool_config.metrics.clone().or_else(|| self.metrics.clone()),
                ..pool_config.clone()
            },
            None => self.config.pool_config(self.metrics.clone()),
        };
        if pool_config.max_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "pool max_size must be greater than 0".to_string(),
            }
            .into());
        }

        info!(
            url = %self.config.url,
            secure = self.secure,
            max_size = pool_config.max_size,
            "Initializing directory client"
        );
        Ok(ConnectionPool::new(factory, pool_config))
    }

    /// Run `query` and map every result into a `T`.
    ///
    /// Attributes that cannot be converted leave the member untouched; use
    /// [`DirectoryClient::search_detailed`] to see them.
    pub async fn search<T: DirectoryEntry>(&self, query: &Query) -> Result<Vec<T>> {
        Ok(self
            .search_detailed::<T>(query)
            .await?
            .into_iter()
            .map(Mapped::into_inner)
            .collect())
    }

    pub async fn search_detailed<T: DirectoryEntry>(&self, query: &Query) -> Result<Vec<Mapped<T>>> {
        let pool = self.pool().await?;
        let mut lease = pool.acquire().await?;

        let start = Instant::now();
        let entries = match lease
            .execute_query(query, self.config.request_timeout())
            .await
        {
            Ok(entries) => entries,
            Err(e) => return Err(self.fail(pool, "search", lease, start, e).await),
        };
        let duration = self.finish(pool, "search", lease, start, true);
        debug!(%query, entries = entries.len(), duration_ms = duration.as_millis() as u64, "Search returned");

        let mapper = AttributeMapper::<T>::new();
        entries
            .iter()
            .map(|entry| {
                mapper
                    .map_from_attributes(&entry.attributes)
                    .map_err(RemotingError::from)
            })
            .collect()
    }

    /// Write the mapped members of `instance` to the single entry `query`
    /// resolves to.
    pub async fn modify<T: DirectoryEntry>(&self, query: &Query, instance: &T) -> Result<()> {
        let pool = self.pool().await?;
        let delta = AttributeMapper::<T>::new()
            .map_from_instance(instance)?
            .into_inner();

        let lookup = query.clone().attributes([NO_ATTRIBUTES]);
        let timeout = self.config.request_timeout();
        let mut lease = pool.acquire().await?;

        let start = Instant::now();
        let entries = match lease.execute_query(&lookup, timeout).await {
            Ok(entries) => entries,
            Err(e) => return Err(self.fail(pool, "modify", lease, start, e).await),
        };
        let dn = match entries.as_slice() {
            [entry] => entry.dn.clone(),
            found => {
                let duration = self.finish(pool, "modify", lease, start, false);
                warn!(
                    %query,
                    matches = found.len(),
                    duration_ms = duration.as_millis() as u64,
                    "Modify target is not a single entry"
                );
                let query = query.to_string();
                return Err(match found.len() {
                    0 => RemotingError::EntryNotFound {
                        operation: "modify",
                        query,
                        duration,
                    },
                    count => RemotingError::AmbiguousEntry {
                        operation: "modify",
                        query,
                        count,
                        duration,
                    },
                });
            }
        };

        if let Err(e) = lease.apply_update(&dn, &delta, timeout).await {
            return Err(self.fail(pool, "modify", lease, start, e).await);
        }
        let duration = self.finish(pool, "modify", lease, start, true);
        debug!(dn = %dn, changes = delta.len(), duration_ms = duration.as_millis() as u64, "Modified entry");
        Ok(())
    }

    /// Return the lease after the server answered, whether or not the answer
    /// lets the operation succeed.
    fn finish(
        &self,
        pool: &ConnectionPool<X>,
        operation: &'static str,
        lease: Lease<X>,
        start: Instant,
        succeeded: bool,
    ) -> Duration {
        let duration = start.elapsed();
        lease.release();
        if let Some(metrics) = pool.metrics() {
            metrics.record_operation(operation, succeeded, duration.as_secs_f64());
        }
        duration
    }

    /// Return or discard the lease after a failed remote call and wrap the
    /// failure.
    async fn fail(
        &self,
        pool: &ConnectionPool<X>,
        operation: &'static str,
        lease: Lease<X>,
        start: Instant,
        source: TransportError,
    ) -> RemotingError {
        let duration = start.elapsed();
        if source.is_connection_failure() {
            lease.invalidate().await;
        } else {
            lease.release();
        }
        if let Some(metrics) = pool.metrics() {
            metrics.record_operation(operation, false, duration.as_secs_f64());
        }
        warn!(
            operation,
            duration_ms = duration.as_millis() as u64,
            error = %source,
            "Directory operation failed"
        );
        RemotingError::Communication {
            operation,
            duration,
            source,
        }
    }
}
