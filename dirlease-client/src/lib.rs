// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Pooled directory client with declarative attribute mapping.
//!
//! [`DirectoryClient`] is the entry point: it validates its configuration and
//! builds the connection pool on first use, leases a session for each
//! operation and always gives it back, and maps entries to and from typed
//! records through [`dirlease_mapper`].
//!
//! # Example
//!
//! ```ignore
//! use dirlease_client::{ClientConfig, DirectoryClient, Query, directory_entry};
//!
//! #[derive(Default)]
//! struct User {
//!     uid: Option<String>,
//!     mail: Option<String>,
//! }
//!
//! directory_entry!(User {
//!     field uid => "uid",
//!     field mail => "mail",
//! });
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DirectoryClient::builder()
//!         .config(ClientConfig::load("dirlease.toml".as_ref())?)
//!         .secure(true)
//!         .build();
//!
//!     let query = Query::new("ou=people,dc=example,dc=com", "(uid=jdoe)").returning::<User>();
//!     let mut users: Vec<User> = client.search(&query).await?;
//!
//!     users[0].mail = Some("jdoe@example.com".into());
//!     client.modify(&query, &users[0]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Using the pool directly
//!
//! ```ignore
//! use dirlease_client::{ConnectionFactory, ConnectionPool, LdapTransport, PoolConfig};
//!
//! let factory = ConnectionFactory::new(LdapTransport::new(), &config, false, Default::default())?;
//! let pool = ConnectionPool::new(factory, PoolConfig::default());
//! let mut lease = pool.acquire().await?;
//! let entries = lease.execute_query(&query, timeout).await?;
//! // Dropping the lease returns it as well
//! lease.release();
//! ```

mod client;
pub mod config;
mod error;
mod factory;
mod ldap;
pub mod metrics;
pub mod pool;
mod transport;

#[cfg(test)]
mod testing;

pub use client::{DirectoryClient, DirectoryClientBuilder};
pub use config::{ClientConfig, PoolSettings};
pub use error::{ConfigError, ConnectionError, ErrorKind, RemotingError, Result};
pub use factory::{ConnectionFactory, RawConnection};
pub use ldap::LdapTransport;
pub use metrics::PoolMetrics;
pub use pool::{ConnectionPool, Lease, PoolConfig, PoolStats};
pub use transport::{
    Credentials, DirectoryTransport, Entry, Query, SearchScope, TransportDescriptor,
    TransportError, TransportOptions,
};

// Re-export the mapping layer
pub use dirlease_mapper::{
    AttributeDelta, AttributeMapper, AttributeSet, DirectoryEntry, FromAttribute, Mapped,
    MappingError, MemberError, MemberOutcome, MemberStatus, ToAttribute, directory_entry,
};
