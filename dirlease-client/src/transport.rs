// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! The boundary to the directory protocol implementation.
//!
//! Everything the pool and the client need from the wire is expressed by
//! [`DirectoryTransport`]. [`crate::LdapTransport`] implements it on top of
//! `ldap3`.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use dirlease_mapper::{AttributeDelta, AttributeSet, DirectoryEntry, attribute_names};
use ldap3::LdapError;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ConfigError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("LDAP error: {0}")]
    Ldap(#[from] LdapError),

    #[error("directory returned result code {rc}: {text}")]
    ResultCode { rc: u32, text: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the request was rejected on this side before it reached the
    /// server, such as a filter that does not parse. Repeating it fails the
    /// same way.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            TransportError::Ldap(
                LdapError::FilterParsing
                    | LdapError::AddNoValues
                    | LdapError::DecodingUTF8
                    | LdapError::UrlParsing { .. }
                    | LdapError::UnknownScheme(_)
                    | LdapError::InvalidScopeString(_)
                    | LdapError::UnrecognizedCriticalExtension(_)
                    | LdapError::EmptyUnixPath
                    | LdapError::PortInUnixPath
            )
        )
    }

    /// Whether the session that produced this error must not be reused.
    ///
    /// A result code means the server answered, so the session is healthy.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            TransportError::ResultCode { .. } => false,
            TransportError::Ldap(LdapError::LdapResult { .. }) => false,
            other => !other.is_local(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bind_dn: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

/// Transport settings supplied through the client builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upgrade a plain `ldap://` connection with StartTLS.
    pub starttls: bool,
    /// Verify the server certificate on secure connections.
    pub verify_certificates: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            starttls: false,
            verify_certificates: true,
        }
    }
}

/// Everything needed to open a session, built once per connection factory.
#[derive(Debug, Clone)]
pub struct TransportDescriptor {
    pub url: Url,
    pub credentials: Credentials,
    pub secure: bool,
    pub options: TransportOptions,
    pub connect_timeout: Duration,
}

impl TransportDescriptor {
    pub fn new(
        config: &ClientConfig,
        secure: bool,
        options: TransportOptions,
    ) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.url).map_err(|e| ConfigError::InvalidEndpoint {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none_or(str::is_empty) && url.scheme() != "ldapi" {
            return Err(ConfigError::InvalidEndpoint {
                url: config.url.clone(),
                reason: "missing host".to_string(),
            });
        }
        if config.username.is_empty() {
            return Err(ConfigError::Missing("User name"));
        }

        Ok(Self {
            url,
            credentials: Credentials {
                bind_dn: config.username.clone(),
                password: config.password.clone(),
            },
            secure,
            options,
            connect_timeout: config.connection_timeout(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

/// A directory search: base DN, scope, filter and the attributes to return.
///
/// An empty attribute list asks for all user attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attributes: Vec<String>,
}

impl Query {
    pub fn new(base: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope: SearchScope::default(),
            filter: filter.into(),
            attributes: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Only return the attributes `T` declares.
    pub fn returning<T: DirectoryEntry>(self) -> Self {
        self.attributes(attribute_names::<T>())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base = {}, filter = {}", self.base, self.filter)
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: AttributeSet,
}

pub trait DirectoryTransport: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Check a descriptor before any session is opened.
    fn prepare(&self, _descriptor: &TransportDescriptor) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Connect and authenticate.
    fn open_session(
        &self,
        descriptor: &TransportDescriptor,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;

    fn close_session(
        &self,
        session: Self::Session,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn execute_query(
        &self,
        session: &mut Self::Session,
        query: &Query,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Entry>, TransportError>> + Send;

    /// Replace the attributes named in `delta` on the entry `dn`.
    fn apply_update(
        &self,
        session: &mut Self::Session,
        dn: &str,
        delta: &AttributeDelta,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Cheap liveness check run before an idle session is leased again.
    fn is_alive(&self, _session: &mut Self::Session) -> bool {
        true
    }
}
