// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::time::Duration;

use dirlease_mapper::MappingError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{0} must be configured")]
    Missing(&'static str),

    #[error("Invalid endpoint URL {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("Client is already initialized, configuration can no longer change")]
    AlreadyInitialized,
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("timeout: acquiring connection from pool after {0:?}")]
    PoolTimeout(Duration),

    #[error("timeout: connecting to directory server after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to open directory session: {0}")]
    Open(#[source] TransportError),

    #[error("Connection pool is closed")]
    PoolClosed,
}

/// Whether a failure originates locally or in talking to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LocalApplication,
    RemotingCommunication,
}

/// The error every [`crate::DirectoryClient`] operation fails with.
#[derive(Error, Debug)]
pub enum RemotingError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Failed to perform {operation} after {duration:?}: {source}")]
    Communication {
        operation: &'static str,
        duration: Duration,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: no entry matches {query}")]
    EntryNotFound {
        operation: &'static str,
        query: String,
        duration: Duration,
    },

    #[error("{operation}: {count} entries match {query}, expected exactly one")]
    AmbiguousEntry {
        operation: &'static str,
        query: String,
        count: usize,
        duration: Duration,
    },
}

impl RemotingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemotingError::Configuration(_) | RemotingError::Mapping(_) => {
                ErrorKind::LocalApplication
            }
            RemotingError::Connection(_)
            | RemotingError::Communication { .. }
            | RemotingError::EntryNotFound { .. }
            | RemotingError::AmbiguousEntry { .. } => ErrorKind::RemotingCommunication,
        }
    }

    /// Whether repeating the operation may succeed.
    ///
    /// Configuration and mapping problems, requests rejected before they were
    /// sent, and queries that do not resolve to one entry fail the same way
    /// every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemotingError::Connection(_) => true,
            RemotingError::Communication { source, .. } => !source.is_local(),
            _ => false,
        }
    }

    /// Time spent in the remote call, for failures that reached the server.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            RemotingError::Communication { duration, .. }
            | RemotingError::EntryNotFound { duration, .. }
            | RemotingError::AmbiguousEntry { duration, .. } => Some(*duration),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemotingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_local_and_final() {
        let err = RemotingError::from(ConfigError::Missing("Password"));
        assert_eq!(err.kind(), ErrorKind::LocalApplication);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Configuration error: Password must be configured");
    }

    #[test]
    fn test_communication_errors_are_retryable() {
        let err = RemotingError::Communication {
            operation: "search",
            duration: Duration::from_millis(12),
            source: TransportError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(err.kind(), ErrorKind::RemotingCommunication);
        assert!(err.is_retryable());
        assert_eq!(err.duration(), Some(Duration::from_millis(12)));
    }

    #[test]
    fn test_unparsable_filter_is_not_retryable() {
        let err = RemotingError::Communication {
            operation: "search",
            duration: Duration::from_millis(1),
            source: TransportError::Ldap(ldap3::LdapError::FilterParsing),
        };
        assert_eq!(err.kind(), ErrorKind::RemotingCommunication);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unresolved_entry_carries_duration() {
        let err = RemotingError::AmbiguousEntry {
            operation: "modify",
            query: "base = dc=example,dc=com, filter = (objectClass=*)".to_string(),
            count: 2,
            duration: Duration::from_millis(7),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.duration(), Some(Duration::from_millis(7)));
    }

    #[test]
    fn test_pool_exhaustion_is_remote() {
        let err = RemotingError::from(ConnectionError::PoolTimeout(Duration::from_secs(30)));
        assert_eq!(err.kind(), ErrorKind::RemotingCommunication);
        assert!(err.is_retryable());
        assert_eq!(err.duration(), None);
    }
}
