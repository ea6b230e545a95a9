// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! In-memory directory used by the unit tests.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dirlease_mapper::{AttributeDelta, AttributeSet};

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::factory::ConnectionFactory;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::transport::{DirectoryTransport, Entry, Query, TransportDescriptor, TransportError};

pub(crate) struct MemorySession {
    generation: u64,
}

/// A directory that answers `(attr=value)` and `(attr=*)` filters from a
/// fixed entry list and records everything it is asked to do.
#[derive(Clone, Default)]
pub(crate) struct MemoryDirectory {
    entries: Arc<Mutex<Vec<Entry>>>,
    updates: Arc<Mutex<Vec<(String, AttributeDelta)>>>,
    generation: Arc<AtomicU64>,
    pub prepares: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub queries: Arc<AtomicUsize>,
    pub fail_open: Arc<AtomicBool>,
    /// Fail queries and updates as if the connection broke
    pub fail_connection: Arc<AtomicBool>,
    /// Fail queries and updates with a directory result code
    pub fail_result: Arc<AtomicBool>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, dn: &str, attributes: AttributeSet) -> Self {
        self.entries
            .lock()
            .unwrap()
            .push(Entry {
                dn: dn.to_string(),
                attributes,
            });
        self
    }

    /// Make every open session report itself dead.
    pub fn kill_sessions(&self) {
        self.generation.fetch_add(1, SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, AttributeDelta)> {
        self.updates.lock().unwrap().clone()
    }

    fn failure(&self) -> Result<(), TransportError> {
        if self.fail_connection.load(SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        if self.fail_result.load(SeqCst) {
            return Err(TransportError::ResultCode {
                rc: 50,
                text: "insufficientAccessRights".to_string(),
            });
        }
        Ok(())
    }
}

fn filter_matches(filter: &str, attributes: &AttributeSet) -> bool {
    let Some((name, value)) = filter
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .and_then(|f| f.split_once('='))
    else {
        return false;
    };
    match attributes.get(name) {
        Some(_) if value == "*" => true,
        Some(values) => values.iter().any(|v| v.eq_ignore_ascii_case(value)),
        None => false,
    }
}

impl DirectoryTransport for MemoryDirectory {
    type Session = MemorySession;

    fn prepare(&self, _descriptor: &TransportDescriptor) -> Result<(), ConfigError> {
        self.prepares.fetch_add(1, SeqCst);
        Ok(())
    }

    async fn open_session(
        &self,
        _descriptor: &TransportDescriptor,
    ) -> Result<MemorySession, TransportError> {
        if self.fail_open.load(SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.opens.fetch_add(1, SeqCst);
        Ok(MemorySession {
            generation: self.generation.load(SeqCst),
        })
    }

    async fn close_session(&self, _session: MemorySession) -> Result<(), TransportError> {
        self.closes.fetch_add(1, SeqCst);
        Ok(())
    }

    async fn execute_query(
        &self,
        _session: &mut MemorySession,
        query: &Query,
        _timeout: Duration,
    ) -> Result<Vec<Entry>, TransportError> {
        self.queries.fetch_add(1, SeqCst);
        self.failure()?;

        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.dn.ends_with(&query.base) && filter_matches(&query.filter, &e.attributes))
            .map(|e| Entry {
                dn: e.dn.clone(),
                attributes: if query.attributes.is_empty() {
                    e.attributes.clone()
                } else {
                    e.attributes
                        .iter()
                        .filter(|(name, _)| query.attributes.iter().any(|a| a == name))
                        .map(|(name, values)| (name, values.to_vec()))
                        .collect()
                },
            })
            .collect())
    }

    async fn apply_update(
        &self,
        _session: &mut MemorySession,
        dn: &str,
        delta: &AttributeDelta,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.failure()?;
        self.updates
            .lock()
            .unwrap()
            .push((dn.to_string(), delta.clone()));
        Ok(())
    }

    fn is_alive(&self, session: &mut MemorySession) -> bool {
        session.generation == self.generation.load(SeqCst)
    }
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new("ldap://localhost:389", "cn=admin,dc=example,dc=com", "secret")
}

pub(crate) fn pool_with(directory: MemoryDirectory, config: PoolConfig) -> ConnectionPool<MemoryDirectory> {
    let factory = ConnectionFactory::new(directory, &test_config(), false, Default::default())
        .expect("valid test configuration");
    ConnectionPool::new(factory, config)
}
