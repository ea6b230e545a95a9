// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::transport::{DirectoryTransport, TransportDescriptor, TransportError, TransportOptions};

/// An open, authenticated session together with its bookkeeping.
pub struct RawConnection<S> {
    pub(crate) id: u64,
    pub(crate) session: S,
    pub(crate) opened_at: Instant,
}

impl<S> RawConnection<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

/// Opens and closes sessions against one configured endpoint.
pub struct ConnectionFactory<X: DirectoryTransport> {
    transport: X,
    descriptor: TransportDescriptor,
    next_id: AtomicU64,
}

impl<X: DirectoryTransport> ConnectionFactory<X> {
    /// Build the transport descriptor from `config` and let the transport
    /// check it. No session is opened here.
    pub fn new(
        transport: X,
        config: &ClientConfig,
        secure: bool,
        options: TransportOptions,
    ) -> Result<Self, ConfigError> {
        let descriptor = TransportDescriptor::new(config, secure, options)?;
        transport.prepare(&descriptor)?;

        Ok(Self {
            transport,
            descriptor,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn descriptor(&self) -> &TransportDescriptor {
        &self.descriptor
    }

    pub async fn create_connection(&self) -> Result<RawConnection<X::Session>, TransportError> {
        let session = self.transport.open_session(&self.descriptor).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, url = %self.descriptor.url, "Opened directory session");

        Ok(RawConnection {
            id,
            session,
            opened_at: Instant::now(),
        })
    }

    /// Close a session. Failures are logged, the session is gone either way.
    pub async fn destroy_connection(&self, conn: RawConnection<X::Session>) {
        let RawConnection { id, session, opened_at } = conn;
        match self.transport.close_session(session).await {
            Ok(()) => debug!(
                connection = id,
                age_ms = opened_at.elapsed().as_millis() as u64,
                "Closed directory session"
            ),
            Err(e) => warn!(connection = id, error = %e, "Failed to close directory session"),
        }
    }
}
