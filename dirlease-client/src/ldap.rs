// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! [`DirectoryTransport`] over LDAP, backed by `ldap3`.

use std::collections::HashSet;
use std::time::Duration;

use dirlease_mapper::{AttributeDelta, AttributeSet};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use tracing::{debug, trace, warn};

use crate::error::ConfigError;
use crate::transport::{
    DirectoryTransport, Entry, Query, SearchScope, TransportDescriptor, TransportError,
};

const SCHEMES: [&str; 3] = ["ldap", "ldaps", "ldapi"];

#[derive(Debug, Clone, Copy, Default)]
pub struct LdapTransport;

impl LdapTransport {
    pub fn new() -> Self {
        Self
    }

    fn settings(descriptor: &TransportDescriptor) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new().set_conn_timeout(descriptor.connect_timeout);
        if descriptor.secure || descriptor.options.starttls {
            let starttls = descriptor.url.scheme() == "ldap";
            settings = settings
                .set_starttls(starttls)
                .set_no_tls_verify(!descriptor.options.verify_certificates);
        }
        settings
    }
}

fn check(result: LdapResult) -> Result<(), TransportError> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(TransportError::ResultCode {
            rc: result.rc,
            text: result.text,
        })
    }
}

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

impl DirectoryTransport for LdapTransport {
    type Session = Ldap;

    fn prepare(&self, descriptor: &TransportDescriptor) -> Result<(), ConfigError> {
        let scheme = descriptor.url.scheme();
        if !SCHEMES.contains(&scheme) {
            return Err(ConfigError::InvalidEndpoint {
                url: descriptor.url.to_string(),
                reason: format!("unsupported scheme {scheme:?}"),
            });
        }
        if descriptor.secure && scheme == "ldapi" {
            return Err(ConfigError::InvalidEndpoint {
                url: descriptor.url.to_string(),
                reason: "TLS is not available over ldapi".to_string(),
            });
        }
        Ok(())
    }

    async fn open_session(&self, descriptor: &TransportDescriptor) -> Result<Ldap, TransportError> {
        debug!(url = %descriptor.url, secure = descriptor.secure, "Connecting to directory server");

        let (conn, mut ldap) =
            LdapConnAsync::with_settings(Self::settings(descriptor), descriptor.url.as_str())
                .await?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let credentials = &descriptor.credentials;
        let bound = ldap
            .simple_bind(&credentials.bind_dn, &credentials.password)
            .await
            .map_err(TransportError::from)
            .and_then(check);
        if let Err(e) = bound {
            let _ = ldap.unbind().await;
            return Err(e);
        }

        debug!(bind_dn = %credentials.bind_dn, "Bound to directory server");
        Ok(ldap)
    }

    async fn close_session(&self, mut session: Ldap) -> Result<(), TransportError> {
        session.unbind().await?;
        Ok(())
    }

    async fn execute_query(
        &self,
        session: &mut Ldap,
        query: &Query,
        timeout: Duration,
    ) -> Result<Vec<Entry>, TransportError> {
        let attributes: Vec<&str> = if query.attributes.is_empty() {
            vec!["*"]
        } else {
            query.attributes.iter().map(String::as_str).collect()
        };
        trace!(%query, ?attributes, "Searching directory");

        let ldap3::SearchResult(entries, result) = session
            .with_timeout(timeout)
            .search(&query.base, scope(query.scope), &query.filter, attributes)
            .await?;
        check(result)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| Entry {
                dn: entry.dn,
                attributes: AttributeSet::from(entry.attrs),
            })
            .collect())
    }

    async fn apply_update(
        &self,
        session: &mut Ldap,
        dn: &str,
        delta: &AttributeDelta,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mods: Vec<Mod<&str>> = delta
            .grouped()
            .into_iter()
            .map(|(name, values)| Mod::Replace(name, values.into_iter().collect::<HashSet<_>>()))
            .collect();
        if mods.is_empty() {
            trace!(dn, "Nothing to modify");
            return Ok(());
        }

        trace!(dn, modifications = mods.len(), "Modifying directory entry");
        let result = session.with_timeout(timeout).modify(dn, mods).await?;
        check(result)
    }

    fn is_alive(&self, session: &mut Ldap) -> bool {
        !session.is_closed()
    }
}
