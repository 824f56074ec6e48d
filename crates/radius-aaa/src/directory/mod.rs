//! NAS and subscriber directories
//!
//! The engine reads NAS records and subscribers through these traits so the
//! same pipelines run against the in-memory directory seeded from the
//! configuration file or against an LDAP server.

pub mod ldap;
pub mod memory;

pub use ldap::{LdapConfig, LdapDirectory};
pub use memory::MemoryDirectory;

use crate::error::{AuthError, StoreError};
use crate::models::{Nas, Status, Subscriber, SubscriberUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use tracing::debug;

#[async_trait]
pub trait NasDirectory: Send + Sync {
    async fn find_nas_by_ip(&self, ip: IpAddr) -> Result<Option<Nas>, StoreError>;

    async fn find_nas_by_identifier(&self, identifier: &str) -> Result<Option<Nas>, StoreError>;
}

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Subscriber>, StoreError>;

    async fn find_by_mac(&self, macaddr: &str) -> Result<Option<Subscriber>, StoreError>;

    /// Persist fields learned during authentication (MAC, VLAN tags).
    async fn update_fields(&self, username: &str, update: &SubscriberUpdate) -> Result<(), StoreError>;

    /// Check `password` by binding as `dn`.
    ///
    /// Only directories that hold no recoverable password support this.
    async fn verify_bind(&self, _dn: &str, _password: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("bind verification"))
    }
}

/// Resolve the NAS a request came from: by source address first, then by
/// NAS-Identifier. Unknown and disabled devices are unauthorized.
pub async fn resolve_nas(
    directory: &dyn NasDirectory,
    ip: IpAddr,
    identifier: &str,
) -> Result<Nas, AuthError> {
    let mut nas = directory.find_nas_by_ip(ip).await?;
    if nas.is_none() && !identifier.is_empty() {
        debug!(nas_addr = %ip, identifier = %identifier, "NAS not found by address, trying identifier");
        nas = directory.find_nas_by_identifier(identifier).await?;
    }

    match nas {
        Some(nas) if nas.status == Status::Enabled => Ok(nas),
        _ => Err(AuthError::UnauthorizedDevice {
            ip,
            identifier: identifier.to_string(),
        }),
    }
}

/// Look up a subscriber for authentication and enforce status and expiry.
///
/// MAC authentication requests carry the MAC as username, so they are
/// looked up by MAC address.
pub async fn get_user(
    directory: &dyn SubscriberDirectory,
    username: &str,
    is_mac_auth: bool,
    now: DateTime<Utc>,
) -> Result<Subscriber, AuthError> {
    let found = if is_mac_auth {
        directory.find_by_mac(username).await?
    } else {
        directory.find_by_username(username).await?
    };
    let subscriber = found.ok_or_else(|| AuthError::UserNotFound(username.to_string()))?;

    if subscriber.status == Status::Disabled {
        return Err(AuthError::UserDisabled(subscriber.username));
    }
    if subscriber.is_expired(now) {
        return Err(AuthError::UserExpired(subscriber.username));
    }
    Ok(subscriber)
}

/// Look up a subscriber for accounting; status and expiry are not enforced.
pub async fn get_user_for_accounting(
    directory: &dyn SubscriberDirectory,
    username: &str,
) -> Result<Option<Subscriber>, StoreError> {
    directory.find_by_username(username).await
}
