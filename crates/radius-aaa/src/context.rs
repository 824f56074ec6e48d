//! Shared collaborators of the authentication and accounting services

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::directory::{resolve_nas, NasDirectory, SubscriberDirectory};
use crate::disconnect::DisconnectIssuer;
use crate::models::Nas;
use crate::store::SessionStore;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Everything a request handler needs, built once at startup.
pub struct AaaContext {
    pub config: Arc<Config>,
    pub nas_directory: Arc<dyn NasDirectory>,
    /// Directory for NAS records without an LDAP binding
    pub subscribers: Arc<dyn SubscriberDirectory>,
    /// LDAP-backed directories keyed by node name
    pub ldap: HashMap<String, Arc<dyn SubscriberDirectory>>,
    pub store: Arc<dyn SessionStore>,
    pub audit: AuditLogger,
    pub disconnector: DisconnectIssuer,
}

impl AaaContext {
    pub fn new(
        config: Arc<Config>,
        nas_directory: Arc<dyn NasDirectory>,
        subscribers: Arc<dyn SubscriberDirectory>,
        store: Arc<dyn SessionStore>,
        audit: AuditLogger,
    ) -> Self {
        let disconnector =
            DisconnectIssuer::new(Duration::from_secs(config.radius.disconnect_timeout_secs));
        AaaContext {
            config,
            nas_directory,
            subscribers,
            ldap: HashMap::new(),
            store,
            audit,
            disconnector,
        }
    }

    pub fn with_ldap(mut self, name: impl Into<String>, directory: Arc<dyn SubscriberDirectory>) -> Self {
        self.ldap.insert(name.into(), directory);
        self
    }

    /// Subscriber directory serving `nas`.
    pub fn subscribers_for(&self, nas: &Nas) -> Arc<dyn SubscriberDirectory> {
        match nas.ldap_id.as_deref() {
            Some(id) => match self.ldap.get(id) {
                Some(directory) => Arc::clone(directory),
                None => {
                    warn!(nas_addr = %nas.ipaddr, ldap_id = %id, "Unknown LDAP node, using local subscribers");
                    Arc::clone(&self.subscribers)
                }
            },
            None => Arc::clone(&self.subscribers),
        }
    }

    /// Secret to sign a reply with when the pipeline itself could not say.
    ///
    /// Unknown devices get the configured placeholder secret.
    pub async fn secret_for(&self, ip: IpAddr, identifier: &str) -> String {
        match resolve_nas(self.nas_directory.as_ref(), ip, identifier).await {
            Ok(nas) => nas.secret,
            Err(_) => self.config.secret.clone(),
        }
    }
}
