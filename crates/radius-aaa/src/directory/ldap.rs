//! LDAP subscriber directory
//!
//! Subscribers live in LDAP entries whose multi-valued `radiusReplyItem`
//! attribute carries `Key=Value` profile pairs, for example
//! `UpRateKbps=1024` or `ExpireTime=2030-01-31`. The MAC address comes from
//! `radiusCallingStationId`. Passwords are never readable, so PAP is checked
//! by binding as the subscriber's DN.

use super::SubscriberDirectory;
use crate::crypto::{self, CryptoError};
use crate::error::StoreError;
use crate::models::{DirectoryProfile, Status, Subscriber, SubscriberUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const REPLY_ITEM_ATTR: &str = "radiusReplyItem";
const CALLING_STATION_ATTR: &str = "radiusCallingStationId";
/// LDAP resultCode invalidCredentials (RFC 4511)
const INVALID_CREDENTIALS: u32 = 49;

#[derive(Error, Debug)]
pub enum LdapError {
    #[error("LDAP connection error: {0}")]
    Connection(String),
    #[error("LDAP bind error: {0}")]
    Bind(String),
    #[error("LDAP search error: {0}")]
    Search(String),
    #[error("LDAP bind password cannot be decrypted: {0}")]
    Password(#[from] CryptoError),
    #[error("LDAP operation timed out")]
    Timeout,
}

/// One LDAP node NAS records can bind their subscribers to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Name NAS records reference through `ldap_id`
    pub name: String,

    /// LDAP server URL (e.g., "ldap://localhost:389" or "ldaps://ldap.example.com:636")
    pub url: String,

    /// Service account DN used for searches
    pub bind_dn: String,

    /// Service account password, encrypted with the configured AES key
    pub bind_password: String,

    /// Base DN for subscriber searches
    pub search_base: String,

    /// Search filter; {username} is replaced with the escaped username
    #[serde(default = "default_search_filter")]
    pub search_filter: String,

    /// Connection and operation timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Upgrade plain connections with StartTLS
    #[serde(default)]
    pub starttls: bool,
}

fn default_search_filter() -> String {
    "(&(objectClass=radiusProfile)(uid={username}))".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// Subscriber directory backed by an LDAP node.
pub struct LdapDirectory {
    config: LdapConfig,
    bind_password: String,
    default_interim: u32,
}

impl LdapDirectory {
    /// `aes_key` decrypts the service bind password; `default_interim` fills
    /// profiles that do not set an interim interval.
    pub fn new(config: LdapConfig, aes_key: &str, default_interim: u32) -> Result<Self, LdapError> {
        let bind_password = crypto::decrypt_from_b64(&config.bind_password, aes_key)?;
        Ok(LdapDirectory {
            config,
            bind_password,
            default_interim,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout)
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, LdapError>
    where
        F: Future<Output = Result<T, LdapError>>,
    {
        tokio::time::timeout(self.timeout(), fut)
            .await
            .map_err(|_| LdapError::Timeout)?
    }

    async fn connect(&self) -> Result<Ldap, LdapError> {
        debug!(ldap = %self.config.name, url = %self.config.url, "Connecting to LDAP");
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout())
            .set_starttls(self.config.starttls);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| LdapError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                error!("LDAP connection driver error: {}", e);
            }
        });

        Ok(ldap)
    }

    async fn search(&self, username: &str) -> Result<Option<Subscriber>, LdapError> {
        let mut ldap = self.connect().await?;

        ldap.simple_bind(&self.config.bind_dn, &self.bind_password)
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?
            .success()
            .map_err(|e| LdapError::Bind(e.to_string()))?;

        let filter = self
            .config
            .search_filter
            .replace("{username}", &ldap_escape(username));

        debug!(
            username = %username,
            search_base = %self.config.search_base,
            filter = %filter,
            "Searching for subscriber in LDAP"
        );

        let (entries, _res) = ldap
            .search(
                &self.config.search_base,
                Scope::Subtree,
                &filter,
                vec![REPLY_ITEM_ATTR, CALLING_STATION_ATTR],
            )
            .await
            .map_err(|e| LdapError::Search(e.to_string()))?
            .success()
            .map_err(|e| LdapError::Search(e.to_string()))?;
        if let Err(e) = ldap.unbind().await {
            debug!(ldap = %self.config.name, error = %e, "LDAP unbind failed");
        }

        if entries.len() > 1 {
            warn!(
                username = %username,
                count = entries.len(),
                "Multiple subscribers found in LDAP, using first result"
            );
        }

        Ok(entries.into_iter().next().map(|entry| {
            let entry = SearchEntry::construct(entry);
            subscriber_from_entry(username, &entry.dn, &entry.attrs, self.default_interim, Utc::now())
        }))
    }

    async fn bind_as(&self, dn: &str, password: &str) -> Result<bool, LdapError> {
        let mut ldap = self.connect().await?;
        let result = ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?;
        if let Err(e) = ldap.unbind().await {
            debug!(ldap = %self.config.name, dn = %dn, error = %e, "LDAP unbind failed");
        }

        match result.rc {
            0 => Ok(true),
            INVALID_CREDENTIALS => Ok(false),
            rc => Err(LdapError::Bind(format!("rc={} {}", rc, result.text))),
        }
    }
}

fn attr_values<'a>(attrs: &'a HashMap<String, Vec<String>>, name: &str) -> &'a [String] {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
        .unwrap_or(&[])
}

/// Build a subscriber from a directory entry.
///
/// Expiry defaults to one day from `now` and the interim interval to
/// `default_interim` unless the reply items say otherwise.
pub fn subscriber_from_entry(
    username: &str,
    dn: &str,
    attrs: &HashMap<String, Vec<String>>,
    default_interim: u32,
    now: DateTime<Utc>,
) -> Subscriber {
    let mut directory = DirectoryProfile::new(dn, now + ChronoDuration::hours(24), default_interim);
    apply_reply_items(&mut directory, attr_values(attrs, REPLY_ITEM_ATTR));

    let macaddr = attr_values(attrs, CALLING_STATION_ATTR)
        .first()
        .map(|mac| mac.trim().to_string())
        .unwrap_or_default();
    Subscriber::from_directory(username, macaddr, directory)
}

/// Parse `Key=Value` reply items into the profile. Unknown keys and
/// malformed numbers are skipped.
pub fn apply_reply_items(directory: &mut DirectoryProfile, items: &[String]) {
    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let profile = &mut directory.profile;
        match key.trim() {
            "Status" => {
                directory.status = if value.eq_ignore_ascii_case("disabled") {
                    Status::Disabled
                } else {
                    Status::Enabled
                }
            }
            "MfaSecret" => directory.mfa_secret = value.to_string(),
            "MfaStatus" => directory.mfa_enabled = value.eq_ignore_ascii_case("enabled"),
            "Domain" => profile.domain = value.to_string(),
            "AddrPool" => profile.addr_pool = value.to_string(),
            "Ipaddr" => directory.ipaddr = value.to_string(),
            "LimitPolicy" => profile.limit_policy = value.to_string(),
            "UpLimitPolicy" => profile.up_limit_policy = value.to_string(),
            "DownLimitPolicy" => profile.down_limit_policy = value.to_string(),
            "ActiveNum" => {
                if let Ok(n) = value.parse() {
                    profile.active_num = n;
                }
            }
            "UpRateKbps" => {
                if let Ok(n) = value.parse() {
                    profile.up_rate_kbps = n;
                }
            }
            "DownRateKbps" => {
                if let Ok(n) = value.parse() {
                    profile.down_rate_kbps = n;
                }
            }
            "InterimInterval" => {
                if let Ok(n) = value.parse() {
                    profile.interim_interval = n;
                }
            }
            "ExpireTime" => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                Ok(date) => {
                    if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                        directory.expire_time = midnight.and_utc();
                    }
                }
                Err(e) => warn!(value = %value, error = %e, "Ignoring malformed ExpireTime reply item"),
            },
            _ => {}
        }
    }
}

#[async_trait]
impl SubscriberDirectory for LdapDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.with_timeout(self.search(username)).await?)
    }

    /// MAC-authenticating NAS send the MAC as username, so the same filter applies.
    async fn find_by_mac(&self, macaddr: &str) -> Result<Option<Subscriber>, StoreError> {
        self.find_by_username(macaddr).await
    }

    async fn update_fields(&self, _username: &str, _update: &SubscriberUpdate) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("LDAP subscriber updates"))
    }

    async fn verify_bind(&self, dn: &str, password: &str) -> Result<bool, StoreError> {
        // An empty password would be an unauthenticated bind, which servers accept.
        if password.is_empty() {
            return Ok(false);
        }
        Ok(self.with_timeout(self.bind_as(dn, password)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn attrs(items: &[&str], mac: Option<&str>) -> HashMap<String, Vec<String>> {
        let mut attrs = HashMap::new();
        attrs.insert(
            "radiusreplyitem".to_string(),
            items.iter().map(|s| s.to_string()).collect(),
        );
        if let Some(mac) = mac {
            attrs.insert(CALLING_STATION_ATTR.to_string(), vec![mac.to_string()]);
        }
        attrs
    }

    #[test]
    fn test_defaults_without_reply_items() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let sub = subscriber_from_entry("alice", "uid=alice,dc=example", &HashMap::new(), 120, now);
        assert_eq!(sub.expire_time, now + ChronoDuration::hours(24));
        assert_eq!(sub.profile.interim_interval, 120);
        assert_eq!(sub.ldap_dn(), Some("uid=alice,dc=example"));
        assert_eq!(sub.status, Status::Enabled);
    }

    #[test]
    fn test_reply_items_parsed() {
        let now = Utc::now();
        let sub = subscriber_from_entry(
            "bob",
            "uid=bob,dc=example",
            &attrs(
                &[
                    "Status=enabled",
                    "Domain = isp.example",
                    "AddrPool=pool-a",
                    "Ipaddr=10.1.1.1",
                    "LimitPolicy=gold",
                    "UpLimitPolicy=gold-up",
                    "DownLimitPolicy=gold-down",
                    "ActiveNum=2",
                    "UpRateKbps=1024",
                    "DownRateKbps=4096",
                    "ExpireTime=2030-01-31",
                    "MfaStatus=enabled",
                    "MfaSecret=JBSWY3DPEHPK3PXP",
                    "garbage",
                    "Unknown=1",
                ],
                Some("aa:bb:cc:dd:ee:ff"),
            ),
            120,
            now,
        );

        assert_eq!(sub.profile.domain, "isp.example");
        assert_eq!(sub.profile.addr_pool, "pool-a");
        assert_eq!(sub.ipaddr, "10.1.1.1");
        assert_eq!(sub.profile.limit_policy, "gold");
        assert_eq!(sub.profile.up_limit_policy, "gold-up");
        assert_eq!(sub.profile.down_limit_policy, "gold-down");
        assert_eq!(sub.profile.active_num, 2);
        assert_eq!(sub.profile.up_rate_kbps, 1024);
        assert_eq!(sub.profile.down_rate_kbps, 4096);
        assert_eq!(sub.expire_time.year(), 2030);
        assert_eq!(sub.expire_time.day(), 31);
        assert!(sub.mfa_enabled);
        assert_eq!(sub.mfa_secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(sub.macaddr, "aa:bb:cc:dd:ee:ff");

        let profile = sub.authorization_profile();
        assert_eq!(profile.framed_ipaddr(), "10.1.1.1");
        assert_eq!(profile.limit_policy(), "gold");
        assert_eq!(profile.down_rate_kbps(), 4096);
        assert_eq!(profile.interim_interval(), 120);
    }

    #[test]
    fn test_disabled_status_and_bad_numbers() {
        let expiry = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let mut profile = DirectoryProfile::new("uid=carol,dc=example", expiry, 60);
        apply_reply_items(
            &mut profile,
            &[
                "Status=disabled".to_string(),
                "ActiveNum=lots".to_string(),
                "ExpireTime=31/01/2030".to_string(),
            ],
        );
        assert_eq!(profile.status, Status::Disabled);
        assert_eq!(profile.profile.active_num, 0);
        assert_eq!(profile.expire_time, expiry);
    }

    #[test]
    fn test_config_defaults() {
        let config: LdapConfig = serde_json::from_str(
            r#"{"name":"corp","url":"ldap://127.0.0.1:389","bind_dn":"cn=admin","bind_password":"x","search_base":"dc=example"}"#,
        )
        .unwrap();
        assert_eq!(config.timeout, 10);
        assert!(config.search_filter.contains("{username}"));
        assert!(!config.starttls);
    }

    #[test]
    fn test_new_rejects_undecryptable_password() {
        let config = LdapConfig {
            name: "corp".into(),
            url: "ldap://127.0.0.1:389".into(),
            bind_dn: "cn=admin".into(),
            bind_password: "plaintext".into(),
            search_base: "dc=example".into(),
            search_filter: default_search_filter(),
            timeout: 1,
            starttls: false,
        };
        assert!(LdapDirectory::new(config, "t8Ce3TGxq7vJ2mWf", 120).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        let key = "t8Ce3TGxq7vJ2mWf";
        let config = LdapConfig {
            name: "corp".into(),
            url: "ldap://127.0.0.1:1".into(),
            bind_dn: "cn=admin".into(),
            bind_password: crypto::encrypt_to_b64("admin", key).unwrap(),
            search_base: "dc=example".into(),
            search_filter: default_search_filter(),
            timeout: 1,
            starttls: false,
        };
        let dir = LdapDirectory::new(config, key, 120).unwrap();
        assert_eq!(dir.name(), "corp");
        assert!(dir.find_by_username("alice").await.is_err());
        assert!(!dir.verify_bind("uid=alice", "").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires a running LDAP server
    async fn test_ldap_search_live() {
        let key = "t8Ce3TGxq7vJ2mWf";
        let config = LdapConfig {
            name: "corp".into(),
            url: "ldap://localhost:389".into(),
            bind_dn: "cn=admin,dc=example,dc=com".into(),
            bind_password: crypto::encrypt_to_b64("admin", key).unwrap(),
            search_base: "dc=example,dc=com".into(),
            search_filter: "(uid={username})".into(),
            timeout: 5,
            starttls: false,
        };
        let dir = LdapDirectory::new(config, key, 120).unwrap();
        let found = dir.find_by_username("testuser").await.unwrap();
        assert!(found.is_some());
    }
}
