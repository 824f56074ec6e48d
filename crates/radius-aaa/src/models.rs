//! Domain records shared by the directories, stores and pipelines

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Sentinel stored for string fields that carry no value.
pub const NA: &str = "N/A";

/// True when `value` is neither empty nor the [`NA`] sentinel.
pub fn is_set(value: &str) -> bool {
    !value.is_empty() && value != NA
}

/// `value` itself, or [`NA`] when it is empty.
pub fn or_na(value: impl Into<String>) -> String {
    let value = value.into();
    if value.is_empty() {
        NA.to_string()
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Enabled,
    Disabled,
}

/// NAS dialects the engine knows how to parse and authorize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Standard,
    Huawei,
    H3c,
    Zte,
    Radback,
    Cisco,
    Mikrotik,
    Ikuai,
    Other(u32),
}

impl Vendor {
    pub fn from_code(code: u32) -> Self {
        use radius_proto::vendor::*;
        match code {
            0 => Vendor::Standard,
            huawei::VENDOR_ID => Vendor::Huawei,
            h3c::VENDOR_ID => Vendor::H3c,
            zte::VENDOR_ID => Vendor::Zte,
            radback::VENDOR_ID => Vendor::Radback,
            cisco::VENDOR_ID => Vendor::Cisco,
            mikrotik::VENDOR_ID => Vendor::Mikrotik,
            ikuai::VENDOR_ID => Vendor::Ikuai,
            other => Vendor::Other(other),
        }
    }
}

fn default_coa_port() -> u16 {
    3799
}

/// A registered network access server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nas {
    /// NAS-Identifier the device reports
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    pub ipaddr: IpAddr,
    pub secret: String,
    /// IANA enterprise number of the device vendor, 0 for plain RFC dialect
    #[serde(default)]
    pub vendor_code: u32,
    #[serde(default = "default_coa_port")]
    pub coa_port: u16,
    /// Name of the LDAP node subscribers of this NAS are resolved against
    #[serde(default)]
    pub ldap_id: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl Nas {
    pub fn vendor(&self) -> Vendor {
        Vendor::from_code(self.vendor_code)
    }
}

/// Rate and pool policy attached to a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub domain: String,
    /// Acct-Interim-Interval in seconds, 0 means "use the configured default"
    pub interim_interval: u32,
    pub addr_pool: String,
    /// Concurrent session cap, 0 for unlimited
    pub active_num: u32,
    pub up_rate_kbps: u64,
    pub down_rate_kbps: u64,
    pub limit_policy: String,
    pub up_limit_policy: String,
    pub down_limit_policy: String,
}

fn far_future() -> DateTime<Utc> {
    Utc::now() + Duration::days(365)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub username: String,
    /// Base64 AES-CBC ciphertext, see [`crate::crypto`]
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub macaddr: String,
    #[serde(default)]
    pub vlanid1: u32,
    #[serde(default)]
    pub vlanid2: u32,
    #[serde(default)]
    pub bind_mac: bool,
    #[serde(default)]
    pub bind_vlan: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "far_future")]
    pub expire_time: DateTime<Utc>,
    #[serde(default)]
    pub ipaddr: String,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub mfa_secret: String,
    #[serde(default)]
    pub profile: Profile,
    /// Set when the record came from a directory that verifies PAP by bind.
    #[serde(skip)]
    pub directory: Option<DirectoryProfile>,
}

impl Subscriber {
    pub fn new(username: impl Into<String>) -> Self {
        Subscriber {
            username: username.into(),
            password: String::new(),
            macaddr: String::new(),
            vlanid1: 0,
            vlanid2: 0,
            bind_mac: false,
            bind_vlan: false,
            status: Status::Enabled,
            expire_time: far_future(),
            ipaddr: String::new(),
            mfa_enabled: false,
            mfa_secret: String::new(),
            profile: Profile::default(),
            directory: None,
        }
    }

    /// Build a subscriber whose account state mirrors a directory profile.
    pub fn from_directory(
        username: impl Into<String>,
        macaddr: impl Into<String>,
        directory: DirectoryProfile,
    ) -> Self {
        let mut subscriber = Subscriber::new(username);
        subscriber.macaddr = macaddr.into();
        subscriber.status = directory.status;
        subscriber.expire_time = directory.expire_time;
        subscriber.ipaddr = directory.ipaddr.clone();
        subscriber.mfa_enabled = directory.mfa_enabled;
        subscriber.mfa_secret = directory.mfa_secret.clone();
        subscriber.profile = directory.profile.clone();
        subscriber.directory = Some(directory);
        subscriber
    }

    /// DN to bind as when the record came from a directory.
    pub fn ldap_dn(&self) -> Option<&str> {
        self.directory.as_ref().map(|d| d.dn.as_str())
    }

    /// The profile Access-Accept attributes are derived from.
    pub fn authorization_profile(&self) -> &dyn AuthorizationProfile {
        match self.directory {
            Some(ref directory) => directory,
            None => self,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time < now
    }

    pub fn apply(&mut self, update: &SubscriberUpdate) {
        if let Some(ref mac) = update.macaddr {
            self.macaddr = mac.clone();
        }
        if let Some(vlan) = update.vlanid1 {
            self.vlanid1 = vlan;
        }
        if let Some(vlan) = update.vlanid2 {
            self.vlanid2 = vlan;
        }
    }
}

/// Read access to everything the authorization encoders need.
///
/// Local subscriber records and directory-derived records expose the same
/// accessors, so the encoders never care where a profile came from.
pub trait AuthorizationProfile {
    fn expire_time(&self) -> DateTime<Utc>;
    fn interim_interval(&self) -> u32;
    fn framed_ipaddr(&self) -> &str;
    fn addr_pool(&self) -> &str;
    fn domain(&self) -> &str;
    fn limit_policy(&self) -> &str;
    fn up_limit_policy(&self) -> &str;
    fn down_limit_policy(&self) -> &str;
    fn up_rate_kbps(&self) -> u64;
    fn down_rate_kbps(&self) -> u64;
}

impl AuthorizationProfile for Subscriber {
    fn expire_time(&self) -> DateTime<Utc> {
        self.expire_time
    }
    fn interim_interval(&self) -> u32 {
        self.profile.interim_interval
    }
    fn framed_ipaddr(&self) -> &str {
        &self.ipaddr
    }
    fn addr_pool(&self) -> &str {
        &self.profile.addr_pool
    }
    fn domain(&self) -> &str {
        &self.profile.domain
    }
    fn limit_policy(&self) -> &str {
        &self.profile.limit_policy
    }
    fn up_limit_policy(&self) -> &str {
        &self.profile.up_limit_policy
    }
    fn down_limit_policy(&self) -> &str {
        &self.profile.down_limit_policy
    }
    fn up_rate_kbps(&self) -> u64 {
        self.profile.up_rate_kbps
    }
    fn down_rate_kbps(&self) -> u64 {
        self.profile.down_rate_kbps
    }
}

/// Subscriber state published by a directory entry's reply items.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryProfile {
    pub dn: String,
    pub status: Status,
    pub expire_time: DateTime<Utc>,
    pub ipaddr: String,
    pub mfa_enabled: bool,
    pub mfa_secret: String,
    pub profile: Profile,
}

impl DirectoryProfile {
    pub fn new(dn: impl Into<String>, expire_time: DateTime<Utc>, interim_interval: u32) -> Self {
        DirectoryProfile {
            dn: dn.into(),
            status: Status::Enabled,
            expire_time,
            ipaddr: String::new(),
            mfa_enabled: false,
            mfa_secret: String::new(),
            profile: Profile {
                interim_interval,
                ..Profile::default()
            },
        }
    }
}

impl AuthorizationProfile for DirectoryProfile {
    fn expire_time(&self) -> DateTime<Utc> {
        self.expire_time
    }
    fn interim_interval(&self) -> u32 {
        self.profile.interim_interval
    }
    fn framed_ipaddr(&self) -> &str {
        &self.ipaddr
    }
    fn addr_pool(&self) -> &str {
        &self.profile.addr_pool
    }
    fn domain(&self) -> &str {
        &self.profile.domain
    }
    fn limit_policy(&self) -> &str {
        &self.profile.limit_policy
    }
    fn up_limit_policy(&self) -> &str {
        &self.profile.up_limit_policy
    }
    fn down_limit_policy(&self) -> &str {
        &self.profile.down_limit_policy
    }
    fn up_rate_kbps(&self) -> u64 {
        self.profile.up_rate_kbps
    }
    fn down_rate_kbps(&self) -> u64 {
        self.profile.down_rate_kbps
    }
}

/// Subscriber fields learned from a request and persisted after Accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberUpdate {
    pub macaddr: Option<String>,
    pub vlanid1: Option<u32>,
    pub vlanid2: Option<u32>,
}

impl SubscriberUpdate {
    pub fn is_empty(&self) -> bool {
        self.macaddr.is_none() && self.vlanid1.is_none() && self.vlanid2.is_none()
    }
}

/// MAC and VLAN tags extracted from one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorRequest {
    pub macaddr: String,
    pub vlanid1: u32,
    pub vlanid2: u32,
}

/// A live session, keyed by Acct-Session-Id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineSession {
    pub acct_session_id: String,
    pub username: String,
    pub nas_id: String,
    pub nas_addr: String,
    /// Source address the accounting packet arrived from
    pub nas_paddr: String,
    pub session_timeout: u32,
    pub framed_ipaddr: String,
    pub framed_netmask: String,
    pub mac_addr: String,
    pub nas_port: u32,
    pub nas_class: String,
    pub nas_port_id: String,
    pub nas_port_type: u32,
    pub service_type: u32,
    pub acct_session_time: u32,
    pub acct_input_total: u64,
    pub acct_output_total: u64,
    pub acct_input_packets: u64,
    pub acct_output_packets: u64,
    pub acct_start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl OnlineSession {
    /// Fold an Interim-Update snapshot into this session.
    ///
    /// Octet and packet counters are summed; session time and the update
    /// stamp take the newer values.
    pub fn accumulate(&mut self, update: &OnlineSession) {
        self.acct_input_total = self.acct_input_total.saturating_add(update.acct_input_total);
        self.acct_output_total = self.acct_output_total.saturating_add(update.acct_output_total);
        self.acct_input_packets = self.acct_input_packets.saturating_add(update.acct_input_packets);
        self.acct_output_packets = self
            .acct_output_packets
            .saturating_add(update.acct_output_packets);
        self.acct_session_time = update.acct_session_time;
        self.last_update = update.last_update;
    }
}

/// Billing trail entry written when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingRecord {
    #[serde(flatten)]
    pub session: OnlineSession,
    pub acct_stop_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthResult {
    Success,
    Failure,
}

/// One authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthLog {
    pub username: String,
    pub nas_addr: String,
    pub result: AuthResult,
    pub reason: String,
    pub cast_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl AuthLog {
    pub fn success(username: impl Into<String>, nas_addr: impl Into<String>, cast_ms: u64) -> Self {
        AuthLog {
            username: username.into(),
            nas_addr: nas_addr.into(),
            result: AuthResult::Success,
            reason: "success".to_string(),
            cast_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        username: impl Into<String>,
        nas_addr: impl Into<String>,
        reason: impl Into<String>,
        cast_ms: u64,
    ) -> Self {
        AuthLog {
            username: username.into(),
            nas_addr: nas_addr.into(),
            result: AuthResult::Failure,
            reason: reason.into(),
            cast_ms,
            timestamp: Utc::now(),
        }
    }
}
