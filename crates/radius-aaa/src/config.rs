use crate::audit::AuthLogLevel;
use crate::crypto;
use crate::directory::ldap::LdapConfig;
use crate::models::{Nas, Profile, Status, Subscriber};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// RADIUS engine behaviour switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusConfig {
    /// Dump every decoded request and response at debug level
    #[serde(default)]
    pub debug: bool,

    /// Skip PAP/CHAP verification (MSCHAPv2 is still evaluated for MPPE keys)
    #[serde(default)]
    pub ignore_password: bool,

    /// Verify subscribers with MFA enabled against a TOTP code
    #[serde(default)]
    pub mfa_enabled: bool,

    /// Which authentication attempts reach the auth log
    #[serde(default)]
    pub authlog_level: AuthLogLevel,

    /// Acct-Interim-Interval sent when the subscriber profile has none
    #[serde(default = "default_acct_interim_interval")]
    pub acct_interim_interval: u32,

    /// Upper bound on a Disconnect-Request exchange
    #[serde(default = "default_disconnect_timeout_secs")]
    pub disconnect_timeout_secs: u64,

    /// Capacity of the auth log worker queue
    #[serde(default = "default_authlog_queue_size")]
    pub authlog_queue_size: usize,
}

fn default_acct_interim_interval() -> u32 {
    120
}

fn default_disconnect_timeout_secs() -> u64 {
    3
}

fn default_authlog_queue_size() -> usize {
    1024
}

impl Default for RadiusConfig {
    fn default() -> Self {
        RadiusConfig {
            debug: false,
            ignore_password: false,
            mfa_enabled: false,
            authlog_level: AuthLogLevel::default(),
            acct_interim_interval: default_acct_interim_interval(),
            disconnect_timeout_secs: default_disconnect_timeout_secs(),
            authlog_queue_size: default_authlog_queue_size(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Authentication port
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,

    /// Accounting port
    #[serde(default = "default_acct_port")]
    pub acct_port: u16,

    /// Secret used to answer requests whose NAS cannot be resolved
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// AES key (16, 24 or 32 bytes) protecting stored and LDAP bind passwords
    #[serde(default = "default_aes_key")]
    pub aes_key: String,

    #[serde(default)]
    pub radius: RadiusConfig,

    /// Registered network access servers
    #[serde(default)]
    pub nas: Vec<Nas>,

    /// Locally provisioned subscribers
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,

    /// LDAP nodes NAS records may bind their subscribers to
    #[serde(default)]
    pub ldap: Vec<LdapConfig>,

    /// PostgreSQL URL for the session store; in-memory when absent
    #[serde(default)]
    pub database_url: Option<String>,

    /// JSON-lines mirror of the auth log (optional)
    #[serde(default)]
    pub authlog_path: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_auth_port() -> u16 {
    1812
}

fn default_acct_port() -> u16 {
    1813
}

fn default_secret() -> String {
    "testing123".to_string()
}

fn default_aes_key() -> String {
    "t8Ce3TGxq7vJ2mWf".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            auth_port: default_auth_port(),
            acct_port: default_acct_port(),
            secret: default_secret(),
            log_level: None,
            aes_key: default_aes_key(),
            radius: RadiusConfig::default(),
            nas: vec![],
            subscribers: vec![],
            ldap: vec![],
            database_url: None,
            authlog_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address)))
    }

    pub fn auth_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, self.auth_port))
    }

    pub fn acct_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, self.acct_port))
    }

    /// Log filter when `RUST_LOG` is not set
    pub fn effective_log_level(&self) -> &str {
        match self.log_level {
            Some(ref level) => level.as_str(),
            None if self.radius.debug => "debug",
            None => "info",
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;

        // Port 0 asks the OS for an ephemeral port, so only a real clash is an error
        if self.auth_port != 0 && self.auth_port == self.acct_port {
            return Err(ConfigError::Invalid(format!(
                "auth_port and acct_port are both {}",
                self.auth_port
            )));
        }

        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("Secret cannot be empty".to_string()));
        }

        if !crypto::is_valid_key_length(self.aes_key.len()) {
            return Err(ConfigError::Invalid(format!(
                "aes_key must be 16, 24 or 32 bytes, got {}",
                self.aes_key.len()
            )));
        }

        let ldap_names: HashSet<&str> = self.ldap.iter().map(|node| node.name.as_str()).collect();
        if ldap_names.len() != self.ldap.len() {
            return Err(ConfigError::Invalid("Duplicate LDAP node name".to_string()));
        }
        for node in &self.ldap {
            if node.url.is_empty() {
                return Err(ConfigError::Invalid(format!("LDAP node {} has empty url", node.name)));
            }
        }

        let mut nas_addrs = HashSet::new();
        for nas in &self.nas {
            if nas.secret.is_empty() {
                return Err(ConfigError::Invalid(format!("NAS {} has empty secret", nas.ipaddr)));
            }
            if !nas_addrs.insert(nas.ipaddr) {
                return Err(ConfigError::Invalid(format!("Duplicate NAS address {}", nas.ipaddr)));
            }
            if let Some(ref ldap_id) = nas.ldap_id {
                if !ldap_names.contains(ldap_id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "NAS {} references unknown LDAP node {}",
                        nas.ipaddr, ldap_id
                    )));
                }
            }
        }

        let mut usernames = HashSet::new();
        for subscriber in &self.subscribers {
            if subscriber.username.is_empty() {
                return Err(ConfigError::Invalid("Subscriber has empty username".to_string()));
            }
            if !usernames.insert(subscriber.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate subscriber {}",
                    subscriber.username
                )));
            }
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        let aes_key = default_aes_key();
        let password = crypto::encrypt_to_b64("alice-secret", &aes_key).unwrap_or_default();

        let mut alice = Subscriber::new("alice");
        alice.password = password;
        alice.expire_time = Utc::now() + Duration::days(30);
        alice.profile = Profile {
            active_num: 1,
            up_rate_kbps: 1024,
            down_rate_kbps: 2048,
            addr_pool: "pool-default".to_string(),
            ..Profile::default()
        };

        Config {
            log_level: Some("info".to_string()),
            aes_key,
            nas: vec![Nas {
                identifier: "bras-01".to_string(),
                name: Some("Edge BRAS".to_string()),
                ipaddr: IpAddr::from([192, 168, 1, 1]),
                secret: "nas_secret_1".to_string(),
                vendor_code: radius_proto::vendor::mikrotik::VENDOR_ID,
                coa_port: 3799,
                ldap_id: None,
                status: Status::Enabled,
            }],
            subscribers: vec![alice],
            authlog_path: Some("/var/log/radius/authlog.jsonl".to_string()),
            ..Config::default()
        }
    }
}
