//! Authentication failure taxonomy
//!
//! The `Display` text of an [`AuthError`] is what the NAS receives as the
//! Reply-Message of an Access-Reject, so messages are short and name the
//! subscriber where one is known.

use radius_proto::{ChapError, PacketError};
use std::net::IpAddr;
use thiserror::Error;

/// Reasons an Access-Request is rejected.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("username is empty")]
    EmptyUsername,
    #[error("unauthorized access to device, ip={ip}, identifier={identifier}")]
    UnauthorizedDevice { ip: IpAddr, identifier: String },
    #[error("user:{0} not exists")]
    UserNotFound(String),
    #[error("user:{0} status is disabled")]
    UserDisabled(String),
    #[error("user:{0} is expired")]
    UserExpired(String),
    #[error("user:{username} online count over limit (max={max})")]
    SessionCapExceeded { username: String, max: u32 },
    #[error("user:{0} mac bind not match")]
    MacBindMismatch(String),
    #[error("user:{username} vlanid{slot} bind not match")]
    VlanBindMismatch { username: String, slot: u8 },
    #[error("user:{0} pap password mismatch")]
    PapMismatch(String),
    #[error("user:{0} chap password mismatch")]
    ChapMismatch(String),
    #[error("user:{username} chap format error: {source}")]
    ChapFormatError {
        username: String,
        #[source]
        source: ChapError,
    },
    #[error("user:{0} mschapv2 password mismatch")]
    MsChapMismatch(String),
    #[error("user:{0} stored password is invalid")]
    InvalidStoredPassword(String),
    #[error("user:{username} {method} is not supported by the directory")]
    UnsupportedAuthMethod {
        username: String,
        method: &'static str,
    },
    #[error("user:{0} no password credential in request")]
    MissingPassword(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("response encoding failed: {0}")]
    Encoding(#[from] PacketError),
}

impl AuthError {
    /// Short machine-friendly label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::EmptyUsername => "empty_username",
            AuthError::UnauthorizedDevice { .. } => "unauthorized_device",
            AuthError::UserNotFound(_) => "user_not_found",
            AuthError::UserDisabled(_) => "user_disabled",
            AuthError::UserExpired(_) => "user_expired",
            AuthError::SessionCapExceeded { .. } => "session_cap_exceeded",
            AuthError::MacBindMismatch(_) => "mac_bind_mismatch",
            AuthError::VlanBindMismatch { .. } => "vlan_bind_mismatch",
            AuthError::PapMismatch(_) => "pap_mismatch",
            AuthError::ChapMismatch(_) => "chap_mismatch",
            AuthError::ChapFormatError { .. } => "chap_format_error",
            AuthError::MsChapMismatch(_) => "mschap_mismatch",
            AuthError::InvalidStoredPassword(_) => "invalid_stored_password",
            AuthError::UnsupportedAuthMethod { .. } => "unsupported_auth_method",
            AuthError::MissingPassword(_) => "missing_password",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::Encoding(_) => "encoding",
        }
    }
}

/// Failures of the NAS/subscriber directories and the session stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ldap error: {0}")]
    Ldap(#[from] crate::directory::ldap::LdapError),
    #[error("online session {0} already exists")]
    Duplicate(String),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("{0}")]
    Unavailable(String),
}
