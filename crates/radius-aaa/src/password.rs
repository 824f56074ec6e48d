//! PAP, CHAP and MS-CHAPv2 verification
//!
//! [`Credentials`] captures what the NAS sent, [`LocalPassword`] what the
//! request is checked against. [`PasswordVerifier::verify`] takes the
//! Access-Accept under construction by value and hands it back with any
//! MS-CHAPv2 attributes appended.

use crate::crypto;
use crate::directory::SubscriberDirectory;
use crate::error::AuthError;
use crate::models::Subscriber;
use chrono::{DateTime, Utc};
use radius_proto::auth::{decrypt_user_password, encrypt_salted, generate_salt};
use radius_proto::vendor::microsoft;
use radius_proto::{
    verify_chap_response, verify_mschap_v2, AttributeType, ChapChallenge, ChapResponse, Packet,
    VendorAttribute,
};
use tracing::{debug, info};

/// Credential carried by an Access-Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    MsChapV2 { challenge: Vec<u8>, response: Vec<u8> },
    /// `challenge` is CHAP-Challenge, or the request authenticator when absent.
    Chap { challenge: Vec<u8>, password: Vec<u8> },
    /// `None` when User-Password could not be decrypted with the NAS secret.
    Pap { password: Option<String> },
    None,
}

impl Credentials {
    /// Pick the credential out of `request`. MS-CHAPv2 wins over CHAP, CHAP
    /// over PAP.
    pub fn from_request(request: &Packet, secret: &[u8]) -> Self {
        if let Some(challenge) =
            request.find_vendor_attribute(microsoft::VENDOR_ID, microsoft::CHAP_CHALLENGE)
        {
            let response = request
                .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::CHAP2_RESPONSE)
                .map(|vsa| vsa.value)
                .unwrap_or_default();
            return Credentials::MsChapV2 {
                challenge: challenge.value,
                response,
            };
        }

        if let Some(chap) = request.find_attribute(AttributeType::ChapPassword as u8) {
            let challenge = request
                .find_attribute(AttributeType::ChapChallenge as u8)
                .map(|attr| attr.value.clone())
                .unwrap_or_else(|| request.authenticator.to_vec());
            return Credentials::Chap {
                challenge,
                password: chap.value.clone(),
            };
        }

        if let Some(pap) = request.find_attribute(AttributeType::UserPassword as u8) {
            let password = match decrypt_user_password(&pap.value, secret, &request.authenticator) {
                Ok(password) => Some(password),
                Err(e) => {
                    debug!(error = %e, "User-Password could not be decrypted");
                    None
                }
            };
            return Credentials::Pap { password };
        }

        Credentials::None
    }

    pub fn method(&self) -> &'static str {
        match self {
            Credentials::MsChapV2 { .. } => "mschapv2",
            Credentials::Chap { .. } => "chap",
            Credentials::Pap { .. } => "pap",
            Credentials::None => "none",
        }
    }
}

/// What a request's credential is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalPassword {
    Plain(String),
    /// The directory keeps no recoverable password; PAP is verified by
    /// binding as this DN.
    DirectoryBind { dn: String },
}

/// Work out the local password for `subscriber`.
///
/// MAC authentication uses the stored MAC. With one-time passwords enabled
/// both globally and for the subscriber, the current TOTP code is used.
/// Otherwise the stored password is decrypted with `aes_key`.
pub fn resolve_local_password(
    subscriber: &Subscriber,
    is_mac_auth: bool,
    mfa_enabled: bool,
    aes_key: &str,
    now: DateTime<Utc>,
) -> Result<LocalPassword, AuthError> {
    if is_mac_auth {
        return Ok(LocalPassword::Plain(subscriber.macaddr.clone()));
    }

    if mfa_enabled && subscriber.mfa_enabled && !subscriber.mfa_secret.is_empty() {
        return crypto::totp_code(&subscriber.mfa_secret, now)
            .map(LocalPassword::Plain)
            .map_err(|_| AuthError::InvalidStoredPassword(subscriber.username.clone()));
    }

    if let Some(dn) = subscriber.ldap_dn() {
        return Ok(LocalPassword::DirectoryBind { dn: dn.to_string() });
    }

    crypto::decrypt_from_b64(&subscriber.password, aes_key)
        .map(LocalPassword::Plain)
        .map_err(|_| AuthError::InvalidStoredPassword(subscriber.username.clone()))
}

pub struct PasswordVerifier<'a> {
    /// Shared secret of the NAS, keys the MPPE attribute cipher
    pub secret: &'a [u8],
    pub ignore_password: bool,
    pub directory: &'a dyn SubscriberDirectory,
}

impl PasswordVerifier<'_> {
    pub async fn verify(
        &self,
        credentials: &Credentials,
        username: &str,
        local: &LocalPassword,
        accept: Packet,
        is_mac_auth: bool,
    ) -> Result<Packet, AuthError> {
        if is_mac_auth {
            return Ok(accept);
        }

        // MPPE keys must reach the NAS even when passwords are not checked.
        if let Credentials::MsChapV2 {
            challenge,
            response,
        } = credentials
        {
            let password = self.plain(local, username, credentials.method())?;
            return mschap_v2(username, password, challenge, response, accept, self.secret);
        }

        if self.ignore_password {
            return Ok(accept);
        }

        match credentials {
            Credentials::Chap {
                challenge,
                password,
            } => {
                let local = self.plain(local, username, credentials.method())?;
                check_chap(username, local, challenge, password)?;
            }
            Credentials::Pap { password } => {
                let supplied = password
                    .as_deref()
                    .ok_or_else(|| AuthError::PapMismatch(username.to_string()))?;
                self.check_pap(username, local, supplied).await?;
            }
            Credentials::None => return Err(AuthError::MissingPassword(username.to_string())),
            Credentials::MsChapV2 { .. } => {}
        }

        Ok(accept)
    }

    fn plain<'l>(
        &self,
        local: &'l LocalPassword,
        username: &str,
        method: &'static str,
    ) -> Result<&'l str, AuthError> {
        match local {
            LocalPassword::Plain(password) => Ok(password),
            LocalPassword::DirectoryBind { .. } => Err(AuthError::UnsupportedAuthMethod {
                username: username.to_string(),
                method,
            }),
        }
    }

    async fn check_pap(
        &self,
        username: &str,
        local: &LocalPassword,
        supplied: &str,
    ) -> Result<(), AuthError> {
        let matched = match local {
            LocalPassword::Plain(password) => supplied.trim() == password,
            LocalPassword::DirectoryBind { dn } => {
                self.directory.verify_bind(dn, supplied.trim()).await?
            }
        };
        if matched {
            Ok(())
        } else {
            Err(AuthError::PapMismatch(username.to_string()))
        }
    }
}

fn check_chap(
    username: &str,
    local: &str,
    challenge: &[u8],
    password: &[u8],
) -> Result<(), AuthError> {
    let format_error = |source| AuthError::ChapFormatError {
        username: username.to_string(),
        source,
    };
    let response = ChapResponse::from_bytes(password).map_err(format_error)?;
    let challenge = ChapChallenge::strict(challenge).map_err(format_error)?;

    if verify_chap_response(&response, local, &challenge) {
        Ok(())
    } else {
        Err(AuthError::ChapMismatch(username.to_string()))
    }
}

fn mschap_v2(
    username: &str,
    password: &str,
    challenge: &[u8],
    response: &[u8],
    mut accept: Packet,
    secret: &[u8],
) -> Result<Packet, AuthError> {
    let success = verify_mschap_v2(challenge, response, username, password).map_err(|e| {
        debug!(username = %username, error = %e, "MS-CHAPv2 verification failed");
        AuthError::MsChapMismatch(username.to_string())
    })?;

    // Reply authenticator still holds the request authenticator here.
    let authenticator = accept.authenticator;
    let recv_key = encrypt_salted(&success.recv_key, secret, &authenticator, generate_salt());
    let send_key = encrypt_salted(&success.send_key, secret, &authenticator, generate_salt());

    let vid = microsoft::VENDOR_ID;
    accept.add_vendor_attribute(VendorAttribute::new(
        vid,
        microsoft::CHAP2_SUCCESS,
        success.success_value(),
    ))?;
    accept.add_vendor_attribute(VendorAttribute::new(vid, microsoft::MPPE_RECV_KEY, recv_key))?;
    accept.add_vendor_attribute(VendorAttribute::new(vid, microsoft::MPPE_SEND_KEY, send_key))?;
    accept.add_vendor_attribute(VendorAttribute::integer(
        vid,
        microsoft::MPPE_ENCRYPTION_POLICY,
        microsoft::ENCRYPTION_ALLOWED,
    ))?;
    accept.add_vendor_attribute(VendorAttribute::integer(
        vid,
        microsoft::MPPE_ENCRYPTION_TYPES,
        microsoft::RC4_40_OR_128_BIT_ALLOWED,
    ))?;

    info!(username = %username, "MS-CHAPv2 access accept");
    Ok(accept)
}
